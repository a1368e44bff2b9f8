//! # 模拟PLC传输
//!
//! ## 业务作用
//! 在没有真实设备时提供完整的读写能力：
//! - 按存储区保存字节数据，同一端点的所有连接共享一台模拟设备
//! - 记录写入日志，便于测试断言
//! - 支持模拟离线、随机通讯错误与网络延迟
//!
//! ## 存储布局
//! - S7: 每个 (区域, DB号) 一段字节
//! - Modbus: 寄存器按每寄存器2字节大端存放，线圈/离散输入按位存放

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::services::PlcTransport;
use crate::models::{AddressLocation, ModbusRegisterType, PlcProtocol, S7Area};
use crate::utils::error::{AppError, AppResult};

/// 模拟通讯错误使用的错误码
const SIMULATED_ERROR_CODE: i32 = -3;

/// 存储区键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RegionKey {
    S7 { area: S7Area, db_number: u16 },
    Modbus(ModbusRegisterType),
}

/// 写入记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOperation {
    pub timestamp: DateTime<Utc>,
    pub location: AddressLocation,
    pub value: serde_json::Value,
}

#[derive(Debug, Default)]
struct DeviceState {
    regions: HashMap<RegionKey, Vec<u8>>,
    write_log: Vec<WriteOperation>,
    offline: bool,
    simulate_errors: bool,
    error_rate: f64,
    network_delay_ms: u64,
}

/// 模拟设备
///
/// 克隆得到的实例共享同一份状态。
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    inner: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 设置离线状态，离线时连接失败、探测返回 false
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn is_offline(&self) -> bool {
        self.state().offline
    }

    /// 设置网络延迟模拟（毫秒）
    pub fn set_network_delay(&self, delay_ms: u64) {
        self.state().network_delay_ms = delay_ms;
    }

    /// 设置错误模拟
    pub fn set_error_simulation(&self, enable: bool, error_rate: f64) {
        let mut state = self.state();
        state.simulate_errors = enable;
        state.error_rate = error_rate.clamp(0.0, 1.0);
    }

    /// 预置字节数据
    pub fn preset_bytes(&self, location: AddressLocation, data: &[u8]) {
        let (key, start) = byte_region(location);
        let mut state = self.state();
        let region = state.regions.entry(key).or_default();
        ensure_len(region, start + data.len());
        region[start..start + data.len()].copy_from_slice(data);
    }

    /// 预置位数据
    pub fn preset_bits(&self, location: AddressLocation, bits: &[bool]) {
        let (key, start) = bit_region(location);
        let mut state = self.state();
        let region = state.regions.entry(key).or_default();
        store_bits(region, start, bits);
    }

    /// 读取字节数据，未写入过的位置为 0
    pub fn peek_bytes(&self, location: AddressLocation, count: usize) -> Vec<u8> {
        let (key, start) = byte_region(location);
        let state = self.state();
        load_bytes(state.regions.get(&key), start, count)
    }

    /// 读取位数据
    pub fn peek_bits(&self, location: AddressLocation, count: usize) -> Vec<bool> {
        let (key, start) = bit_region(location);
        let state = self.state();
        load_bits(state.regions.get(&key), start, count)
    }

    /// 写入日志
    pub fn write_log(&self) -> Vec<WriteOperation> {
        self.state().write_log.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state().write_log.len()
    }

    pub fn clear_write_log(&self) {
        self.state().write_log.clear();
    }

    /// 清空存储与日志
    pub fn reset(&self) {
        let mut state = self.state();
        state.regions.clear();
        state.write_log.clear();
    }

    fn network_delay(&self) -> Duration {
        Duration::from_millis(self.state().network_delay_ms)
    }

    /// 按错误率决定本次操作是否失败
    fn simulated_failure(&self, operation: &str) -> AppResult<()> {
        let (enabled, rate) = {
            let state = self.state();
            (state.simulate_errors, state.error_rate)
        };
        if enabled && rand::thread_rng().gen::<f64>() < rate {
            return Err(AppError::plc_communication_error(
                SIMULATED_ERROR_CODE,
                format!("模拟通讯错误: {}", operation),
            ));
        }
        Ok(())
    }

    fn record_write(&self, location: AddressLocation, value: serde_json::Value) {
        self.state().write_log.push(WriteOperation {
            timestamp: Utc::now(),
            location,
            value,
        });
    }
}

fn ensure_len(region: &mut Vec<u8>, len: usize) {
    if region.len() < len {
        region.resize(len, 0);
    }
}

/// 字节访问的存储区与起始字节
fn byte_region(location: AddressLocation) -> (RegionKey, usize) {
    match location {
        AddressLocation::S7 {
            area,
            db_number,
            byte_offset,
            ..
        } => (RegionKey::S7 { area, db_number }, byte_offset as usize),
        AddressLocation::Modbus {
            register_type,
            offset,
        } => (RegionKey::Modbus(register_type), offset as usize * 2),
    }
}

/// 位访问的存储区与起始位序号
fn bit_region(location: AddressLocation) -> (RegionKey, usize) {
    let key = byte_region(location).0;
    (key, location.bit_index() as usize)
}

fn load_bytes(region: Option<&Vec<u8>>, start: usize, count: usize) -> Vec<u8> {
    (start..start + count)
        .map(|i| region.and_then(|r| r.get(i).copied()).unwrap_or(0))
        .collect()
}

fn load_bits(region: Option<&Vec<u8>>, start: usize, count: usize) -> Vec<bool> {
    (start..start + count)
        .map(|i| {
            region
                .and_then(|r| r.get(i / 8))
                .map(|byte| byte & (1 << (i % 8)) != 0)
                .unwrap_or(false)
        })
        .collect()
}

fn store_bits(region: &mut Vec<u8>, start: usize, bits: &[bool]) {
    ensure_len(region, (start + bits.len() + 7) / 8);
    for (i, bit) in bits.iter().enumerate() {
        let index = start + i;
        let mask = 1u8 << (index % 8);
        if *bit {
            region[index / 8] |= mask;
        } else {
            region[index / 8] &= !mask;
        }
    }
}

/// 模拟传输
pub struct SimulatedTransport {
    endpoint_name: String,
    device: SimulatedDevice,
    connected: bool,
}

impl SimulatedTransport {
    pub fn new(endpoint_name: impl Into<String>, device: SimulatedDevice) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            device,
            connected: false,
        }
    }

    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    /// 网络延迟 + 连接检查 + 错误模拟
    async fn begin(&self, operation: &str) -> AppResult<()> {
        let delay = self.device.network_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.connected {
            return Err(AppError::connection_error(self.endpoint_name.clone(), "模拟PLC未连接"));
        }
        if self.device.is_offline() {
            return Err(AppError::plc_communication_error(
                SIMULATED_ERROR_CODE,
                format!("模拟PLC {} 离线", self.endpoint_name),
            ));
        }
        self.device.simulated_failure(operation)
    }
}

#[async_trait]
impl PlcTransport for SimulatedTransport {
    fn protocol(&self) -> PlcProtocol {
        PlcProtocol::Simulated
    }

    async fn connect(&mut self) -> AppResult<()> {
        let delay = self.device.network_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.device.is_offline() {
            self.connected = false;
            return Err(AppError::connection_error(
                self.endpoint_name.clone(),
                "模拟PLC离线",
            ));
        }
        self.connected = true;
        log::debug!("模拟PLC {} 已连接", self.endpoint_name);
        Ok(())
    }

    async fn probe(&mut self) -> AppResult<bool> {
        if !self.connected {
            return Ok(false);
        }
        let delay = self.device.network_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(!self.device.is_offline())
    }

    async fn read_bits(&mut self, location: AddressLocation, count: usize) -> AppResult<Vec<bool>> {
        self.begin("read_bits").await?;
        Ok(self.device.peek_bits(location, count))
    }

    async fn read_bytes(&mut self, location: AddressLocation, count: usize) -> AppResult<Vec<u8>> {
        self.begin("read_bytes").await?;
        Ok(self.device.peek_bytes(location, count))
    }

    async fn write_bits(&mut self, location: AddressLocation, values: Vec<bool>) -> AppResult<()> {
        self.begin("write_bits").await?;
        self.device.preset_bits(location, &values);
        self.device.record_write(location, serde_json::json!(values));
        Ok(())
    }

    async fn write_bytes(&mut self, location: AddressLocation, data: Vec<u8>) -> AppResult<()> {
        self.begin("write_bytes").await?;
        self.device.preset_bytes(location, &data);
        self.device.record_write(location, serde_json::json!(data));
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        if self.connected {
            self.connected = false;
            log::debug!("模拟PLC {} 已断开", self.endpoint_name);
        }
        Ok(())
    }
}
