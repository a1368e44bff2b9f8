//! # Modbus TCP 传输
//!
//! 基于 tokio-modbus 的 [`PlcTransport`] 实现。
//!
//! - 线圈/离散输入按位读写，单次请求最多 2000 位读、1968 位写
//! - 寄存器按大端展开为字节，单次请求最多 125 个寄存器读、123 个寄存器写
//! - 超出单次上限的请求自动拆分

use async_trait::async_trait;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::domain::impls::ValueCodec;
use crate::domain::services::PlcTransport;
use crate::models::{AddressLocation, ModbusRegisterType, PlcProtocol};
use crate::utils::config::EndpointConfig;
use crate::utils::error::{AppError, AppResult};

const MAX_READ_BITS: usize = 2000;
const MAX_WRITE_BITS: usize = 1968;
const MAX_READ_REGISTERS: usize = 125;
const MAX_WRITE_REGISTERS: usize = 123;

/// Modbus TCP 传输
pub struct ModbusTcpTransport {
    endpoint: EndpointConfig,
    context: Option<Context>,
}

impl ModbusTcpTransport {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            context: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    fn context(&mut self) -> AppResult<&mut Context> {
        let name = self.endpoint.name.clone();
        self.context
            .as_mut()
            .ok_or_else(|| AppError::connection_error(name, "连接已断开"))
    }
}

/// 提取 Modbus 位置
fn modbus_location(location: AddressLocation) -> AppResult<(ModbusRegisterType, u16)> {
    match location {
        AddressLocation::Modbus {
            register_type,
            offset,
        } => Ok((register_type, offset)),
        AddressLocation::S7 { .. } => Err(AppError::malformed_address_error(
            format!("{:?}", location),
            "Modbus 传输不能访问 S7 地址",
        )),
    }
}

/// 计算分片起始地址
fn chunk_address(start: u16, index: usize) -> AppResult<u16> {
    u16::try_from(start as usize + index)
        .map_err(|_| AppError::invalid_argument_error("访问范围超出Modbus地址空间"))
}

/// 展开 tokio-modbus 的嵌套结果
///
/// 异常响应保留设备返回的异常码（如 0x02 非法数据地址）。
fn flatten<T>(
    result: Result<Result<T, ExceptionCode>, tokio_modbus::Error>,
    operation: &str,
) -> AppResult<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(AppError::plc_communication_error(
            u8::from(exception) as i32,
            format!("{} 收到Modbus异常: {}", operation, exception),
        )),
        Err(e) => Err(AppError::from(e)),
    }
}

#[async_trait]
impl PlcTransport for ModbusTcpTransport {
    fn protocol(&self) -> PlcProtocol {
        PlcProtocol::ModbusTcp
    }

    async fn connect(&mut self) -> AppResult<()> {
        self.context = None;

        let address = self.endpoint.socket_address();
        let socket_addr = tokio::net::lookup_host(&address)
            .await
            .map_err(|e| AppError::connection_error(&self.endpoint.name, format!("无效的地址 {}: {}", address, e)))?
            .next()
            .ok_or_else(|| AppError::connection_error(&self.endpoint.name, format!("无法解析地址 {}", address)))?;

        let context = tcp::connect_slave(socket_addr, Slave(self.endpoint.unit_id))
            .await
            .map_err(|e| AppError::connection_error(&self.endpoint.name, format!("Modbus连接失败: {}", e)))?;

        self.context = Some(context);
        log::debug!("Modbus连接已建立: {} (从站 {})", address, self.endpoint.unit_id);
        Ok(())
    }

    async fn probe(&mut self) -> AppResult<bool> {
        let Some(context) = self.context.as_mut() else {
            return Ok(false);
        };
        Ok(matches!(context.read_holding_registers(0, 1).await, Ok(Ok(_))))
    }

    async fn read_bits(&mut self, location: AddressLocation, count: usize) -> AppResult<Vec<bool>> {
        let (register_type, start) = modbus_location(location)?;
        let context = self.context()?;

        let mut bits = Vec::with_capacity(count);
        let mut index = 0;
        while index < count {
            let quantity = (count - index).min(MAX_READ_BITS);
            let address = chunk_address(start, index)?;
            let mut chunk = match register_type {
                ModbusRegisterType::Coil => {
                    flatten(context.read_coils(address, quantity as u16).await, "读取线圈")?
                }
                ModbusRegisterType::DiscreteInput => flatten(
                    context.read_discrete_inputs(address, quantity as u16).await,
                    "读取离散输入",
                )?,
                other => {
                    return Err(AppError::invalid_argument_error(format!(
                        "{:?} 不能按位读取",
                        other
                    )));
                }
            };
            chunk.truncate(quantity);
            bits.extend(chunk);
            index += quantity;
        }
        Ok(bits)
    }

    async fn read_bytes(&mut self, location: AddressLocation, count: usize) -> AppResult<Vec<u8>> {
        let (register_type, start) = modbus_location(location)?;
        if count % 2 != 0 {
            return Err(AppError::invalid_argument_error("寄存器读取字节数必须为偶数"));
        }
        let context = self.context()?;

        let total = count / 2;
        let mut registers = Vec::with_capacity(total);
        let mut index = 0;
        while index < total {
            let quantity = (total - index).min(MAX_READ_REGISTERS);
            let address = chunk_address(start, index)?;
            let chunk = match register_type {
                ModbusRegisterType::HoldingRegister => flatten(
                    context.read_holding_registers(address, quantity as u16).await,
                    "读取保持寄存器",
                )?,
                ModbusRegisterType::InputRegister => flatten(
                    context.read_input_registers(address, quantity as u16).await,
                    "读取输入寄存器",
                )?,
                other => {
                    return Err(AppError::invalid_argument_error(format!(
                        "{:?} 不能按寄存器读取",
                        other
                    )));
                }
            };
            registers.extend(chunk);
            index += quantity;
        }
        Ok(ValueCodec::registers_to_bytes(&registers))
    }

    async fn write_bits(&mut self, location: AddressLocation, values: Vec<bool>) -> AppResult<()> {
        let (register_type, start) = modbus_location(location)?;
        if register_type != ModbusRegisterType::Coil {
            return Err(AppError::invalid_argument_error(format!(
                "{:?} 为只读区域",
                register_type
            )));
        }
        let context = self.context()?;

        if values.len() == 1 {
            return flatten(context.write_single_coil(start, values[0]).await, "写入线圈");
        }

        for (chunk_index, chunk) in values.chunks(MAX_WRITE_BITS).enumerate() {
            let address = chunk_address(start, chunk_index * MAX_WRITE_BITS)?;
            flatten(context.write_multiple_coils(address, chunk).await, "写入线圈")?;
        }
        Ok(())
    }

    async fn write_bytes(&mut self, location: AddressLocation, data: Vec<u8>) -> AppResult<()> {
        let (register_type, start) = modbus_location(location)?;
        if register_type != ModbusRegisterType::HoldingRegister {
            return Err(AppError::invalid_argument_error(format!(
                "{:?} 为只读区域",
                register_type
            )));
        }
        let registers = ValueCodec::bytes_to_registers(&data)?;
        let context = self.context()?;

        if registers.len() == 1 {
            return flatten(
                context.write_single_register(start, registers[0]).await,
                "写入保持寄存器",
            );
        }

        for (chunk_index, chunk) in registers.chunks(MAX_WRITE_REGISTERS).enumerate() {
            let address = chunk_address(start, chunk_index * MAX_WRITE_REGISTERS)?;
            flatten(
                context.write_multiple_registers(address, chunk).await,
                "写入保持寄存器",
            )?;
        }
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        // 释放 Context 即断开 TCP 连接
        if self.context.take().is_some() {
            log::debug!("Modbus连接已关闭: {}", self.endpoint.socket_address());
        }
        Ok(())
    }
}
