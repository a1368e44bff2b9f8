//! # PLC传输接口模块
//!
//! ## 业务作用
//! 定义与具体协议无关的最底层读写能力：
//! - 建立/关闭到设备的传输连接
//! - 按位读写（S7 位地址、Modbus 线圈/离散输入）
//! - 按字节读写（S7 字节区、Modbus 寄存器按大端展开为字节）
//!
//! 数值编解码、长度校验、超时控制都在领域层完成，传输层只搬运原始数据。
//!
//! ## 实现
//! - `S7TcpTransport`: ISO-on-TCP 上的 S7 协议
//! - `ModbusTcpTransport`: 基于 tokio-modbus
//! - `SimulatedTransport`: 内存模拟设备，用于测试与离线调试

use async_trait::async_trait;

use crate::models::{AddressLocation, PlcProtocol};
use crate::utils::config::EndpointConfig;
use crate::utils::error::AppResult;

/// PLC传输接口
///
/// 一个实例对应一条会话，调用方保证同一实例上的操作串行执行。
/// 实例总在会话锁之后独占访问，只要求 `Send`。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlcTransport: Send {
    /// 传输使用的协议
    fn protocol(&self) -> PlcProtocol;

    /// 建立连接；已连接时先释放旧连接
    async fn connect(&mut self) -> AppResult<()>;

    /// 轻量探测设备是否可达
    ///
    /// 未连接时返回 `Ok(false)`，协议层错误返回 `Err`。
    async fn probe(&mut self) -> AppResult<bool>;

    /// 从 `location` 起读取 `count` 个连续的位
    async fn read_bits(&mut self, location: AddressLocation, count: usize) -> AppResult<Vec<bool>>;

    /// 从 `location` 起读取 `count` 个字节
    ///
    /// Modbus 寄存器按每寄存器2字节、大端展开，`count` 必须为偶数。
    async fn read_bytes(&mut self, location: AddressLocation, count: usize) -> AppResult<Vec<u8>>;

    /// 从 `location` 起写入连续的位
    async fn write_bits(&mut self, location: AddressLocation, values: Vec<bool>) -> AppResult<()>;

    /// 从 `location` 起写入字节
    async fn write_bytes(&mut self, location: AddressLocation, data: Vec<u8>) -> AppResult<()>;

    /// 释放传输资源，重复调用无副作用
    async fn close(&mut self) -> AppResult<()>;
}

/// 传输工厂
///
/// 根据端点配置创建对应协议的传输实例（尚未连接）。
#[cfg_attr(test, mockall::automock)]
pub trait TransportFactory: Send + Sync {
    fn create(&self, endpoint: &EndpointConfig) -> AppResult<Box<dyn PlcTransport>>;
}
