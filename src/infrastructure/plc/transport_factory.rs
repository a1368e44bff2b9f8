//! 默认传输工厂
//!
//! 按端点协议创建传输实例。模拟设备按端点名称缓存，同名端点的多次连接看到同一份数据。

use std::collections::HashMap;
use std::sync::Mutex;

use super::modbus_transport::ModbusTcpTransport;
use super::s7_transport::S7TcpTransport;
use super::simulated_transport::{SimulatedDevice, SimulatedTransport};
use crate::domain::services::{PlcTransport, TransportFactory};
use crate::models::PlcProtocol;
use crate::utils::config::EndpointConfig;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Default)]
pub struct DefaultTransportFactory {
    simulated: Mutex<HashMap<String, SimulatedDevice>>,
}

impl DefaultTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取（必要时创建）端点对应的模拟设备
    pub fn simulated_device(&self, name: &str) -> AppResult<SimulatedDevice> {
        let mut devices = self
            .simulated
            .lock()
            .map_err(|_| AppError::concurrency_error("模拟设备表锁已损坏"))?;
        Ok(devices.entry(name.to_string()).or_default().clone())
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, endpoint: &EndpointConfig) -> AppResult<Box<dyn PlcTransport>> {
        let transport: Box<dyn PlcTransport> = match endpoint.protocol {
            PlcProtocol::SiemensS7 => Box::new(S7TcpTransport::new(endpoint.clone())),
            PlcProtocol::ModbusTcp => Box::new(ModbusTcpTransport::new(endpoint.clone())),
            PlcProtocol::Simulated => {
                let device = self.simulated_device(&endpoint.name)?;
                Box::new(SimulatedTransport::new(endpoint.name.clone(), device))
            }
        };
        Ok(transport)
    }
}
