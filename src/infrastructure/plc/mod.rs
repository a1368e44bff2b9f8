//! PLC传输实现
//!
//! - `s7_transport`: 西门子 S7 (ISO-on-TCP)
//! - `modbus_transport`: Modbus TCP
//! - `simulated_transport`: 内存模拟设备
//! - `transport_factory`: 按端点协议创建传输

pub mod modbus_transport;
pub mod s7_transport;
pub mod simulated_transport;
pub mod transport_factory;

#[cfg(test)]
mod tests;

pub use modbus_transport::ModbusTcpTransport;
pub use s7_transport::S7TcpTransport;
pub use simulated_transport::{SimulatedDevice, SimulatedTransport, WriteOperation};
pub use transport_factory::DefaultTransportFactory;
