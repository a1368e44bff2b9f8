//! # 领域层实现模块 (Domain Implementations)
//!
//! ## 业务说明
//! 本模块包含与协议无关的核心业务逻辑，传输层通过 [`crate::domain::services::PlcTransport`] 注入
//!
//! ## 核心实现
//! - **地址解析**: NodeAddressResolver - 把地址文本解析为物理位置
//! - **数值编解码**: ValueCodec - PLC数值与设备字节之间的转换
//! - **连接管理**: ConnectionManager - 管理句柄的生命周期
//! - **通讯引擎**: CommunicationEngine - 在打开的句柄上执行类型化读写

pub mod communication_engine;
pub mod connection_manager;
pub mod node_address_resolver;
pub mod value_codec;


pub use communication_engine::CommunicationEngine;
pub use connection_manager::{ConnectionManager, ManagedConnection, Session};
pub use node_address_resolver::{parse_modbus_address_ex, AddressingProfile, NodeAddressResolver};
pub use value_codec::ValueCodec;
