//! # 数据模型模块
//!
//! 定义客户端各层共享的数据结构：协议/数据类型枚举、连接句柄、节点地址、
//! PLC数值以及统一结果信封。

pub mod data_types;
pub mod enums;
pub mod result_envelope;
pub mod structs;

pub use data_types::DataTypeRegistry;
pub use enums::*;
pub use result_envelope::{ErrorCode, ResultEnvelope, SuccessFlag};
pub use structs::*;
