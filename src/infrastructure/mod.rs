//! 基础设施层模块
//!
//! 包含各协议的传输实现与默认传输工厂

pub mod plc;

// 重新导出基础设施组件
pub use plc::*;
