//! 领域层模块
//!
//! 包含地址解析、数值编解码、连接生命周期与读写引擎，以及传输层需要实现的接口定义

pub mod services;
pub mod impls;

// 重新导出领域服务
pub use services::*;
pub use impls::*;
