/// LEC PLC 通讯客户端 - 核心库
///
/// 以统一的类型化接口读写西门子 S7 与 Modbus TCP 设备，也可以连接进程内的模拟PLC。
#[macro_use]
pub mod logging;
pub mod utils;
pub mod models;
pub mod domain;
pub mod infrastructure;
pub mod services;

// 重新导出常用类型，方便使用
pub use models::*;
pub use utils::{AppConfig, AppError, AppResult, EndpointConfig};
pub use services::{BaseService, BlockingPlcClient, Operation, PlcClient};

use logging::{init_logging, LoggerConfig};

/// 校验配置并初始化日志
///
/// 宿主程序在创建客户端之前调用一次即可；重复调用不会重新安装日志。
pub fn initialize(config: &AppConfig) -> AppResult<()> {
    utils::validate_config(config)?;
    init_logging(&LoggerConfig::from(&config.logging))?;
    log::info!("LEC PLC 客户端库已初始化");
    Ok(())
}
