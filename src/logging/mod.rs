//! # 日志记录模块 (Logging Module)
//!
//! ## 业务说明
//! 记录PLC客户端运行过程中的连接、读写与配置事件，为现场故障排查提供依据。
//!
//! ## 日志策略
//! - **通讯失败**: 读写、探测、连接过程中的失败，包含端点和地址
//! - **用户操作**: 打开/关闭/重连连接等生命周期事件
//! - **配置警告**: 可以继续运行但值得注意的配置问题
//!
//! ## 输出方式
//! - 含文件目标时使用 [`SimpleLogger`]（控制台 + 文件）
//! - 仅控制台时使用 env_logger，支持 `RUST_LOG` 环境变量

/// 便捷日志宏 - 按问题类别记录

/// 记录通讯失败日志
#[macro_export]
macro_rules! log_communication_failure {
    ($msg:expr) => {
        log::error!("[通讯失败] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::error!("[通讯失败] {}", format!($msg, $($arg)*));
    };
}

/// 记录用户操作日志
#[macro_export]
macro_rules! log_user_operation {
    ($msg:expr) => {
        log::info!("[用户操作] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::info!("[用户操作] {}", format!($msg, $($arg)*));
    };
}

/// 记录用户配置操作警告
#[macro_export]
macro_rules! log_config_warning {
    ($msg:expr) => {
        log::warn!("[配置警告] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::warn!("[配置警告] {}", format!($msg, $($arg)*));
    };
}

pub mod logger_config;
pub mod simple_logger;

pub use logger_config::*;
pub use simple_logger::SimpleLogger;

use once_cell::sync::OnceCell;

use crate::utils::error::{AppError, AppResult};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// 初始化全局日志
///
/// 只会执行一次，重复调用直接返回成功。宿主进程已经安装了其它 logger 时
/// 保留宿主的 logger，仅输出一条警告。
pub fn init_logging(config: &LoggerConfig) -> AppResult<()> {
    LOGGER_INIT
        .get_or_try_init(|| install_logger(config))
        .map(|_| ())
}

fn install_logger(config: &LoggerConfig) -> AppResult<()> {
    let level: log::LevelFilter = config.level.into();

    let installed = if config.file_path().is_some() {
        let logger = SimpleLogger::new(config.clone());
        logger.open_file_target().map_err(|e| {
            AppError::io_error(format!("打开日志文件失败: {}", e), e.kind().to_string())
        })?;
        let installed = log::set_boxed_logger(Box::new(logger)).is_ok();
        if installed {
            log::set_max_level(level);
        }
        installed
    } else {
        let logger = console_logger(level, std::env::var("RUST_LOG").ok().as_deref());
        let max_level = logger.filter();
        let installed = log::set_boxed_logger(Box::new(logger)).is_ok();
        if installed {
            log::set_max_level(max_level);
        }
        installed
    };

    if installed {
        log::info!("日志系统初始化完成, 级别: {:?}", config.level);
    } else {
        log_config_warning!("已存在全局logger，沿用宿主进程的日志配置");
    }
    Ok(())
}

/// 构建控制台 logger：配置级别作为默认值，`RUST_LOG` 存在时以其为准
fn console_logger(level: log::LevelFilter, env_filter: Option<&str>) -> env_logger::Logger {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Some(filters) = env_filter {
        builder.parse_filters(filters);
    }
    builder.build()
}

// 重新导出宏
pub use crate::{log_communication_failure, log_config_warning, log_user_operation};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_overrides_configured_level() {
        let logger = console_logger(log::LevelFilter::Info, Some("debug"));
        assert_eq!(logger.filter(), log::LevelFilter::Debug);

        let logger = console_logger(log::LevelFilter::Warn, None);
        assert_eq!(logger.filter(), log::LevelFilter::Warn);

        let logger = console_logger(log::LevelFilter::Info, Some("lec_plc=trace"));
        assert_eq!(logger.filter(), log::LevelFilter::Trace);
    }
}
