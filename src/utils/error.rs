use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序统一错误类型
/// 用于封装PLC客户端中可能出现的各种错误，提供统一的错误处理机制
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppError {
    /// 连接错误（目标不可达、连接被拒绝、端点配置无效）
    #[error("连接错误: {endpoint} - {message}")]
    ConnectionError { endpoint: String, message: String },

    /// 状态错误（在未打开或已关闭的句柄上执行操作）
    #[error("状态错误: 句柄 {handle} 当前状态为 {state} - {message}")]
    InvalidStateError {
        handle: String,
        state: String,
        message: String,
    },

    /// 不支持的数据类型
    #[error("不支持的数据类型: {data_type} - {message}")]
    UnsupportedTypeError { data_type: String, message: String },

    /// 地址格式错误
    #[error("地址格式错误: {address} - {message}")]
    MalformedAddressError { address: String, message: String },

    /// 参数错误
    #[error("参数错误: {message}")]
    InvalidArgumentError { message: String },

    /// 长度不匹配（写入值的元素个数与目标跨度不一致）
    #[error("长度不匹配: 期望 {expected} 个元素, 实际 {actual} 个")]
    LengthMismatchError { expected: usize, actual: usize },

    /// 超时错误
    #[error("操作超时: {operation} - {message}")]
    TimeoutError {
        operation: String,
        message: String,
    },

    /// 未知操作（动态分派未命中）
    #[error("'{target}' 对象没有方法 '{method}'")]
    UnknownOperationError { method: String, target: String },

    /// PLC通信相关错误
    ///
    /// **业务含义**: 设备已连接，但请求被设备或协议层拒绝
    /// **错误码**: `code` 保留驱动层/协议层的原始错误码，便于故障定位
    #[error("PLC通信错误[{code}]: {message}")]
    PlcCommunicationError { code: i32, message: String },

    /// 配置相关错误
    #[error("配置错误: {message}")]
    ConfigurationError { message: String },

    /// 并发/锁相关错误
    #[error("并发错误: {message}")]
    ConcurrencyError { message: String },

    /// 输入/输出错误
    #[error("IO错误: {message} (Kind: {kind})")]
    IoError { message: String, kind: String },

    /// JSON序列化/反序列化错误
    #[error("JSON序列化/反序列化错误: {message}")]
    JsonError { message: String },

    /// 通用错误，包含错误消息
    #[error("通用错误: {message}")]
    Generic { message: String },
}

impl AppError {
    /// 创建连接错误
    pub fn connection_error(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionError {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// 创建状态错误
    pub fn invalid_state_error(
        handle: impl Into<String>,
        state: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidStateError {
            handle: handle.into(),
            state: state.into(),
            message: message.into(),
        }
    }

    /// 创建不支持的数据类型错误
    pub fn unsupported_type_error(data_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedTypeError {
            data_type: data_type.into(),
            message: message.into(),
        }
    }

    /// 创建地址格式错误
    pub fn malformed_address_error(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedAddressError {
            address: address.into(),
            message: message.into(),
        }
    }

    /// 创建参数错误
    pub fn invalid_argument_error(message: impl Into<String>) -> Self {
        Self::InvalidArgumentError {
            message: message.into(),
        }
    }

    /// 创建长度不匹配错误
    pub fn length_mismatch_error(expected: usize, actual: usize) -> Self {
        Self::LengthMismatchError { expected, actual }
    }

    /// 创建超时错误
    pub fn timeout_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TimeoutError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// 创建未知操作错误
    pub fn unknown_operation_error(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self::UnknownOperationError {
            method: method.into(),
            target: target.into(),
        }
    }

    /// 创建PLC通信错误
    ///
    /// **使用场景**:
    /// - 设备返回协议层错误码（S7 item return code、Modbus 异常码）
    /// - 报文格式校验失败
    ///
    /// **使用示例**:
    /// ```rust
    /// use lec_plc::utils::error::AppError;
    /// let err = AppError::plc_communication_error(0x0A, "对象不存在");
    /// assert_eq!(err.error_code(), "PLC_COMMUNICATION_ERROR");
    /// ```
    pub fn plc_communication_error(code: i32, message: impl Into<String>) -> Self {
        Self::PlcCommunicationError {
            code,
            message: message.into(),
        }
    }

    /// 创建配置错误
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// 创建并发错误
    pub fn concurrency_error(message: impl Into<String>) -> Self {
        Self::ConcurrencyError {
            message: message.into(),
        }
    }

    /// 创建IO错误
    pub fn io_error(message: impl Into<String>, kind_str: impl Into<String>) -> Self {
        Self::IoError {
            message: message.into(),
            kind: kind_str.into(),
        }
    }

    /// 创建JSON序列化错误
    pub fn json_error(message: impl Into<String>) -> Self {
        Self::JsonError {
            message: message.into(),
        }
    }

    /// 创建通用错误
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// 获取错误的简短描述
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::ConnectionError { .. } => "CONNECTION_ERROR",
            AppError::InvalidStateError { .. } => "INVALID_STATE_ERROR",
            AppError::UnsupportedTypeError { .. } => "UNSUPPORTED_TYPE_ERROR",
            AppError::MalformedAddressError { .. } => "MALFORMED_ADDRESS_ERROR",
            AppError::InvalidArgumentError { .. } => "INVALID_ARGUMENT_ERROR",
            AppError::LengthMismatchError { .. } => "LENGTH_MISMATCH_ERROR",
            AppError::TimeoutError { .. } => "TIMEOUT_ERROR",
            AppError::UnknownOperationError { .. } => "UNKNOWN_OPERATION_ERROR",
            AppError::PlcCommunicationError { .. } => "PLC_COMMUNICATION_ERROR",
            AppError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            AppError::ConcurrencyError { .. } => "CONCURRENCY_ERROR",
            AppError::IoError { .. } => "IO_ERROR",
            AppError::JsonError { .. } => "JSON_ERROR",
            AppError::Generic { .. } => "GENERIC",
        }
    }

    /// 是否为传输层错误（连接断开、超时、设备拒绝）
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            AppError::ConnectionError { .. }
                | AppError::TimeoutError { .. }
                | AppError::PlcCommunicationError { .. }
                | AppError::IoError { .. }
        )
    }
}

/// 标准 I/O 错误到 AppError 的转换
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError { message: err.to_string(), kind: format!("{:?}", err.kind()) }
    }
}

/// serde_json 错误到 AppError 的转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonError { message: err.to_string() }
    }
}

/// config crate 错误到 AppError 的转换
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigurationError { message: err.to_string() }
    }
}

/// 字符串错误到 AppError 的转换（通用错误）
impl From<String> for AppError {
    fn from(err_msg: String) -> Self {
        Self::Generic { message: err_msg }
    }
}

/// &str 错误到 AppError 的转换（通用错误）
impl From<&str> for AppError {
    fn from(err_msg: &str) -> Self {
        Self::Generic { message: err_msg.to_string() }
    }
}

/// 应用程序结果类型别名
pub type AppResult<T> = Result<T, AppError>;

/// tokio_modbus 错误到 AppError 的转换
///
/// **转换逻辑**:
/// - 协议异常（设备返回的异常码）保留异常码
/// - 传输层错误统一包装为PLC通信错误，错误码记为 -1
impl From<tokio_modbus::Error> for AppError {
    fn from(err: tokio_modbus::Error) -> Self {
        AppError::PlcCommunicationError {
            code: -1,
            message: format!("Modbus error: {}", err),
        }
    }
}
