use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use super::structs::PlcValue;
use crate::utils::error::AppError;

/// 数值错误码
///
/// 0 表示成功，其余为驱动/协议相关的失败码。错误码是可扩展的集合：
/// 设备返回的原始错误码原样透传，下面的常量只覆盖客户端自身的错误分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const SUCCESS: ErrorCode = ErrorCode(0);
    pub const OPERATION_FAILED: ErrorCode = ErrorCode(1);
    pub const CONNECTION: ErrorCode = ErrorCode(1001);
    pub const INVALID_STATE: ErrorCode = ErrorCode(1002);
    pub const UNSUPPORTED_TYPE: ErrorCode = ErrorCode(1003);
    pub const MALFORMED_ADDRESS: ErrorCode = ErrorCode(1004);
    pub const INVALID_ARGUMENT: ErrorCode = ErrorCode(1005);
    pub const LENGTH_MISMATCH: ErrorCode = ErrorCode(1006);
    pub const TIMEOUT: ErrorCode = ErrorCode(1007);
    pub const UNKNOWN_OPERATION: ErrorCode = ErrorCode(1008);
    pub const COMMUNICATION: ErrorCode = ErrorCode(1009);
    pub const CONFIGURATION: ErrorCode = ErrorCode(1010);
    pub const INTERNAL: ErrorCode = ErrorCode(1099);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&AppError> for ErrorCode {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::ConnectionError { .. } => ErrorCode::CONNECTION,
            AppError::InvalidStateError { .. } => ErrorCode::INVALID_STATE,
            AppError::UnsupportedTypeError { .. } => ErrorCode::UNSUPPORTED_TYPE,
            AppError::MalformedAddressError { .. } => ErrorCode::MALFORMED_ADDRESS,
            AppError::InvalidArgumentError { .. } => ErrorCode::INVALID_ARGUMENT,
            AppError::LengthMismatchError { .. } => ErrorCode::LENGTH_MISMATCH,
            AppError::TimeoutError { .. } => ErrorCode::TIMEOUT,
            AppError::UnknownOperationError { .. } => ErrorCode::UNKNOWN_OPERATION,
            // 设备返回的正数错误码原样透传
            AppError::PlcCommunicationError { code, .. } if *code > 0 => ErrorCode(*code),
            AppError::PlcCommunicationError { .. } | AppError::IoError { .. } => {
                ErrorCode::COMMUNICATION
            }
            AppError::ConfigurationError { .. } => ErrorCode::CONFIGURATION,
            AppError::ConcurrencyError { .. }
            | AppError::JsonError { .. }
            | AppError::Generic { .. } => ErrorCode::INTERNAL,
        }
    }
}

/// 统一结果信封
///
/// 所有公开操作都返回一个结果信封（或仅含成功标志的 [`SuccessFlag`]）。
/// 序列化字段名与原有绑定层保持一致：`ErrorCode`、`IsSuccess`、`Message`、`Content`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultEnvelope {
    pub error_code: ErrorCode,
    pub is_success: bool,
    pub message: String,
    pub content: Option<Vec<PlcValue>>,
}

impl ResultEnvelope {
    /// 成功结果，可携带内容
    pub fn success(content: Option<Vec<PlcValue>>) -> Self {
        Self {
            error_code: ErrorCode::SUCCESS,
            is_success: true,
            message: String::new(),
            content,
        }
    }

    /// 成功的列表结果
    pub fn success_list(values: Vec<PlcValue>) -> Self {
        Self::success(Some(values))
    }

    /// 失败结果，不携带内容
    ///
    /// 传入的错误码为 0 时改写为 `OPERATION_FAILED`，保证 `is_success == (error_code == 0)`。
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        let code = if code.is_success() { ErrorCode::OPERATION_FAILED } else { code };
        Self {
            error_code: code,
            is_success: false,
            message: message.into(),
            content: None,
        }
    }

    /// 列表形状的失败结果，内容为空序列而不是空值
    pub fn failure_list(code: ErrorCode, message: impl Into<String>) -> Self {
        let mut envelope = Self::failure(code, message);
        envelope.content = Some(Vec::new());
        envelope
    }

    /// 由布尔结果构造
    pub fn from_boolean(success: bool) -> Self {
        if success {
            Self::success(None)
        } else {
            Self::failure(ErrorCode::OPERATION_FAILED, "操作未成功")
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        Self::failure(ErrorCode::from(err), err.to_string())
    }

    pub fn failure_list_from_error(err: &AppError) -> Self {
        Self::failure_list(ErrorCode::from(err), err.to_string())
    }

    /// 读取内容；失败或无内容时返回空切片
    pub fn content_or_empty(&self) -> &[PlcValue] {
        self.content.as_deref().unwrap_or(&[])
    }

    pub fn to_success_flag(&self) -> SuccessFlag {
        SuccessFlag { is_success: self.is_success }
    }
}

/// 仅含成功标志的结果，用于 `Test` 与 `WriteNodeValues`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SuccessFlag {
    pub is_success: bool,
}

impl SuccessFlag {
    pub fn new(is_success: bool) -> Self {
        Self { is_success }
    }
}
