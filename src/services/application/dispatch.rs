//! # 按名称调用
//!
//! 供脚本/绑定层使用的动态入口：`invoke("ReadNodeValues", [plc, address, type, length])`。
//! 参数与返回值都是 JSON 形态，结果统一包装为 [`ResultEnvelope`]。
//!
//! | 操作 | 参数 | 内容 |
//! |------|------|------|
//! | `Open` | 端点名称或端点配置对象 | `[句柄ID]` |
//! | `Test` | `[句柄]` | 无 |
//! | `Close` | `[句柄]` | 无 |
//! | `Reconnect` | `[句柄]` | 无 |
//! | `ConnectionState` | `[句柄]` | `[状态]` |
//! | `ReadNodeValues` | plc, 地址, 类型, `[长度]` | 读到的值 |
//! | `WriteNodeValues` | plc, 地址, 类型, 值 | 无 |
//!
//! 句柄参数可省略，省略时使用最近一次打开的句柄。

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde_json::Value;

use super::plc_client::PlcClient;
use crate::models::{PlcValue, ResultEnvelope, WriteValue};
use crate::utils::config::EndpointConfig;
use crate::utils::error::{AppError, AppResult};

/// 可按名称调用的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Test,
    Close,
    Reconnect,
    ConnectionState,
    ReadNodeValues,
    WriteNodeValues,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Open,
        Operation::Test,
        Operation::Close,
        Operation::Reconnect,
        Operation::ConnectionState,
        Operation::ReadNodeValues,
        Operation::WriteNodeValues,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Open => "Open",
            Operation::Test => "Test",
            Operation::Close => "Close",
            Operation::Reconnect => "Reconnect",
            Operation::ConnectionState => "ConnectionState",
            Operation::ReadNodeValues => "ReadNodeValues",
            Operation::WriteNodeValues => "WriteNodeValues",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Operation {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| AppError::unknown_operation_error(s, "PlcClient"))
    }
}

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> AppResult<&'a Value> {
    args.get(index)
        .ok_or_else(|| AppError::invalid_argument_error(format!("缺少参数 {}", name)))
}

fn str_arg<'a>(args: &'a [Value], index: usize, name: &str) -> AppResult<&'a str> {
    arg(args, index, name)?
        .as_str()
        .ok_or_else(|| AppError::invalid_argument_error(format!("参数 {} 必须为字符串", name)))
}

fn length_arg(args: &[Value], index: usize) -> AppResult<usize> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(1),
        Some(value) => value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| AppError::invalid_argument_error("参数 length 必须为非负整数")),
    }
}

/// 状态类错误向调用方抛出，其余错误包装进信封
fn envelope_or_raise(result: AppResult<ResultEnvelope>) -> AppResult<ResultEnvelope> {
    match result {
        Ok(envelope) => Ok(envelope),
        Err(e @ AppError::InvalidStateError { .. }) => Err(e),
        Err(e) => Ok(ResultEnvelope::from_error(&e)),
    }
}

impl PlcClient {
    /// 按名称调用操作
    ///
    /// 未知的操作名返回 [`AppError::UnknownOperationError`]。
    pub async fn invoke(&self, method: &str, args: &[Value]) -> AppResult<ResultEnvelope> {
        let operation: Operation = method.parse()?;
        log::debug!("invoke {} ({} 个参数)", operation, args.len());

        match operation {
            Operation::Open => {
                let handle = match arg(args, 0, "endpoint")? {
                    Value::String(name) => self.open_endpoint(name).await?,
                    value @ Value::Object(_) => {
                        let endpoint: EndpointConfig = serde_json::from_value(value.clone())
                            .map_err(|e| AppError::invalid_argument_error(format!("无效的端点配置: {}", e)))?;
                        self.open(endpoint).await?
                    }
                    _ => {
                        return Err(AppError::invalid_argument_error(
                            "参数 endpoint 必须为端点名称或端点配置对象",
                        ));
                    }
                };
                Ok(ResultEnvelope::success(Some(vec![PlcValue::String(handle.handle_id)])))
            }
            Operation::Test => {
                let handle = self.handle_arg(args).await?;
                envelope_or_raise(
                    self.test(&handle)
                        .await
                        .map(|flag| ResultEnvelope::from_boolean(flag.is_success)),
                )
            }
            Operation::Close => {
                let handle = self.handle_arg(args).await?;
                self.close(&handle).await?;
                Ok(ResultEnvelope::from_boolean(true))
            }
            Operation::Reconnect => {
                let handle = self.handle_arg(args).await?;
                envelope_or_raise(
                    self.reconnect(&handle)
                        .await
                        .map(|_| ResultEnvelope::from_boolean(true)),
                )
            }
            Operation::ConnectionState => {
                let handle = self.handle_arg(args).await?;
                let state = self.connection_state(&handle).await;
                Ok(ResultEnvelope::success(Some(vec![PlcValue::String(state.to_string())])))
            }
            Operation::ReadNodeValues => {
                let plc = str_arg(args, 0, "plc")?;
                let address = str_arg(args, 1, "address")?;
                let type_name = str_arg(args, 2, "data_type")?;
                let length = length_arg(args, 3)?;
                Ok(self.read_node_values_named(plc, address, type_name, length).await)
            }
            Operation::WriteNodeValues => {
                let plc = str_arg(args, 0, "plc")?;
                let address = str_arg(args, 1, "address")?;
                let type_name = str_arg(args, 2, "data_type")?;
                let raw = arg(args, 3, "value")?;

                Ok(match self.write_json_value(plc, address, type_name, raw).await {
                    Ok(()) => ResultEnvelope::from_boolean(true),
                    Err(e) => {
                        log_communication_failure!("写入 {} 地址 {} 失败: {}", plc, address, e);
                        ResultEnvelope::from_error(&e)
                    }
                })
            }
        }
    }

    async fn write_json_value(&self, plc: &str, address: &str, type_name: &str, raw: &Value) -> AppResult<()> {
        let data_type = self.parse_data_type(type_name).await?;
        let value = WriteValue::from_json(raw, data_type)?;
        self.try_write_node_values(plc, address, data_type, value).await
    }

    /// 句柄参数；省略时使用最近一次打开的句柄
    async fn handle_arg(&self, args: &[Value]) -> AppResult<String> {
        match args.first() {
            None | Some(Value::Null) => self.default_handle().await.ok_or_else(|| {
                AppError::invalid_state_error("", "Unopened", "没有已打开的连接，需要指定句柄")
            }),
            Some(Value::String(handle)) => Ok(handle.clone()),
            Some(_) => Err(AppError::invalid_argument_error("句柄参数必须为字符串")),
        }
    }
}
