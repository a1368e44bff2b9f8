//! # 通讯引擎模块
//!
//! ## 业务作用
//! 在已打开的句柄上执行类型化的读写：
//! - **读取**: 按地址与长度读取原始数据并解码，失败时返回空列表的失败信封
//! - **写入**: 所有校验（地址语法、可写性、跨度、类型转换、编码）都在发起 I/O 之前完成，
//!   任何一项失败都不会产生部分写入
//!
//! 每次操作都受端点的读写超时约束，成功后刷新句柄的最后活动时间。

use std::sync::Arc;

use tokio::time::timeout;

use super::connection_manager::{ConnectionManager, ManagedConnection};
use super::value_codec::ValueCodec;
use crate::models::{NodeAddress, PlcDataType, PlcValue, ResultEnvelope, WriteValue};
use crate::utils::error::{AppError, AppResult};

/// 通讯引擎
pub struct CommunicationEngine {
    connections: Arc<ConnectionManager>,
    string_capacity: usize,
}

impl CommunicationEngine {
    pub fn new(connections: Arc<ConnectionManager>, string_capacity: usize) -> Self {
        Self {
            connections,
            string_capacity,
        }
    }

    /// 读取节点值，结果统一包装为信封
    pub async fn read_node_values(&self, handle_id: &str, node: &NodeAddress) -> ResultEnvelope {
        match self.try_read_node_values(handle_id, node).await {
            Ok(values) => ResultEnvelope::success_list(values),
            Err(e) => {
                log_communication_failure!(
                    "读取 {} 地址 {} 失败: {}",
                    node.plc,
                    node.address,
                    e
                );
                ResultEnvelope::failure_list_from_error(&e)
            }
        }
    }

    /// 读取节点值
    pub async fn try_read_node_values(&self, handle_id: &str, node: &NodeAddress) -> AppResult<Vec<PlcValue>> {
        if node.length == 0 {
            return Err(AppError::invalid_argument_error("读取长度必须大于等于1"));
        }
        if let Some(span) = node.span {
            if span != node.length {
                return Err(AppError::length_mismatch_error(span, node.length));
            }
        }

        let connection = self.connections.get(handle_id).await?;
        check_scheme(&connection, node)?;
        let codec = self.codec_for(&connection);
        let limit = connection.operation_timeout();

        let mut session = connection.lock_open().await?;
        let location = node.location;

        let values = if node.data_type == PlcDataType::Bool {
            let bits = timeout(limit, session.transport().read_bits(location, node.length))
                .await
                .map_err(|_| read_timeout(node, limit.as_millis()))??;
            if bits.len() != node.length {
                return Err(AppError::plc_communication_error(
                    -1,
                    format!("设备返回 {} 个位，期望 {} 个", bits.len(), node.length),
                ));
            }
            ValueCodec::decode_bits(&bits)
        } else {
            let byte_len = codec.byte_len(node.data_type, node.length);
            let bytes = timeout(limit, session.transport().read_bytes(location, byte_len))
                .await
                .map_err(|_| read_timeout(node, limit.as_millis()))??;
            codec.decode(node.data_type, &bytes, node.length)?
        };

        session.touch();
        log::debug!("读取 {} {} 成功: {} 个值", node.plc, node.address, values.len());
        Ok(values)
    }

    /// 写入节点值
    ///
    /// 序列从 `node.location` 起连续写入；地址带 `[n]` 后缀时元素个数必须等于 n。
    pub async fn write_node_values(&self, handle_id: &str, node: &NodeAddress, value: WriteValue) -> AppResult<()> {
        let expected = node.span.unwrap_or(value.len().max(1));
        if value.is_empty() || value.len() != expected {
            return Err(AppError::length_mismatch_error(expected, value.len()));
        }
        if !node.location.is_writable() {
            return Err(AppError::invalid_argument_error(format!(
                "地址 {} 为只读区域",
                node.address
            )));
        }

        let connection = self.connections.get(handle_id).await?;
        check_scheme(&connection, node)?;
        let codec = self.codec_for(&connection);
        let limit = connection.operation_timeout();

        let elements = value
            .into_elements()
            .iter()
            .map(|v| v.coerce(node.data_type))
            .collect::<AppResult<Vec<_>>>()?;
        let count = elements.len();

        let payload = if node.data_type == PlcDataType::Bool {
            Payload::Bits(ValueCodec::encode_bits(&elements)?)
        } else {
            Payload::Bytes(codec.encode(node.data_type, &elements)?)
        };

        let mut session = connection.lock_open().await?;
        let location = node.location;
        let io = match payload {
            Payload::Bits(bits) => timeout(limit, session.transport().write_bits(location, bits)).await,
            Payload::Bytes(bytes) => timeout(limit, session.transport().write_bytes(location, bytes)).await,
        };

        match io {
            Ok(Ok(())) => {
                session.touch();
                log::debug!("写入 {} {} 成功: {} 个值", node.plc, node.address, count);
                Ok(())
            }
            Ok(Err(e)) => {
                log_communication_failure!("写入 {} 地址 {} 失败: {}", node.plc, node.address, e);
                Err(e)
            }
            Err(_) => {
                log_communication_failure!("写入 {} 地址 {} 超时", node.plc, node.address);
                Err(AppError::timeout_error(
                    "WriteNodeValues",
                    format!("写入 {} 超时 ({}ms)", node.address, limit.as_millis()),
                ))
            }
        }
    }

    fn codec_for(&self, connection: &ManagedConnection) -> ValueCodec {
        ValueCodec::new(connection.endpoint().effective_byte_order(), self.string_capacity)
    }
}

enum Payload {
    Bits(Vec<bool>),
    Bytes(Vec<u8>),
}

/// 地址语法必须与句柄所连端点一致
fn check_scheme(connection: &ManagedConnection, node: &NodeAddress) -> AppResult<()> {
    let expected = connection.endpoint().effective_address_scheme();
    if node.location.scheme() != expected {
        return Err(AppError::malformed_address_error(
            node.address.clone(),
            format!(
                "端点 {} 使用 {} 地址语法，收到的是 {} 地址",
                connection.endpoint().name,
                expected,
                node.location.scheme()
            ),
        ));
    }
    Ok(())
}

fn read_timeout(node: &NodeAddress, millis: u128) -> AppError {
    AppError::timeout_error(
        "ReadNodeValues",
        format!("读取 {} 超时 ({}ms)", node.address, millis),
    )
}
