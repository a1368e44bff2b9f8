//! # 同步客户端
//!
//! 给没有异步运行时的调用方使用：内部持有一个单线程 tokio 运行时，
//! 每个方法都在其上 `block_on` 对应的异步操作。
//!
//! 不能在 tokio 运行时内部调用这些方法。

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

use super::plc_client::PlcClient;
use crate::domain::services::TransportFactory;
use crate::models::{
    ConnectionHandle, ConnectionState, PlcDataType, ResultEnvelope, SuccessFlag, WriteValue,
};
use crate::utils::config::{AppConfig, EndpointConfig};
use crate::utils::error::{AppError, AppResult};

/// 同步PLC客户端
pub struct BlockingPlcClient {
    runtime: Runtime,
    client: PlcClient,
}

impl BlockingPlcClient {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        Self::from_client(PlcClient::new(config)?)
    }

    pub fn with_factory(config: AppConfig, factory: Arc<dyn TransportFactory>) -> AppResult<Self> {
        Self::from_client(PlcClient::with_factory(config, factory)?)
    }

    pub fn from_client(client: PlcClient) -> AppResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AppError::io_error(format!("创建运行时失败: {}", e), e.kind().to_string()))?;
        Ok(Self { runtime, client })
    }

    /// 内部的异步客户端
    pub fn client(&self) -> &PlcClient {
        &self.client
    }

    pub fn open(&self, endpoint: EndpointConfig) -> AppResult<ConnectionHandle> {
        self.runtime.block_on(self.client.open(endpoint))
    }

    pub fn open_endpoint(&self, name: &str) -> AppResult<ConnectionHandle> {
        self.runtime.block_on(self.client.open_endpoint(name))
    }

    pub fn test(&self, handle: &str) -> AppResult<SuccessFlag> {
        self.runtime.block_on(self.client.test(handle))
    }

    pub fn close(&self, handle: &str) -> AppResult<()> {
        self.runtime.block_on(self.client.close(handle))
    }

    pub fn reconnect(&self, handle: &str) -> AppResult<()> {
        self.runtime.block_on(self.client.reconnect(handle))
    }

    pub fn connection_state(&self, handle: &str) -> ConnectionState {
        self.runtime.block_on(self.client.connection_state(handle))
    }

    pub fn read_node_values(
        &self,
        plc: &str,
        address: &str,
        data_type: PlcDataType,
        length: usize,
    ) -> ResultEnvelope {
        self.runtime
            .block_on(self.client.read_node_values(plc, address, data_type, length))
    }

    pub fn write_node_values(
        &self,
        plc: &str,
        address: &str,
        data_type: PlcDataType,
        value: impl Into<WriteValue>,
    ) -> SuccessFlag {
        self.runtime
            .block_on(self.client.write_node_values(plc, address, data_type, value))
    }

    pub fn try_write_node_values(
        &self,
        plc: &str,
        address: &str,
        data_type: PlcDataType,
        value: impl Into<WriteValue>,
    ) -> AppResult<()> {
        self.runtime
            .block_on(self.client.try_write_node_values(plc, address, data_type, value))
    }

    pub fn invoke(&self, method: &str, args: &[Value]) -> AppResult<ResultEnvelope> {
        self.runtime.block_on(self.client.invoke(method, args))
    }

    pub fn dispose(&self) -> AppResult<()> {
        self.runtime.block_on(self.client.dispose())
    }
}

impl Drop for BlockingPlcClient {
    fn drop(&mut self) {
        if tokio::runtime::Handle::try_current().is_ok() {
            log::warn!("在异步运行时内释放同步客户端，跳过关闭连接");
            return;
        }
        if let Err(e) = self.runtime.block_on(self.client.dispose()) {
            log::warn!("释放同步客户端时关闭连接失败: {}", e);
        }
    }
}
