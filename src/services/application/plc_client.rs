//! # PLC客户端门面
//!
//! ## 业务作用
//! 对调用方暴露的统一入口，组合地址解析、连接管理与读写引擎：
//! - 按端点名称（或完整端点配置）打开连接
//! - 以PLC名称寻址读写，内部维护 PLC名称 -> 句柄 的映射
//! - 读取返回结果信封，写入返回成功标志；需要错误细节时使用 `try_` 版本
//!
//! ## 句柄参数
//! 接受句柄ID或PLC名称。按名称查找时使用该PLC最近一次打开的句柄。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::impls::{CommunicationEngine, ConnectionManager, NodeAddressResolver};
use crate::domain::services::{BaseService, TransportFactory};
use crate::infrastructure::DefaultTransportFactory;
use crate::logging::{init_logging, LoggerConfig};
use crate::models::{
    ConnectionHandle, ConnectionState, DataTypeRegistry, PlcDataType, ResultEnvelope, SuccessFlag,
    WriteValue,
};
use crate::utils::config::{validate_config, AppConfig, EndpointConfig};
use crate::utils::error::{AppError, AppResult};

/// PLC客户端
pub struct PlcClient {
    config: AppConfig,
    connections: Arc<ConnectionManager>,
    engine: CommunicationEngine,
    resolver: RwLock<NodeAddressResolver>,
    /// PLC名称 -> 句柄ID
    plc_handles: RwLock<HashMap<String, String>>,
    /// 最近一次打开的句柄
    default_handle: RwLock<Option<String>>,
}

impl PlcClient {
    /// 使用默认传输工厂创建客户端
    pub fn new(config: AppConfig) -> AppResult<Self> {
        Self::with_factory(config, Arc::new(DefaultTransportFactory::new()))
    }

    /// 使用指定的传输工厂创建客户端
    pub fn with_factory(config: AppConfig, factory: Arc<dyn TransportFactory>) -> AppResult<Self> {
        validate_config(&config)?;

        let registry = DataTypeRegistry::new(&config.data_types)?;
        let string_capacity = registry.string_capacity();
        let resolver = NodeAddressResolver::with_endpoints(registry, &config.endpoints);
        let connections = Arc::new(ConnectionManager::new(factory, config.client.clone()));
        let engine = CommunicationEngine::new(connections.clone(), string_capacity);

        Ok(Self {
            config,
            connections,
            engine,
            resolver: RwLock::new(resolver),
            plc_handles: RwLock::new(HashMap::new()),
            default_handle: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 按配置中的端点名称打开连接
    pub async fn open_endpoint(&self, name: &str) -> AppResult<ConnectionHandle> {
        let endpoint = self
            .config
            .endpoint(name)
            .cloned()
            .ok_or_else(|| AppError::connection_error(name, "配置中不存在该PLC端点"))?;
        self.open(endpoint).await
    }

    /// 打开连接
    ///
    /// 同名PLC已有打开的句柄时直接返回该句柄。
    pub async fn open(&self, endpoint: EndpointConfig) -> AppResult<ConnectionHandle> {
        let existing = self.plc_handles.read().await.get(&endpoint.name).cloned();
        if let Some(handle_id) = existing {
            if self.connections.state(&handle_id).await == ConnectionState::Open {
                let handle = self.connections.handle(&handle_id).await?;
                *self.default_handle.write().await = Some(handle_id);
                log::debug!("PLC {} 已打开，复用句柄 {}", handle.plc, handle.handle_id);
                return Ok(handle);
            }
        }

        let handle = self.connections.open(endpoint.clone()).await?;

        self.resolver.write().await.register_endpoint(&endpoint);
        self.plc_handles
            .write()
            .await
            .insert(endpoint.name.clone(), handle.handle_id.clone());
        *self.default_handle.write().await = Some(handle.handle_id.clone());
        Ok(handle)
    }

    /// 最近一次打开的句柄ID
    pub async fn default_handle(&self) -> Option<String> {
        self.default_handle.read().await.clone()
    }

    /// 把句柄ID或PLC名称解析为句柄ID
    pub async fn resolve_handle_id(&self, handle: &str) -> String {
        match self.plc_handles.read().await.get(handle) {
            Some(handle_id) => handle_id.clone(),
            None => handle.to_string(),
        }
    }

    /// 探测连接
    pub async fn test(&self, handle: &str) -> AppResult<SuccessFlag> {
        let handle_id = self.resolve_handle_id(handle).await;
        let alive = self.connections.test(&handle_id).await?;
        Ok(SuccessFlag::new(alive))
    }

    /// 关闭连接，重复关闭直接成功
    ///
    /// 关闭后名称映射保留，按名称查询状态得到 Closed。
    pub async fn close(&self, handle: &str) -> AppResult<()> {
        let handle_id = self.resolve_handle_id(handle).await;
        self.connections.close(&handle_id).await
    }

    /// 重连
    pub async fn reconnect(&self, handle: &str) -> AppResult<()> {
        let handle_id = self.resolve_handle_id(handle).await;
        self.connections.reconnect(&handle_id).await
    }

    /// 连接状态，未知句柄为 Unopened
    pub async fn connection_state(&self, handle: &str) -> ConnectionState {
        let handle_id = self.resolve_handle_id(handle).await;
        self.connections.state(&handle_id).await
    }

    /// 所有打开的句柄
    pub async fn open_handles(&self) -> Vec<ConnectionHandle> {
        self.connections.open_handles().await
    }

    /// PLC名称对应的句柄ID
    async fn handle_for_plc(&self, plc: &str) -> AppResult<String> {
        self.plc_handles.read().await.get(plc).cloned().ok_or_else(|| {
            AppError::invalid_state_error(
                plc,
                ConnectionState::Unopened.to_string(),
                "该PLC没有打开的连接",
            )
        })
    }

    /// 按类型名称解析数据类型
    pub async fn parse_data_type(&self, type_name: &str) -> AppResult<PlcDataType> {
        self.resolver.read().await.registry().parse(type_name)
    }

    /// 读取节点值
    ///
    /// 任何失败都返回 `IsSuccess = false` 且内容为空列表的信封。
    pub async fn read_node_values(
        &self,
        plc: &str,
        address: &str,
        data_type: PlcDataType,
        length: usize,
    ) -> ResultEnvelope {
        let node = match self.resolver.read().await.resolve(plc, address, data_type, length) {
            Ok(node) => node,
            Err(e) => {
                log_communication_failure!("解析 {} 地址 {} 失败: {}", plc, address, e);
                return ResultEnvelope::failure_list_from_error(&e);
            }
        };
        let handle_id = match self.handle_for_plc(plc).await {
            Ok(handle_id) => handle_id,
            Err(e) => return ResultEnvelope::failure_list_from_error(&e),
        };
        self.engine.read_node_values(&handle_id, &node).await
    }

    /// 按类型名称读取节点值
    pub async fn read_node_values_named(
        &self,
        plc: &str,
        address: &str,
        type_name: &str,
        length: usize,
    ) -> ResultEnvelope {
        match self.parse_data_type(type_name).await {
            Ok(data_type) => self.read_node_values(plc, address, data_type, length).await,
            Err(e) => ResultEnvelope::failure_list_from_error(&e),
        }
    }

    /// 写入节点值，返回成功标志
    pub async fn write_node_values(
        &self,
        plc: &str,
        address: &str,
        data_type: PlcDataType,
        value: impl Into<WriteValue>,
    ) -> SuccessFlag {
        match self.try_write_node_values(plc, address, data_type, value).await {
            Ok(()) => SuccessFlag::new(true),
            Err(e) => {
                log_communication_failure!("写入 {} 地址 {} 失败: {}", plc, address, e);
                SuccessFlag::new(false)
            }
        }
    }

    /// 写入节点值，失败时返回具体错误
    pub async fn try_write_node_values(
        &self,
        plc: &str,
        address: &str,
        data_type: PlcDataType,
        value: impl Into<WriteValue>,
    ) -> AppResult<()> {
        let value = value.into();
        let node = self
            .resolver
            .read()
            .await
            .resolve_for_write(plc, address, data_type, &value)?;
        let handle_id = self.handle_for_plc(plc).await?;
        self.engine.write_node_values(&handle_id, &node, value).await
    }

    /// 关闭所有连接
    pub async fn dispose(&self) -> AppResult<()> {
        self.connections.shutdown().await?;
        self.plc_handles.write().await.clear();
        *self.default_handle.write().await = None;
        Ok(())
    }
}

#[async_trait]
impl BaseService for PlcClient {
    fn service_name(&self) -> &'static str {
        "PlcClient"
    }

    async fn initialize(&mut self) -> AppResult<()> {
        validate_config(&self.config)?;
        init_logging(&LoggerConfig::from(&self.config.logging))?;
        log::info!(
            "PLC客户端初始化完成，已配置 {} 个端点",
            self.config.endpoints.len()
        );
        Ok(())
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        self.dispose().await
    }

    async fn health_check(&self) -> AppResult<()> {
        for handle in self.open_handles().await {
            if !self.connections.test(&handle.handle_id).await? {
                return Err(AppError::connection_error(handle.plc, "健康检查探测失败"));
            }
        }
        Ok(())
    }
}
