//! # PLC连接管理器模块
//!
//! ## 业务作用
//! 管理连接句柄的完整生命周期：
//! - **打开**: 根据端点配置创建传输并在连接超时内完成连接
//! - **探测**: 轻量检查设备是否可达，探测失败不改变句柄状态
//! - **关闭**: 释放传输资源，可重复调用
//! - **重连**: 对已打开的句柄重建传输连接，失败后句柄进入 Closed
//!
//! ## 状态机
//! `Unopened -> Open -> Closed`，Closed 为终止状态；只有 Open 的句柄可以读写。
//!
//! ## 并发模型
//! - 句柄表使用 `RwLock`，查找与插入互不阻塞读写
//! - 每个句柄一把 `Mutex`，同一句柄上的操作串行执行，不同句柄可以并行

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::timeout;

use crate::domain::services::{PlcTransport, TransportFactory};
use crate::models::{ConnectionHandle, ConnectionState};
use crate::utils::config::{ClientSettings, EndpointConfig};
use crate::utils::error::{AppError, AppResult};

/// 句柄会话：句柄信息、状态与传输实例
pub struct Session {
    handle: ConnectionHandle,
    state: ConnectionState,
    transport: Box<dyn PlcTransport>,
}

impl Session {
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transport(&mut self) -> &mut dyn PlcTransport {
        self.transport.as_mut()
    }

    /// 刷新最后活动时间
    pub fn touch(&mut self) {
        self.handle.touch();
    }
}

/// 被管理的连接
pub struct ManagedConnection {
    endpoint: EndpointConfig,
    operation_timeout: Duration,
    connect_timeout: Duration,
    session: Mutex<Session>,
}

impl ManagedConnection {
    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// 单次读写/探测的超时
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state
    }

    /// 获取会话锁，句柄必须处于 Open 状态
    pub async fn lock_open(&self) -> AppResult<MutexGuard<'_, Session>> {
        let session = self.session.lock().await;
        if session.state != ConnectionState::Open {
            return Err(AppError::invalid_state_error(
                session.handle.handle_id.clone(),
                session.state.to_string(),
                "句柄未处于打开状态",
            ));
        }
        Ok(session)
    }
}

/// PLC连接管理器
pub struct ConnectionManager {
    factory: Arc<dyn TransportFactory>,
    settings: ClientSettings,
    connections: RwLock<HashMap<String, Arc<ManagedConnection>>>,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn TransportFactory>, settings: ClientSettings) -> Self {
        Self {
            factory,
            settings,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// 打开到端点的连接并返回新句柄
    pub async fn open(&self, endpoint: EndpointConfig) -> AppResult<ConnectionHandle> {
        endpoint
            .validate()
            .map_err(|e| AppError::connection_error(endpoint.name.clone(), e.to_string()))?;

        let mut transport = self.factory.create(&endpoint)?;
        let connect_timeout =
            Duration::from_millis(endpoint.effective_connect_timeout_ms(&self.settings));
        let operation_timeout = Duration::from_millis(endpoint.effective_timeout_ms(&self.settings));

        log::debug!(
            "正在连接PLC {} ({}, {})",
            endpoint.name,
            endpoint.protocol,
            endpoint.socket_address()
        );

        if let Err(e) = connect_within(transport.as_mut(), &endpoint, connect_timeout).await {
            let _ = timeout(operation_timeout, transport.close()).await;
            log_communication_failure!("连接PLC {} 失败: {}", endpoint.name, e);
            return Err(e);
        }

        let handle = ConnectionHandle::new(endpoint.name.clone(), endpoint.protocol);
        let connection = Arc::new(ManagedConnection {
            endpoint,
            operation_timeout,
            connect_timeout,
            session: Mutex::new(Session {
                handle: handle.clone(),
                state: ConnectionState::Open,
                transport,
            }),
        });

        self.connections
            .write()
            .await
            .insert(handle.handle_id.clone(), connection);

        log_user_operation!("已打开PLC连接 {} (句柄 {})", handle.plc, handle.handle_id);
        Ok(handle)
    }

    /// 查找句柄对应的连接
    pub async fn get(&self, handle_id: &str) -> AppResult<Arc<ManagedConnection>> {
        self.connections
            .read()
            .await
            .get(handle_id)
            .cloned()
            .ok_or_else(|| {
                AppError::invalid_state_error(
                    handle_id,
                    ConnectionState::Unopened.to_string(),
                    "未知的连接句柄",
                )
            })
    }

    /// 探测设备是否可达
    ///
    /// 协议错误返回 `Ok(false)`；超时返回 [`AppError::TimeoutError`]。
    pub async fn test(&self, handle_id: &str) -> AppResult<bool> {
        let connection = self.get(handle_id).await?;
        let mut session = connection.lock_open().await?;

        match timeout(connection.operation_timeout, session.transport().probe()).await {
            Ok(Ok(alive)) => {
                if alive {
                    session.touch();
                }
                Ok(alive)
            }
            Ok(Err(e)) => {
                log_communication_failure!("探测PLC {} 失败: {}", connection.endpoint.name, e);
                Ok(false)
            }
            Err(_) => Err(AppError::timeout_error(
                "Test",
                format!(
                    "探测PLC {} 超时 ({}ms)",
                    connection.endpoint.name,
                    connection.operation_timeout.as_millis()
                ),
            )),
        }
    }

    /// 关闭句柄，重复关闭直接成功
    pub async fn close(&self, handle_id: &str) -> AppResult<()> {
        let connection = self.get(handle_id).await?;
        let mut session = connection.session.lock().await;
        if session.state == ConnectionState::Closed {
            return Ok(());
        }

        session.state = ConnectionState::Closed;
        match timeout(connection.operation_timeout, session.transport().close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("关闭PLC {} 的传输时出错: {}", connection.endpoint.name, e),
            Err(_) => log::warn!("关闭PLC {} 的传输超时", connection.endpoint.name),
        }

        log_user_operation!("已关闭PLC连接 {} (句柄 {})", connection.endpoint.name, handle_id);
        Ok(())
    }

    /// 重建已打开句柄的传输连接
    ///
    /// 重连失败后句柄进入 Closed，调用方需要重新打开。
    pub async fn reconnect(&self, handle_id: &str) -> AppResult<()> {
        let connection = self.get(handle_id).await?;
        let mut session = connection.lock_open().await?;

        let _ = timeout(connection.operation_timeout, session.transport().close()).await;

        match connect_within(session.transport(), &connection.endpoint, connection.connect_timeout).await {
            Ok(()) => {
                session.touch();
                log_user_operation!("已重连PLC {} (句柄 {})", connection.endpoint.name, handle_id);
                Ok(())
            }
            Err(e) => {
                session.state = ConnectionState::Closed;
                let _ = timeout(connection.operation_timeout, session.transport().close()).await;
                log_communication_failure!("重连PLC {} 失败: {}", connection.endpoint.name, e);
                Err(e)
            }
        }
    }

    /// 句柄状态，未知句柄视为 Unopened
    pub async fn state(&self, handle_id: &str) -> ConnectionState {
        match self.get(handle_id).await {
            Ok(connection) => connection.state().await,
            Err(_) => ConnectionState::Unopened,
        }
    }

    /// 句柄信息快照
    pub async fn handle(&self, handle_id: &str) -> AppResult<ConnectionHandle> {
        let connection = self.get(handle_id).await?;
        let session = connection.session.lock().await;
        Ok(session.handle.clone())
    }

    /// 所有处于 Open 状态的句柄
    pub async fn open_handles(&self) -> Vec<ConnectionHandle> {
        let connections: Vec<Arc<ManagedConnection>> =
            self.connections.read().await.values().cloned().collect();

        let mut handles = Vec::new();
        for connection in connections {
            let session = connection.session.lock().await;
            if session.state == ConnectionState::Open {
                handles.push(session.handle.clone());
            }
        }
        handles
    }

    /// 关闭所有连接并清空句柄表
    pub async fn shutdown(&self) -> AppResult<()> {
        let handle_ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        for handle_id in &handle_ids {
            if let Err(e) = self.close(handle_id).await {
                log::warn!("关闭句柄 {} 失败: {}", handle_id, e);
            }
        }
        self.connections.write().await.clear();
        log::info!("连接管理器已关闭，共释放 {} 个句柄", handle_ids.len());
        Ok(())
    }
}

/// 在超时内完成连接，错误统一归类为连接错误或超时错误
async fn connect_within(
    transport: &mut dyn PlcTransport,
    endpoint: &EndpointConfig,
    limit: Duration,
) -> AppResult<()> {
    match timeout(limit, transport.connect()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e @ AppError::ConnectionError { .. })) | Ok(Err(e @ AppError::TimeoutError { .. })) => {
            Err(e)
        }
        Ok(Err(e)) => Err(AppError::connection_error(endpoint.name.clone(), e.to_string())),
        Err(_) => Err(AppError::timeout_error(
            "Open",
            format!(
                "连接PLC {} ({}) 超时 ({}ms)",
                endpoint.name,
                endpoint.socket_address(),
                limit.as_millis()
            ),
        )),
    }
}
