/// 领域服务接口定义模块
///
/// 业务说明：
/// 定义领域层依赖的抽象能力，具体协议实现位于基础设施层
/// 通过 [`TransportFactory`] 在运行时绑定真实传输或模拟传输
///
/// Rust知识点：
/// - trait定义抽象接口
/// - async_trait支持异步trait方法

/// PLC传输接口
///
/// 业务说明：面向字节/位的最底层读写能力，每种协议一个实现
pub mod plc_transport;

pub use plc_transport::*;

use async_trait::async_trait;

use crate::utils::error::AppResult;

/// 基础服务trait，所有服务都应实现
///
/// 业务说明：
/// 统一服务的生命周期管理（初始化、关闭、健康检查）
#[async_trait]
pub trait BaseService: Send + Sync {
    /// 服务名称
    ///
    /// 业务说明：用于日志记录和调试
    fn service_name(&self) -> &'static str;

    /// 初始化服务
    ///
    /// 业务说明：
    /// 在服务启动时调用，执行必要的初始化操作
    /// 如：校验配置、初始化日志等
    async fn initialize(&mut self) -> AppResult<()>;

    /// 关闭服务
    ///
    /// 业务说明：
    /// 在服务停止时调用，关闭所有连接并释放资源
    async fn shutdown(&mut self) -> AppResult<()>;

    /// 健康检查
    ///
    /// 业务说明：检查服务当前是否正常运行
    async fn health_check(&self) -> AppResult<()>;
}
