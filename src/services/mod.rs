/// 服务层
///
/// 组合领域层与基础设施层，对外提供PLC客户端。

pub mod application;

pub use crate::domain::services::BaseService;
pub use application::*;
