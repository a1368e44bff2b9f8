//! 应用层：对外的PLC客户端门面

pub mod blocking_client;
pub mod dispatch;
pub mod plc_client;


pub use blocking_client::BlockingPlcClient;
pub use dispatch::Operation;
pub use plc_client::PlcClient;
