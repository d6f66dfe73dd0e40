//! # LIMS同步模块
//!
//! 提供与外部参考实验室系统的对账功能，包括：
//! - 参考实验室传输接口与基于HTTP的默认客户端
//! - 同步协调器：批量同步/结果拉取、逐单状态跟踪、
//!   单飞守卫与部分失败聚合
//! - 订单源HTTP实现（转诊哨兵在摄入边界被规范化）

pub mod coordinator;
pub mod order_source;
pub mod transport;

pub use coordinator::{OrderSource, SyncCoordinator, SyncFailure, SyncOutcome};
pub use order_source::HttpOrderSource;
pub use transport::{
    AuthenticationConfig, BatchResponse, HttpReferenceLabClient, ItemResponse,
    ReferenceLabTransport, TransportConfig,
};
