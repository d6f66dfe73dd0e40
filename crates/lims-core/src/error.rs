//! 错误定义模块

use thiserror::Error;
use uuid::Uuid;

/// LIMS系统统一错误类型
#[derive(Error, Debug)]
pub enum LimsError {
    #[error("空选择: 批量操作未提供任何订单")]
    EmptySelection,

    #[error("订单 {order_id} 正在同步中")]
    SyncInProgress { order_id: Uuid },

    #[error("传输错误: {0}")]
    Transport(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// LIMS系统统一结果类型
pub type Result<T> = std::result::Result<T, LimsError>;
