//! # LIMS工作流模块
//!
//! 提供实验室订单队列的工作流管理功能，包括：
//! - 队列分类器：根据订单状态字段确定性地判定队列归属
//! - 队列视图：对订单快照做过滤、检索与稳定分页
//! - 结果审核聚合：按检验概念分组观察结果，供审批使用

pub mod classifier;
pub mod queue_view;
pub mod review;

// 重新导出主要类型
pub use classifier::{
    activated_on_or_after, classify, is_active_worklist, is_pending, is_pending_review,
    is_referred_out, matches_history, QueueKind,
};
pub use queue_view::{OrderRow, QueueCounts, QueuePage, QueueSnapshot, QueueView};
pub use review::{group_results, ConceptSource, OrderApprover, ResultGroup, ResultRow, ReviewSession};
