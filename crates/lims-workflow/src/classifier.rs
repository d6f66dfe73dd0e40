//! 队列分类器
//!
//! 根据订单的可变状态字段判定其当前所属队列。谓词彼此独立而非
//! 单一switch的分支：队列归属必须随时可以仅从存储字段重新推导
//! （没有"当前队列"旁表），因为 date_stopped、accession_number
//! 与转诊标志由互不协调的三个外部环节（标本采集、结果录入、
//! 转诊派送）分别更新。所有谓词都是全函数，对部分填充的记录
//! 从不报错。

use lims_core::{FulfillerStatus, Order, OrderAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 队列类别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueKind {
    Pending,       // 待采集
    Active,        // 工作列表（检测中）
    ReferredOut,   // 已转诊外部实验室
    PendingReview, // 待审核
    Completed,     // 已完成
    History,       // 历史（按调用方给定的目标状态）
}

/// 工作列表：检测中、标本已登记、未录入结果、未转诊
pub fn is_active_worklist(order: &Order) -> bool {
    order.fulfiller_status == Some(FulfillerStatus::InProgress)
        && order.accession_number.is_some()
        && order.date_stopped.is_none()
        && !order.is_referred()
}

/// 转诊队列：检测中、标本已登记、已转诊
pub fn is_referred_out(order: &Order) -> bool {
    order.fulfiller_status == Some(FulfillerStatus::InProgress)
        && order.accession_number.is_some()
        && order.is_referred()
}

/// 审核队列：检测中、已录入结果、未转诊
pub fn is_pending_review(order: &Order) -> bool {
    order.fulfiller_status == Some(FulfillerStatus::InProgress)
        && order.date_stopped.is_some()
        && !order.is_referred()
}

/// 待采集队列：标本未登记或状态尚未进入检测，且未录入结果
pub fn is_pending(order: &Order) -> bool {
    order.date_stopped.is_none()
        && (order.accession_number.is_none()
            || matches!(order.fulfiller_status, None | Some(FulfillerStatus::New)))
}

/// 历史/完成列表：状态等于调用方给定的目标状态，或动作为 NEW/REVISE
///
/// 后半个条件让"检测中但已被修订"的订单与严格完成的订单一同出现。
pub fn matches_history(order: &Order, target: FulfillerStatus) -> bool {
    order.fulfiller_status == Some(target)
        || matches!(order.action, OrderAction::New | OrderAction::Revise)
}

/// 订单是否在参考日期当天或之后激活
///
/// 参考日期（操作员选定的工作日）只限定快照范围，不参与队列判定。
pub fn activated_on_or_after(order: &Order, reference_date: chrono::NaiveDate) -> bool {
    order.date_activated.date_naive() >= reference_date
}

/// 计算订单当前所属的全部队列
///
/// 各谓词独立求值，求值顺序无关。Active 与 ReferredOut 由转诊
/// 标志保证互斥。
pub fn classify(order: &Order, history_target: FulfillerStatus) -> BTreeSet<QueueKind> {
    let mut queues = BTreeSet::new();
    if is_pending(order) {
        queues.insert(QueueKind::Pending);
    }
    if is_active_worklist(order) {
        queues.insert(QueueKind::Active);
    }
    if is_referred_out(order) {
        queues.insert(QueueKind::ReferredOut);
    }
    if is_pending_review(order) {
        queues.insert(QueueKind::PendingReview);
    }
    if order.fulfiller_status == Some(FulfillerStatus::Completed) {
        queues.insert(QueueKind::Completed);
    }
    if matches_history(order, history_target) {
        queues.insert(QueueKind::History);
    }
    queues
}
