//! 队列视图
//!
//! 在调用方提供的订单快照上做过滤、检索与稳定分页。视图自身
//! 不持有任何可变订单数据，避免切换队列时出现陈旧状态。

use crate::classifier::{self, QueueKind};
use chrono::NaiveDate;
use lims_core::{FulfillerStatus, Order};
use serde::{Deserialize, Serialize};

/// 订单快照
///
/// 按参考日期拉取的不可变有序订单序列，生命周期为一次
/// 分类/渲染过程，由调用方持有。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub reference_date: NaiveDate,
    pub orders: Vec<Order>,
}

impl QueueSnapshot {
    pub fn new(reference_date: NaiveDate, orders: Vec<Order>) -> Self {
        Self {
            reference_date,
            orders,
        }
    }
}

/// 渲染后的表格行（检索按渲染值匹配）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRow {
    pub id: uuid::Uuid,
    pub date: String,
    pub order_number: String,
    pub patient: String,
    pub accession_number: String,
    pub test: String,
    pub status: String,
    pub orderer: String,
    pub urgency: String,
    pub action: String,
}

impl OrderRow {
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id,
            date: order.date_activated.format("%d-%b-%Y").to_string(),
            order_number: order.order_number.clone(),
            patient: order.patient.display.clone(),
            accession_number: order.accession_number.clone().unwrap_or_default(),
            test: order.concept.display.clone(),
            status: order
                .fulfiller_status
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            orderer: order.orderer.display.clone(),
            urgency: order.urgency.as_str().to_string(),
            action: order.action.as_str().to_string(),
        }
    }

    /// 行内所有渲染值是否包含检索词（不区分大小写）
    fn matches(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        [
            &self.date,
            &self.order_number,
            &self.patient,
            &self.accession_number,
            &self.test,
            &self.status,
            &self.orderer,
            &self.urgency,
            &self.action,
        ]
        .iter()
        .any(|cell| cell.to_lowercase().contains(&token))
    }
}

/// 一页查询结果
#[derive(Debug, Clone, Serialize)]
pub struct QueuePage {
    pub rows: Vec<OrderRow>,
    /// 过滤后的总条数（分页前），供调用方计算页数
    pub total_count: usize,
}

/// 各队列汇总计数（首页概览卡片）
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub active: usize,
    pub referred_out: usize,
    pub pending_review: usize,
    pub completed: usize,
}

/// 队列视图
///
/// 完全无状态：每次调用都基于传入的快照重新计算，可安全地被
/// 多个调用方并发使用。修改页大小后焦点不保留，调用方应重新
/// 请求第一页。
pub struct QueueView;

impl QueueView {
    /// 计算一页队列内容
    ///
    /// 1. 按队列谓词（叠加参考日期范围）过滤快照；
    /// 2. 如有检索词，按渲染后的行值不区分大小写匹配；
    /// 3. 稳定分页：不重排序，切片为
    ///    `filtered[page_index*page_size .. (page_index+1)*page_size]`。
    pub fn page<P>(
        snapshot: &QueueSnapshot,
        predicate: P,
        search: Option<&str>,
        page_index: usize,
        page_size: usize,
    ) -> QueuePage
    where
        P: Fn(&Order) -> bool,
    {
        let mut rows: Vec<OrderRow> = snapshot
            .orders
            .iter()
            .filter(|order| {
                classifier::activated_on_or_after(order, snapshot.reference_date)
                    && predicate(order)
            })
            .map(OrderRow::from_order)
            .collect();

        if let Some(token) = search {
            let token = token.trim();
            if !token.is_empty() {
                rows.retain(|row| row.matches(token));
            }
        }

        let total_count = rows.len();

        let start = page_index.saturating_mul(page_size).min(total_count);
        let end = start.saturating_add(page_size).min(total_count);
        rows = rows[start..end].to_vec();

        tracing::debug!(
            "Queue page computed: {} of {} rows (page {}, size {})",
            rows.len(),
            total_count,
            page_index,
            page_size
        );

        QueuePage { rows, total_count }
    }

    /// 计算快照在各队列中的条数
    pub fn counts(snapshot: &QueueSnapshot, history_target: FulfillerStatus) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for order in snapshot
            .orders
            .iter()
            .filter(|o| classifier::activated_on_or_after(o, snapshot.reference_date))
        {
            for kind in classifier::classify(order, history_target) {
                match kind {
                    QueueKind::Pending => counts.pending += 1,
                    QueueKind::Active => counts.active += 1,
                    QueueKind::ReferredOut => counts.referred_out += 1,
                    QueueKind::PendingReview => counts.pending_review += 1,
                    QueueKind::Completed => counts.completed += 1,
                    QueueKind::History => {}
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::is_active_worklist;
    use chrono::{TimeZone, Utc};
    use lims_core::{ConceptRef, EntityRef, OrderAction, Urgency};
    use uuid::Uuid;

    fn order(number: &str, patient: &str) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: number.to_string(),
            accession_number: Some(format!("ACC-{}", number)),
            date_activated: Utc.with_ymd_and_hms(2024, 3, 5, 8, 30, 0).unwrap(),
            date_stopped: None,
            fulfiller_status: Some(FulfillerStatus::InProgress),
            action: OrderAction::New,
            instructions: None,
            referral_requested: false,
            urgency: Urgency::Routine,
            concept: ConceptRef {
                uuid: Uuid::new_v4(),
                display: "CD4 Count".to_string(),
            },
            orderer: EntityRef {
                uuid: Uuid::new_v4(),
                display: "Dr. Mugisha".to_string(),
            },
            patient: EntityRef {
                uuid: Uuid::new_v4(),
                display: patient.to_string(),
            },
            encounter: EntityRef {
                uuid: Uuid::new_v4(),
                display: "Lab Encounter".to_string(),
            },
        }
    }

    fn snapshot(orders: Vec<Order>) -> QueueSnapshot {
        QueueSnapshot::new(chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), orders)
    }

    #[test]
    fn test_pagination_reproduces_filtered_sequence() {
        let orders: Vec<Order> = (0..23)
            .map(|i| order(&format!("ORD-{:03}", i), "Jane Doe"))
            .collect();
        let snapshot = snapshot(orders);

        let full = QueueView::page(&snapshot, is_active_worklist, None, 0, usize::MAX);
        assert_eq!(full.total_count, 23);

        let mut collected = Vec::new();
        let page_size = 10;
        for page_index in 0..3 {
            let page = QueueView::page(&snapshot, is_active_worklist, None, page_index, page_size);
            assert_eq!(page.total_count, 23);
            collected.extend(page.rows);
        }
        // 全部页拼接后与未分页序列完全一致，无重复无遗漏
        assert_eq!(collected, full.rows);
    }

    #[test]
    fn test_search_is_case_insensitive_over_rendered_values() {
        let snapshot = snapshot(vec![
            order("ORD-001", "Jane Doe"),
            order("ORD-002", "Amos Okello"),
        ]);

        let page = QueueView::page(&snapshot, is_active_worklist, Some("okello"), 0, 10);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0].patient, "Amos Okello");

        // 检索词匹配渲染后的状态列
        let page = QueueView::page(&snapshot, is_active_worklist, Some("in_progress"), 0, 10);
        assert_eq!(page.total_count, 2);
    }

    #[test]
    fn test_out_of_range_page_is_empty() {
        let snapshot = snapshot(vec![order("ORD-001", "Jane Doe")]);
        let page = QueueView::page(&snapshot, is_active_worklist, None, 5, 10);
        assert!(page.rows.is_empty());
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn test_reference_date_scopes_snapshot() {
        let mut stale = order("ORD-000", "Old Entry");
        stale.date_activated = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
        let snapshot = snapshot(vec![stale, order("ORD-001", "Jane Doe")]);

        let page = QueueView::page(&snapshot, is_active_worklist, None, 0, 10);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0].order_number, "ORD-001");
    }

    #[test]
    fn test_queue_counts() {
        let mut referred = order("ORD-002", "Jane Doe");
        referred.referral_requested = true;
        let mut reviewed = order("ORD-003", "Jane Doe");
        reviewed.date_stopped = Some(Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap());

        let snapshot = snapshot(vec![order("ORD-001", "Jane Doe"), referred, reviewed]);
        let counts = QueueView::counts(&snapshot, FulfillerStatus::Completed);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.referred_out, 1);
        assert_eq!(counts.pending_review, 1);
        assert_eq!(counts.completed, 0);
    }
}
