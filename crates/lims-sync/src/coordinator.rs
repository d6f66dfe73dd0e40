//! 同步协调器
//!
//! 将已转诊订单与外部参考实验室系统对账：批量提交同步请求、
//! 批量拉取结果、逐单跟踪同步状态。所有操作在单个订单粒度上
//! 幂等；批内单项失败是正常结果，不回滚其余订单，也不存在
//! 跨订单事务。

use crate::transport::{BatchResponse, ReferenceLabTransport};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use lims_core::{
    FulfillerStatus, LimsError, MutationNotifier, Order, Result, SyncRecord, SyncState,
};
use lims_workflow::classifier::is_referred_out;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// 订单源（外部协作方）
///
/// 返回集可能比请求的状态范围更大，调用方需再按动作/谓词过滤。
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch_orders(
        &self,
        reference_date: NaiveDate,
        status_filter: Option<FulfillerStatus>,
    ) -> Result<Vec<Order>>;
}

/// 单个订单的失败信息
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub order_id: Uuid,
    pub message: String,
}

/// 一次批量操作的结果
///
/// 失败始终按订单逐条报告，调用方可以展示N个订单中哪些失败
/// 及原因，永远不是单一的不透明错误。
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub succeeded_ids: Vec<Uuid>,
    pub failed: Vec<SyncFailure>,
}

/// 批量操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    Sync,
    FetchResults,
}

/// 同步协调器
pub struct SyncCoordinator {
    records: RwLock<HashMap<Uuid, SyncRecord>>,
    in_flight: Mutex<HashSet<Uuid>>,
    transport: Arc<dyn ReferenceLabTransport>,
    orders: Arc<dyn OrderSource>,
    notifier: Arc<dyn MutationNotifier>,
    request_timeout: Duration,
}

/// 单飞守卫：持有一批在途订单id，释放时从在途集合移除
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<Uuid>>,
    ids: Vec<Uuid>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // 锁中毒时也必须释放在途id，否则这批订单永远无法重试
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for id in &self.ids {
            in_flight.remove(id);
        }
    }
}

impl SyncCoordinator {
    pub fn new(
        transport: Arc<dyn ReferenceLabTransport>,
        orders: Arc<dyn OrderSource>,
        notifier: Arc<dyn MutationNotifier>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            transport,
            orders,
            notifier,
            request_timeout,
        }
    }

    /// 同步选中的订单
    ///
    /// 显式空集合立即以 `EmptySelection` 拒绝，不发起任何网络调用。
    pub async fn sync_selected(&self, order_ids: &[Uuid]) -> Result<SyncOutcome> {
        if order_ids.is_empty() {
            return Err(LimsError::EmptySelection);
        }
        self.run_batch(order_ids, BatchKind::Sync).await
    }

    /// 同步调用时刻所有已转诊的订单
    ///
    /// 转诊集合在调用开始时一次性确定，调用过程中新进入队列的
    /// 订单不会被包含。空的转诊队列是平凡成功，不是 `EmptySelection`。
    pub async fn sync_all(&self, reference_date: NaiveDate) -> Result<SyncOutcome> {
        let ids = self.referred_order_ids(reference_date).await?;
        if ids.is_empty() {
            info!("No referred orders to sync on {}", reference_date);
            return Ok(SyncOutcome::default());
        }
        self.run_batch(&ids, BatchKind::Sync).await
    }

    /// 拉取选中订单的检验结果
    pub async fn fetch_results_selected(&self, order_ids: &[Uuid]) -> Result<SyncOutcome> {
        if order_ids.is_empty() {
            return Err(LimsError::EmptySelection);
        }
        self.run_batch(order_ids, BatchKind::FetchResults).await
    }

    /// 拉取所有已转诊订单的检验结果
    pub async fn fetch_results_all(&self, reference_date: NaiveDate) -> Result<SyncOutcome> {
        let ids = self.referred_order_ids(reference_date).await?;
        if ids.is_empty() {
            info!("No referred orders to fetch results for on {}", reference_date);
            return Ok(SyncOutcome::default());
        }
        self.run_batch(&ids, BatchKind::FetchResults).await
    }

    /// 查询某订单的同步记录
    pub async fn record(&self, order_id: Uuid) -> Option<SyncRecord> {
        self.records.read().await.get(&order_id).cloned()
    }

    async fn referred_order_ids(&self, reference_date: NaiveDate) -> Result<Vec<Uuid>> {
        let orders = self
            .orders
            .fetch_orders(reference_date, Some(FulfillerStatus::InProgress))
            .await?;
        Ok(orders
            .iter()
            .filter(|order| is_referred_out(order))
            .map(|order| order.id)
            .collect())
    }

    /// 获取一批订单的单飞守卫
    ///
    /// 要么全部获取要么一个都不获取：任一id已在途即以
    /// `SyncInProgress` 拒绝，不会与在途调用交错竞争远端id分配。
    fn acquire_guards(&self, ids: &[Uuid]) -> Result<FlightGuard<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(id) = ids.iter().find(|id| in_flight.contains(id)) {
            return Err(LimsError::SyncInProgress { order_id: *id });
        }
        for id in ids {
            in_flight.insert(*id);
        }
        Ok(FlightGuard {
            in_flight: &self.in_flight,
            ids: ids.to_vec(),
        })
    }

    /// 执行单条同步记录的状态转换
    ///
    /// 记录首次出现时惰性创建；非法转换视为协调器缺陷，报内部错误
    /// 而不是悄悄应用。
    async fn transition(
        &self,
        order_id: Uuid,
        to: SyncState,
        error: Option<String>,
        remote_reference_id: Option<String>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(order_id)
            .or_insert_with(|| SyncRecord::new(order_id));

        if !record.sync_state.can_transition(to) {
            return Err(LimsError::Internal(format!(
                "illegal sync transition {:?} -> {:?} for order {}",
                record.sync_state, to, order_id
            )));
        }

        record.sync_state = to;
        match to {
            SyncState::Syncing => {
                record.last_attempt_at = Some(Utc::now());
                record.last_error = None;
            }
            SyncState::Synced => {
                record.last_error = None;
                if remote_reference_id.is_some() {
                    record.remote_reference_id = remote_reference_id;
                }
            }
            SyncState::Failed => {
                record.last_error = error;
            }
            SyncState::NotSynced => {}
        }
        Ok(())
    }

    async fn run_batch(&self, order_ids: &[Uuid], kind: BatchKind) -> Result<SyncOutcome> {
        // 去重但保持调用方给定的顺序
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = order_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let _guard = self.acquire_guards(&ids)?;

        for id in &ids {
            self.transition(*id, SyncState::Syncing, None, None).await?;
        }

        info!("Submitting {:?} batch of {} orders", kind, ids.len());

        let call = async {
            match kind {
                BatchKind::Sync => self.transport.post_sync_batch(&ids).await,
                BatchKind::FetchResults => self.transport.post_result_fetch_batch(&ids).await,
            }
        };

        let outcome = match tokio::time::timeout(self.request_timeout, call).await {
            // 调用方超时：在途记录降级为FAILED，绝不悬挂在SYNCING
            Err(_) => {
                let message = "cancelled: request timed out".to_string();
                self.fail_all(&ids, &message).await?;
                Self::all_failed(&ids, &message)
            }
            // 传输层失败：批内每个订单都标记FAILED并携带可聚合的消息
            Ok(Err(e)) => {
                let message = e.to_string();
                self.fail_all(&ids, &message).await?;
                Self::all_failed(&ids, &message)
            }
            Ok(Ok(batch)) if batch.http_status == 200 => self.apply_batch(&ids, batch).await?,
            Ok(Ok(batch)) => {
                let message = format!("reference lab returned HTTP {}", batch.http_status);
                self.fail_all(&ids, &message).await?;
                Self::all_failed(&ids, &message)
            }
        };

        info!(
            "{:?} batch finished: {} succeeded, {} failed",
            kind,
            outcome.succeeded_ids.len(),
            outcome.failed.len()
        );

        if !outcome.succeeded_ids.is_empty() {
            // 成功变更后通知外部缓存失效；本引擎不缓存结果
            self.notifier.invalidate("lab-orders").await;
        }

        Ok(outcome)
    }

    /// 应用HTTP 200响应的逐项结果
    ///
    /// 响应列表中报告失败的订单降级为FAILED且不影响兄弟项；
    /// 未出现在列表中的订单按成功处理。
    async fn apply_batch(&self, ids: &[Uuid], batch: BatchResponse) -> Result<SyncOutcome> {
        let items: HashMap<Uuid, _> = batch
            .response_list
            .into_iter()
            .map(|item| (item.order_id, item))
            .collect();

        let mut outcome = SyncOutcome::default();
        for id in ids {
            match items.get(id) {
                Some(item) if !item.success => {
                    let message = item
                        .response_message
                        .clone()
                        .unwrap_or_else(|| "rejected by reference lab".to_string());
                    warn!("Order {} failed in batch: {}", id, message);
                    self.transition(*id, SyncState::Failed, Some(message.clone()), None)
                        .await?;
                    outcome.failed.push(SyncFailure {
                        order_id: *id,
                        message,
                    });
                }
                item => {
                    let remote_reference_id =
                        item.and_then(|i| i.remote_reference_id.clone());
                    self.transition(*id, SyncState::Synced, None, remote_reference_id)
                        .await?;
                    outcome.succeeded_ids.push(*id);
                }
            }
        }
        Ok(outcome)
    }

    async fn fail_all(&self, ids: &[Uuid], message: &str) -> Result<()> {
        for id in ids {
            self.transition(*id, SyncState::Failed, Some(message.to_string()), None)
                .await?;
        }
        Ok(())
    }

    fn all_failed(ids: &[Uuid], message: &str) -> SyncOutcome {
        SyncOutcome {
            succeeded_ids: Vec::new(),
            failed: ids
                .iter()
                .map(|id| SyncFailure {
                    order_id: *id,
                    message: message.to_string(),
                })
                .collect(),
        }
    }
}
