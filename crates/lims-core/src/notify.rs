//! 变更通知

use async_trait::async_trait;

/// 变更通知接口
///
/// 同步协调器与结果审核在成功变更后发出失效通知，
/// 外部缓存/视图据此重新拉取数据。本引擎自身不做缓存。
#[async_trait]
pub trait MutationNotifier: Send + Sync {
    /// 通知指定资源已失效（即发即弃，失败只记录日志）
    async fn invalidate(&self, resource_key: &str);
}

/// 空实现，用于测试和不需要通知的场景
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl MutationNotifier for NoopNotifier {
    async fn invalidate(&self, resource_key: &str) {
        tracing::debug!("Invalidation for {} dropped (noop notifier)", resource_key);
    }
}
