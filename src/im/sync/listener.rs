//! 同步过程监听器回调接口

use crate::im::sync::orchestrator::SyncEntityType;
use async_trait::async_trait;

/// 同步过程监听器（聚合层回调，细粒度变更走各实体自己的监听器）
#[async_trait]
pub trait SyncListener: Send + Sync {
    /// 某实体类型的同步任务开始
    async fn on_sync_start(&self, entity: SyncEntityType);

    /// 同步任务成功结束，affected 为受影响的记录数
    async fn on_sync_finish(&self, entity: SyncEntityType, affected: usize);

    /// 同步任务失败（游标未推进，稍后重试是安全的）
    async fn on_sync_failed(&self, entity: SyncEntityType, error: String);
}

/// 空实现（默认监听器）
pub struct EmptySyncListener;

#[async_trait]
impl SyncListener for EmptySyncListener {
    async fn on_sync_start(&self, _entity: SyncEntityType) {}
    async fn on_sync_finish(&self, _entity: SyncEntityType, _affected: usize) {}
    async fn on_sync_failed(&self, _entity: SyncEntityType, _error: String) {}
}
