//! 频道监听器回调接口

use async_trait::async_trait;

/// 频道监听器回调接口
///
/// 回调必须幂等：同一变更重复通知不应破坏 UI 可见状态。
#[async_trait]
pub trait ChannelListener: Send + Sync {
    /// 频道新增或变更，参数为受影响频道 key 的 JSON 数组字符串
    async fn on_channels_updated(&self, channel_keys_json: String);

    /// 变更批次过大，应整体刷新频道列表
    async fn on_channels_refresh_needed(&self);

    /// 频道被删除（skip-soft-deleted 策略下的物理删除）
    async fn on_channel_deleted(&self, channel_key: i64);
}

/// 空实现（默认监听器）
pub struct EmptyChannelListener;

#[async_trait]
impl ChannelListener for EmptyChannelListener {
    async fn on_channels_updated(&self, _channel_keys_json: String) {}
    async fn on_channels_refresh_needed(&self) {}
    async fn on_channel_deleted(&self, _channel_key: i64) {}
}
