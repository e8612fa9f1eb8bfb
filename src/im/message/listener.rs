//! 消息监听器回调接口

use async_trait::async_trait;

/// 消息监听器回调接口
///
/// 回调必须是幂等可重入的：同一批变更重复通知不应破坏 UI 状态。
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// 合并批次产生了新消息/变更消息，参数为受影响消息 key 的 JSON 数组字符串
    async fn on_messages_updated(&self, message_keys_json: String);

    /// 变更批次过大，应整体刷新消息视图而不是逐键处理
    async fn on_messages_refresh_needed(&self);

    /// 消息元数据变更，参数为受影响消息 key 的 JSON 数组字符串
    async fn on_message_metadata_updated(&self, message_keys_json: String);

    /// 单条消息被删除（对所有人删除）
    async fn on_message_deleted(&self, message_key: String);
}

/// 空实现（默认监听器）
pub struct EmptyMessageListener;

#[async_trait]
impl MessageListener for EmptyMessageListener {
    async fn on_messages_updated(&self, _message_keys_json: String) {}
    async fn on_messages_refresh_needed(&self) {}
    async fn on_message_metadata_updated(&self, _message_keys_json: String) {}
    async fn on_message_deleted(&self, _message_key: String) {}
}
