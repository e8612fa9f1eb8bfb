//! 会话监听器回调接口

use async_trait::async_trait;

/// 会话监听器回调接口
///
/// 回调必须幂等：同一变更重复通知不应破坏 UI 可见状态。
#[async_trait]
pub trait ConversationListener: Send + Sync {
    /// 出现新会话，参数为会话摘要 JSON
    async fn on_new_conversation(&self, conversation_json: String);

    /// 会话最新消息变更，参数为会话摘要 JSON
    async fn on_conversation_changed(&self, conversation_json: String);

    /// 会话被删除，参数为会话身份的字符串表示（如 "group:10" / "peer:bob"）
    async fn on_conversation_removed(&self, conversation_key: String);

    /// 总未读消息数变更
    async fn on_total_unread_message_count_changed(&self, total_unread_count: i64);

    /// 会话对端输入状态变更（透传自传输层，不落库）
    async fn on_typing_status_changed(&self, typing_json: String);
}

/// 空实现（默认监听器）
pub struct EmptyConversationListener;

#[async_trait]
impl ConversationListener for EmptyConversationListener {
    async fn on_new_conversation(&self, _conversation_json: String) {}
    async fn on_conversation_changed(&self, _conversation_json: String) {}
    async fn on_conversation_removed(&self, _conversation_key: String) {}
    async fn on_total_unread_message_count_changed(&self, _total_unread_count: i64) {}
    async fn on_typing_status_changed(&self, _typing_json: String) {}
}
