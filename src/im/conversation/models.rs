//! 会话摘要模型
//!
//! 摘要是派生数据：由最近会话引擎加未读数查询拼出来，
//! 不单独落库，调用方也不允许直接改。

use crate::im::message::models::LocalMessage;
use serde::{Deserialize, Serialize};

/// 会话摘要：每个会话身份一条，携带最新消息与未读数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// 单聊对端用户 ID（与 groupKey 二选一）
    #[serde(rename = "peerUserID")]
    pub peer_user_id: Option<String>,
    /// 群聊频道 key（与 peerUserID 二选一）
    #[serde(rename = "groupKey")]
    pub group_key: Option<i64>,
    /// 该会话目前时间戳最大的消息
    #[serde(rename = "latestMessage")]
    pub latest_message: LocalMessage,
    /// 未读消息数
    #[serde(rename = "unreadCount")]
    pub unread_count: i64,
}
