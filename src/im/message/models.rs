//! 消息本地模型与合并规则

use crate::im::serialization::merge_metadata;
use crate::im::types::status;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 附件描述（只是元信息，上传下载不在本 SDK 范围内）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentInfo {
    #[serde(rename = "blobKey", default)]
    pub blob_key: String,
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    #[serde(rename = "contentType", default)]
    pub content_type: String,
    #[serde(rename = "size", default)]
    pub size: i64,
    #[serde(rename = "url", default)]
    pub url: String,
    #[serde(rename = "thumbnailUrl", default)]
    pub thumbnail_url: String,
}

/// 本地消息结构体
///
/// 会话身份：peer_user_id（单聊）与 group_key（群聊）二选一，系统消息
/// 可以两者皆空。服务端确认后消息本体不可变，只有 status 与 metadata
/// 还会被远端 feed 推进。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalMessage {
    /// 本地自增 ID（未落库时为 0）
    #[serde(rename = "id", default)]
    pub id: i64,
    /// 服务端消息 key，本地新建时先用本地生成的 key 占位
    #[serde(rename = "key")]
    pub key_string: Option<String>,
    /// 单聊对端用户 ID
    #[serde(rename = "peerUserID")]
    pub peer_user_id: Option<String>,
    /// 群聊频道 key
    #[serde(rename = "groupKey")]
    pub group_key: Option<i64>,
    /// 发送者用户 ID（群聊消息归属用）
    #[serde(rename = "senderID")]
    pub sender_id: Option<String>,
    /// 是否本人发出
    #[serde(rename = "sentByOwner", default)]
    pub sent_by_me: bool,
    /// 创建时间（毫秒）
    #[serde(rename = "createdAt")]
    pub created_at_ms: i64,
    /// 消息正文
    #[serde(default)]
    pub content: String,
    /// 内容类型（见 `types::content_type`）
    #[serde(rename = "contentType", default)]
    pub content_type: i32,
    /// 消息状态（见 `types::status`）
    #[serde(default)]
    pub status: i32,
    /// 元数据 map
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// 附件描述
    #[serde(rename = "attachment")]
    pub attachment: Option<AttachmentInfo>,
}

/// 服务端消息 feed 记录
///
/// 可合并字段一律 Option：缺失/null 表示"未携带，保持本地值"，
/// 显式空串表示"覆盖为空"。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageFeed {
    /// 服务端消息 key，缺失视为脏记录，跳过不合并
    #[serde(rename = "key", default)]
    pub key_string: Option<String>,
    #[serde(rename = "peerUserID", default)]
    pub peer_user_id: Option<String>,
    #[serde(rename = "groupKey", default)]
    pub group_key: Option<i64>,
    #[serde(rename = "senderID", default)]
    pub sender_id: Option<String>,
    #[serde(rename = "sentByOwner", default)]
    pub sent_by_me: Option<bool>,
    #[serde(rename = "createdAt", default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<i32>,
    #[serde(default)]
    pub status: Option<i32>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    /// true 时整体替换元数据，false/缺省时逐键合并
    #[serde(rename = "replaceMetadata", default)]
    pub replace_metadata: bool,
    #[serde(default)]
    pub attachment: Option<AttachmentInfo>,
}

/// 消息元数据更新 feed 记录（独立游标的轻量流）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadataFeed {
    #[serde(rename = "key", default)]
    pub key_string: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(rename = "replaceMetadata", default)]
    pub replace_metadata: bool,
}

/// 合并一条消息 feed 记录到本地消息
///
/// - 本地不存在：按 feed 建新记录，缺失字段取默认值；
/// - 本地已存在：消息本体不可变，只推进 status（只前进）、合并 metadata、
///   补齐附件描述。
pub fn merge_message(existing: Option<&LocalMessage>, feed: &MessageFeed) -> LocalMessage {
    match existing {
        None => {
            let sent_by_me = feed.sent_by_me.unwrap_or(false);
            let default_status = if sent_by_me {
                status::SENT
            } else {
                status::UNREAD
            };
            LocalMessage {
                id: 0,
                key_string: feed.key_string.clone(),
                peer_user_id: feed.peer_user_id.clone(),
                group_key: feed.group_key,
                sender_id: feed.sender_id.clone(),
                sent_by_me,
                created_at_ms: feed.created_at_ms,
                content: feed.content.clone().unwrap_or_default(),
                content_type: feed.content_type.unwrap_or_default(),
                status: feed.status.unwrap_or(default_status),
                metadata: feed.metadata.clone().unwrap_or_default(),
                attachment: feed.attachment.clone(),
            }
        }
        Some(local) => {
            let mut merged = local.clone();
            if let Some(s) = feed.status {
                merged.status = status::forward(local.status, s);
            }
            if let Some(ref meta) = feed.metadata {
                if feed.replace_metadata {
                    merged.metadata = meta.clone();
                } else {
                    merge_metadata(&mut merged.metadata, meta);
                }
            }
            if feed.attachment.is_some() {
                merged.attachment = feed.attachment.clone();
            }
            merged
        }
    }
}

/// 应用一条元数据更新记录（替换或逐键合并）
pub fn apply_metadata_update(local: &mut LocalMessage, update: &MessageMetadataFeed) {
    if update.replace_metadata {
        local.metadata = update.metadata.clone();
    } else {
        merge_metadata(&mut local.metadata, &update.metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(key: &str) -> MessageFeed {
        MessageFeed {
            key_string: Some(key.to_string()),
            peer_user_id: Some("peer".to_string()),
            group_key: None,
            sender_id: Some("peer".to_string()),
            sent_by_me: Some(false),
            created_at_ms: 1000,
            content: Some("你好".to_string()),
            content_type: Some(0),
            status: None,
            metadata: None,
            replace_metadata: false,
            attachment: None,
        }
    }

    #[test]
    fn fresh_merge_defaults_incoming_to_unread() {
        let m = merge_message(None, &feed("k1"));
        assert_eq!(m.status, status::UNREAD);
        assert_eq!(m.content, "你好");
    }

    #[test]
    fn fresh_merge_defaults_outgoing_to_sent() {
        let mut f = feed("k1");
        f.sent_by_me = Some(true);
        let m = merge_message(None, &f);
        assert_eq!(m.status, status::SENT);
    }

    #[test]
    fn remote_status_never_regresses() {
        let mut local = merge_message(None, &feed("k1"));
        local.status = status::DELIVERED_READ;

        let mut f = feed("k1");
        f.status = Some(status::DELIVERED);
        let merged = merge_message(Some(&local), &f);
        assert_eq!(merged.status, status::DELIVERED_READ);
    }

    #[test]
    fn merge_keeps_body_immutable() {
        let local = merge_message(None, &feed("k1"));
        let mut f = feed("k1");
        f.content = Some("篡改".to_string());
        f.created_at_ms = 9999;
        let merged = merge_message(Some(&local), &f);
        assert_eq!(merged.content, "你好");
        assert_eq!(merged.created_at_ms, 1000);
    }

    #[test]
    fn metadata_merges_by_key_unless_replace() {
        let mut local = merge_message(None, &feed("k1"));
        local.metadata.insert("local".to_string(), "1".to_string());

        let mut server = HashMap::new();
        server.insert("remote".to_string(), "2".to_string());

        let mut f = feed("k1");
        f.metadata = Some(server.clone());
        let merged = merge_message(Some(&local), &f);
        assert_eq!(merged.metadata.len(), 2);

        f.replace_metadata = true;
        let replaced = merge_message(Some(&local), &f);
        assert_eq!(replaced.metadata, server);
    }

    #[test]
    fn metadata_update_feed_applies_both_modes() {
        let mut local = merge_message(None, &feed("k1"));
        local.metadata.insert("a".to_string(), "1".to_string());

        let mut update = MessageMetadataFeed {
            key_string: Some("k1".to_string()),
            metadata: HashMap::from([("b".to_string(), "2".to_string())]),
            replace_metadata: false,
        };
        apply_metadata_update(&mut local, &update);
        assert_eq!(local.metadata.len(), 2);

        update.replace_metadata = true;
        apply_metadata_update(&mut local, &update);
        assert_eq!(local.metadata.len(), 1);
        assert_eq!(local.metadata.get("b").map(String::as_str), Some("2"));
    }
}
