//! 联系人/用户本地模型与合并规则

use crate::im::serialization::merge_metadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 本地用户详情数据结构
///
/// user_id 全应用唯一。墓碑行（deleted_at_ms 非空）不出现在活跃联系人
/// 列表里，但仍可按 ID 解析，保证历史消息的发送者归属可查。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUserDetail {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    /// 头像链接
    #[serde(rename = "imageLink")]
    pub image_link: Option<String>,
    #[serde(rename = "phoneNumber")]
    pub phone_number: Option<String>,
    #[serde(rename = "email")]
    pub email: Option<String>,
    /// 是否在线
    #[serde(rename = "connected", default)]
    pub connected: bool,
    /// 最后在线时间（毫秒）
    #[serde(rename = "lastSeenAt", default)]
    pub last_seen_at_ms: i64,
    /// 角色类型
    #[serde(rename = "roleType", default)]
    pub role_type: i32,
    /// 我拉黑了对方
    #[serde(rename = "blockedByOwner", default)]
    pub blocked: bool,
    /// 对方拉黑了我
    #[serde(rename = "blockedByPeer", default)]
    pub blocked_by: bool,
    /// 免打扰截止时间（毫秒），0 表示未静音
    #[serde(rename = "mutedUntil", default)]
    pub muted_until_ms: i64,
    /// 元数据 map
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// 软删除时间戳（墓碑）
    #[serde(rename = "deletedAt")]
    pub deleted_at_ms: Option<i64>,
}

/// 服务端用户 feed 记录（注册用户同步流）
///
/// 可合并字段一律 Option：缺失/null 表示保持本地值，显式值（含空串）覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFeed {
    /// 缺失主键视为脏记录，跳过不合并
    #[serde(rename = "userID", default)]
    pub user_id: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "imageLink", default)]
    pub image_link: Option<String>,
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: Option<String>,
    #[serde(rename = "email", default)]
    pub email: Option<String>,
    #[serde(rename = "connected", default)]
    pub connected: Option<bool>,
    #[serde(rename = "lastSeenAt", default)]
    pub last_seen_at_ms: Option<i64>,
    #[serde(rename = "roleType", default)]
    pub role_type: Option<i32>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    /// true 时整体替换元数据，false/缺省时逐键合并
    #[serde(rename = "replaceMetadata", default)]
    pub replace_metadata: bool,
    #[serde(rename = "deletedAt", default)]
    pub deleted_at_ms: Option<i64>,
}

/// 黑名单 feed 记录（blocked 是当前状态，false 表示已解除）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockFeed {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "blocked", default)]
    pub blocked: bool,
}

/// 免打扰 feed 记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteFeed {
    #[serde(rename = "userID")]
    pub user_id: String,
    /// 免打扰截止时间（毫秒），0/过去的时间表示解除
    #[serde(rename = "notificationAfterTime", default)]
    pub muted_until_ms: i64,
}

/// 合并一条用户 feed 记录到本地用户详情
///
/// feed 没携带的字段保持本地值，防止部分响应把已知数据抹空；
/// 黑名单/免打扰标记由各自的同步流维护，这里不碰。
pub fn merge_user(existing: Option<&LocalUserDetail>, feed: &UserFeed) -> LocalUserDetail {
    let user_id = feed.user_id.clone().unwrap_or_default();
    match existing {
        None => LocalUserDetail {
            user_id,
            display_name: feed.display_name.clone(),
            image_link: feed.image_link.clone(),
            phone_number: feed.phone_number.clone(),
            email: feed.email.clone(),
            connected: feed.connected.unwrap_or(false),
            last_seen_at_ms: feed.last_seen_at_ms.unwrap_or(0),
            role_type: feed.role_type.unwrap_or(0),
            blocked: false,
            blocked_by: false,
            muted_until_ms: 0,
            metadata: feed.metadata.clone().unwrap_or_default(),
            deleted_at_ms: feed.deleted_at_ms,
        },
        Some(local) => {
            let mut merged = local.clone();
            if feed.display_name.is_some() {
                merged.display_name = feed.display_name.clone();
            }
            if feed.image_link.is_some() {
                merged.image_link = feed.image_link.clone();
            }
            if feed.phone_number.is_some() {
                merged.phone_number = feed.phone_number.clone();
            }
            if feed.email.is_some() {
                merged.email = feed.email.clone();
            }
            if let Some(connected) = feed.connected {
                merged.connected = connected;
            }
            if let Some(last_seen) = feed.last_seen_at_ms {
                merged.last_seen_at_ms = last_seen;
            }
            if let Some(role) = feed.role_type {
                merged.role_type = role;
            }
            if let Some(ref meta) = feed.metadata {
                if feed.replace_metadata {
                    merged.metadata = meta.clone();
                } else {
                    merge_metadata(&mut merged.metadata, meta);
                }
            }
            if feed.deleted_at_ms.is_some() {
                merged.deleted_at_ms = feed.deleted_at_ms;
            }
            merged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(user_id: &str) -> UserFeed {
        UserFeed {
            user_id: Some(user_id.to_string()),
            display_name: Some("Alice".to_string()),
            image_link: Some("http://x/y.png".to_string()),
            phone_number: None,
            email: None,
            connected: None,
            last_seen_at_ms: None,
            role_type: None,
            metadata: None,
            replace_metadata: false,
            deleted_at_ms: None,
        }
    }

    #[test]
    fn partial_feed_does_not_blank_known_fields() {
        let local = merge_user(None, &feed("u1"));

        // 只带 displayName 的响应不应把 imageLink 置空
        let partial = UserFeed {
            user_id: Some("u1".to_string()),
            display_name: Some("Bob".to_string()),
            image_link: None,
            phone_number: None,
            email: None,
            connected: None,
            last_seen_at_ms: None,
            role_type: None,
            metadata: None,
            replace_metadata: false,
            deleted_at_ms: None,
        };
        let merged = merge_user(Some(&local), &partial);
        assert_eq!(merged.display_name.as_deref(), Some("Bob"));
        assert_eq!(merged.image_link.as_deref(), Some("http://x/y.png"));
    }

    #[test]
    fn explicit_empty_string_overwrites() {
        let local = merge_user(None, &feed("u1"));
        let mut partial = feed("u1");
        partial.display_name = Some(String::new());
        let merged = merge_user(Some(&local), &partial);
        assert_eq!(merged.display_name.as_deref(), Some(""));
    }

    #[test]
    fn merge_does_not_touch_block_and_mute_flags() {
        let mut local = merge_user(None, &feed("u1"));
        local.blocked = true;
        local.muted_until_ms = 999;

        let merged = merge_user(Some(&local), &feed("u1"));
        assert!(merged.blocked);
        assert_eq!(merged.muted_until_ms, 999);
    }

    #[test]
    fn tombstone_feed_sets_deleted_at() {
        let local = merge_user(None, &feed("u1"));
        let mut partial = feed("u1");
        partial.deleted_at_ms = Some(777);
        let merged = merge_user(Some(&local), &partial);
        assert_eq!(merged.deleted_at_ms, Some(777));
        // 其余字段不受影响
        assert_eq!(merged.display_name.as_deref(), Some("Alice"));
    }
}
