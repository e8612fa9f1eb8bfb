//! 频道（群组）本地模型与合并规则

use crate::im::serialization::merge_metadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 本地频道数据结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalChannel {
    /// 服务端分配的整数主键
    #[serde(rename = "channelKey")]
    pub channel_key: i64,
    /// 客户端提供的群组 ID（次级唯一键，创建-或-获取幂等用）
    #[serde(rename = "clientGroupID")]
    pub client_group_id: Option<String>,
    #[serde(rename = "name")]
    pub name: Option<String>,
    /// 管理员用户 ID
    #[serde(rename = "adminID")]
    pub admin_id: Option<String>,
    /// 元数据 map
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// 父频道 key（层级群组）
    #[serde(rename = "parentKey")]
    pub parent_key: Option<i64>,
    /// 软删除时间戳（墓碑）
    #[serde(rename = "deletedAt")]
    pub deleted_at_ms: Option<i64>,
}

/// 频道成员行：(channel_key, user_id) 复合主键
///
/// 成员引用的用户允许先于其联系人记录出现（最终一致）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalChannelMember {
    #[serde(rename = "channelKey")]
    pub channel_key: i64,
    #[serde(rename = "userID")]
    pub user_id: String,
    /// 角色，null 表示尚未知晓
    #[serde(rename = "role")]
    pub role: Option<i32>,
}

/// 服务端频道 feed 记录
///
/// 可合并字段一律 Option：缺失/null 表示保持本地值，显式值（含空串）覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFeed {
    /// 缺失主键视为脏记录，跳过不合并
    #[serde(rename = "channelKey", default)]
    pub channel_key: Option<i64>,
    #[serde(rename = "clientGroupID", default)]
    pub client_group_id: Option<String>,
    #[serde(rename = "name", default)]
    pub name: Option<String>,
    #[serde(rename = "adminID", default)]
    pub admin_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    /// true 时整体替换元数据，false/缺省时逐键合并
    #[serde(rename = "replaceMetadata", default)]
    pub replace_metadata: bool,
    #[serde(rename = "parentKey", default)]
    pub parent_key: Option<i64>,
    #[serde(rename = "deletedAt", default)]
    pub deleted_at_ms: Option<i64>,
    /// 成员角色变更，role 为 null 时保留现有角色
    #[serde(
        default,
        deserialize_with = "crate::im::serialization::deserialize_vec_or_null"
    )]
    pub members: Vec<ChannelMemberFeed>,
}

/// 频道成员 feed 子记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMemberFeed {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "role", default)]
    pub role: Option<i32>,
}

/// 合并一条频道 feed 记录到本地频道
///
/// feed 没携带的字段保持本地值，防止部分响应把已知数据抹空。
/// 墓碑（deletedAt 非空）同样走 upsert，让软删除在本地可见。
pub fn merge_channel(existing: Option<&LocalChannel>, feed: &ChannelFeed) -> LocalChannel {
    let channel_key = feed.channel_key.unwrap_or_default();
    match existing {
        None => LocalChannel {
            channel_key,
            client_group_id: feed.client_group_id.clone(),
            name: feed.name.clone(),
            admin_id: feed.admin_id.clone(),
            metadata: feed.metadata.clone().unwrap_or_default(),
            parent_key: feed.parent_key,
            deleted_at_ms: feed.deleted_at_ms,
        },
        Some(local) => {
            let mut merged = local.clone();
            if feed.client_group_id.is_some() {
                merged.client_group_id = feed.client_group_id.clone();
            }
            if feed.name.is_some() {
                merged.name = feed.name.clone();
            }
            if feed.admin_id.is_some() {
                merged.admin_id = feed.admin_id.clone();
            }
            if let Some(ref meta) = feed.metadata {
                if feed.replace_metadata {
                    merged.metadata = meta.clone();
                } else {
                    merge_metadata(&mut merged.metadata, meta);
                }
            }
            if feed.parent_key.is_some() {
                merged.parent_key = feed.parent_key;
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

    fn feed(key: i64) -> ChannelFeed {
        ChannelFeed {
            channel_key: Some(key),
            client_group_id: Some("cg-1".to_string()),
            name: Some("技术群".to_string()),
            admin_id: Some("alice".to_string()),
            metadata: None,
            replace_metadata: false,
            parent_key: None,
            deleted_at_ms: None,
            members: vec![],
        }
    }

    #[test]
    fn absent_fields_keep_local_values() {
        let local = merge_channel(None, &feed(10));

        // 只带 name 的部分响应不应抹掉 adminID
        let partial = ChannelFeed {
            channel_key: Some(10),
            client_group_id: None,
            name: Some("新名字".to_string()),
            admin_id: None,
            metadata: None,
            replace_metadata: false,
            parent_key: None,
            deleted_at_ms: None,
            members: vec![],
        };
        let merged = merge_channel(Some(&local), &partial);
        assert_eq!(merged.name.as_deref(), Some("新名字"));
        assert_eq!(merged.admin_id.as_deref(), Some("alice"));
        assert_eq!(merged.client_group_id.as_deref(), Some("cg-1"));
    }

    #[test]
    fn explicit_empty_string_overwrites() {
        let local = merge_channel(None, &feed(10));
        let mut partial = feed(10);
        partial.name = Some(String::new());
        let merged = merge_channel(Some(&local), &partial);
        assert_eq!(merged.name.as_deref(), Some(""));
    }

    #[test]
    fn metadata_merge_and_replace() {
        let mut local = merge_channel(None, &feed(10));
        local.metadata.insert("keep".to_string(), "1".to_string());

        let mut partial = feed(10);
        partial.metadata = Some(HashMap::from([("new".to_string(), "2".to_string())]));
        let merged = merge_channel(Some(&local), &partial);
        assert_eq!(merged.metadata.len(), 2);

        partial.replace_metadata = true;
        let replaced = merge_channel(Some(&local), &partial);
        assert_eq!(replaced.metadata.len(), 1);
        assert!(replaced.metadata.contains_key("new"));
    }

    #[test]
    fn tombstone_is_carried_through_merge() {
        let local = merge_channel(None, &feed(10));
        let mut partial = feed(10);
        partial.deleted_at_ms = Some(12345);
        let merged = merge_channel(Some(&local), &partial);
        assert_eq!(merged.deleted_at_ms, Some(12345));
        // 墓碑之外的字段照常保留
        assert_eq!(merged.name.as_deref(), Some("技术群"));
    }
}
