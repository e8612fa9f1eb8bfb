//! 消息 API DTO（请求和响应结构体）

use crate::im::message::models::{MessageFeed, MessageMetadataFeed};
use crate::im::serialization::deserialize_vec_or_null;
use serde::Deserialize;

/// 消息增量同步响应（业务逻辑层结构体，可直接从 API 响应反序列化）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFeedResp {
    #[serde(deserialize_with = "deserialize_vec_or_null")]
    pub messages: Vec<MessageFeed>,
    /// 响应自带的新水位线，合并成功后以它为准持久化
    pub last_sync_time: i64,
}

/// 消息元数据增量同步响应
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadataResp {
    #[serde(deserialize_with = "deserialize_vec_or_null")]
    pub updates: Vec<MessageMetadataFeed>,
    pub last_sync_time: i64,
}
