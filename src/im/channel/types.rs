//! 频道 API DTO（请求和响应结构体）

use crate::im::channel::models::ChannelFeed;
use crate::im::serialization::deserialize_vec_or_null;
use serde::Deserialize;

/// 频道增量同步响应（业务逻辑层结构体，可直接从 API 响应反序列化）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFeedResp {
    #[serde(deserialize_with = "deserialize_vec_or_null")]
    pub channel_feeds: Vec<ChannelFeed>,
    /// 服务端生成时间，无论是否有记录都作为新游标持久化，
    /// 避免反复扫描已知为空的时间区间
    pub generated_at: i64,
}
