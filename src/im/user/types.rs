//! 用户 API DTO（请求和响应结构体）

use crate::im::serialization::deserialize_vec_or_null;
use crate::im::user::models::{BlockFeed, MuteFeed, UserFeed};
use serde::Deserialize;

/// 注册用户分页同步响应（业务逻辑层结构体，可直接从 API 响应反序列化）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUsersResp {
    #[serde(deserialize_with = "deserialize_vec_or_null")]
    pub users: Vec<UserFeed>,
    /// 响应自带的拉取时间，持久化的是它而不是请求参数的回显
    pub last_fetch_time: i64,
}

/// 黑名单同步响应：两个方向独立的列表，共用一个水位线
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockListResp {
    /// 我拉黑的用户
    #[serde(deserialize_with = "deserialize_vec_or_null")]
    pub blocked_by_me: Vec<BlockFeed>,
    /// 拉黑我的用户
    #[serde(deserialize_with = "deserialize_vec_or_null")]
    pub blocking_me: Vec<BlockFeed>,
    pub generated_at: i64,
}

/// 免打扰列表同步响应
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteListResp {
    #[serde(deserialize_with = "deserialize_vec_or_null")]
    pub mutes: Vec<MuteFeed>,
    pub generated_at: i64,
}
