//! 用户 HTTP API 客户端
//!
//! 负责注册用户分页同步、黑名单与免打扰列表的拉取请求

use crate::im::types::handle_http_response;
use crate::im::user::types::{BlockListResp, MuteListResp, RegisteredUsersResp};
use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// 用户相关的 HTTP API 客户端
pub struct UserApi {
    client: reqwest::Client,
    api_base_url: String,
    user_id: String,
}

impl UserApi {
    /// 创建新的用户 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证拦截器
    pub fn new(client: reqwest::Client, api_base_url: String, user_id: String) -> Self {
        Self {
            client,
            api_base_url,
            user_id,
        }
    }

    /// 拉取一页注册用户（显式分页：startTime 游标 + 页大小）
    pub async fn fetch_registered_users(
        &self,
        start_time: &str,
        page_size: i64,
    ) -> Result<RegisteredUsersResp> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/user/registered", self.api_base_url);

        info!(
            "[UserAPI] 📡 请求注册用户同步，startTime: {}, 页大小: {}",
            start_time, page_size
        );
        debug!("[UserAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "userID": self.user_id,
                "startTime": start_time,
                "pageSize": page_size,
            }))
            .send()
            .await
            .context("请求失败")?;

        let api_resp =
            handle_http_response::<RegisteredUsersResp>(response, "注册用户同步").await?;
        let resp = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!(
            "[UserAPI] ✅ 注册用户同步响应，用户数: {}, lastFetchTime: {}",
            resp.users.len(),
            resp.last_fetch_time
        );
        Ok(resp)
    }

    /// 拉取黑名单增量（两个方向一次带回）
    pub async fn sync_block_list(&self, last_sync_time: &str) -> Result<BlockListResp> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/user/block/sync", self.api_base_url);

        info!("[UserAPI] 📡 请求黑名单同步，水位线: {}", last_sync_time);
        debug!("[UserAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "userID": self.user_id,
                "lastSyncTime": last_sync_time,
            }))
            .send()
            .await
            .context("请求失败")?;

        let api_resp = handle_http_response::<BlockListResp>(response, "黑名单同步").await?;
        let resp = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!(
            "[UserAPI] ✅ 黑名单同步响应，我拉黑: {}, 拉黑我: {}",
            resp.blocked_by_me.len(),
            resp.blocking_me.len()
        );
        Ok(resp)
    }

    /// 拉取免打扰列表增量
    pub async fn sync_mute_list(&self, last_sync_time: &str) -> Result<MuteListResp> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/user/mute/sync", self.api_base_url);

        info!("[UserAPI] 📡 请求免打扰列表同步，水位线: {}", last_sync_time);
        debug!("[UserAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "userID": self.user_id,
                "lastSyncTime": last_sync_time,
            }))
            .send()
            .await
            .context("请求失败")?;

        let api_resp = handle_http_response::<MuteListResp>(response, "免打扰列表同步").await?;
        let resp = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!(
            "[UserAPI] ✅ 免打扰列表同步响应，记录数: {}",
            resp.mutes.len()
        );
        Ok(resp)
    }
}
