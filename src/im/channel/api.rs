//! 频道 HTTP API 客户端
//!
//! 负责频道增量 feed 的拉取请求

use crate::im::channel::types::ChannelFeedResp;
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// 频道相关的 HTTP API 客户端
pub struct ChannelApi {
    client: reqwest::Client,
    api_base_url: String,
    user_id: String,
}

impl ChannelApi {
    /// 创建新的频道 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证拦截器
    pub fn new(client: reqwest::Client, api_base_url: String, user_id: String) -> Self {
        Self {
            client,
            api_base_url,
            user_id,
        }
    }

    /// 拉取频道增量 feed
    ///
    /// 请求携带上次的 generatedAt 水位线，响应带回新的 generatedAt。
    pub async fn sync_channel_feed(&self, last_generated_at: &str) -> Result<ChannelFeedResp> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/channel/sync", self.api_base_url);

        info!(
            "[ChanAPI] 📡 请求频道增量同步，水位线: {}",
            last_generated_at
        );
        debug!("[ChanAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "userID": self.user_id,
                "lastGeneratedAt": last_generated_at,
            }))
            .send()
            .await
            .context("请求失败")?;

        let api_resp = handle_http_response::<ChannelFeedResp>(response, "频道增量同步").await?;
        let resp = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!(
            "[ChanAPI] ✅ 频道增量同步响应，记录数: {}, generatedAt: {}",
            resp.channel_feeds.len(),
            resp.generated_at
        );
        Ok(resp)
    }
}
