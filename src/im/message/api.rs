//! 消息 HTTP API 客户端
//!
//! 负责消息增量 feed 与元数据更新流的拉取请求

use crate::im::message::types::{MessageFeedResp, MessageMetadataResp};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// 消息相关的 HTTP API 客户端
pub struct MessageApi {
    client: reqwest::Client,
    api_base_url: String,
    user_id: String,
}

impl MessageApi {
    /// 创建新的消息 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证拦截器
    pub fn new(client: reqwest::Client, api_base_url: String, user_id: String) -> Self {
        Self {
            client,
            api_base_url,
            user_id,
        }
    }

    /// 拉取一页消息增量 feed
    pub async fn fetch_feed(&self, last_sync_time: &str, page_size: i64) -> Result<MessageFeedResp> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/message/sync", self.api_base_url);

        info!(
            "[MsgAPI] 📡 请求消息增量同步，水位线: {}, 页大小: {}",
            last_sync_time, page_size
        );
        debug!("[MsgAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "userID": self.user_id,
                "lastSyncTime": last_sync_time,
                "pageSize": page_size,
            }))
            .send()
            .await
            .context("请求失败")?;

        let api_resp = handle_http_response::<MessageFeedResp>(response, "消息增量同步").await?;
        let resp = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!(
            "[MsgAPI] ✅ 消息增量同步响应，消息数: {}, 新水位线: {}",
            resp.messages.len(),
            resp.last_sync_time
        );
        Ok(resp)
    }

    /// 拉取一页消息元数据更新流
    pub async fn fetch_metadata_updates(&self, last_sync_time: &str) -> Result<MessageMetadataResp> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/message/metadata/sync", self.api_base_url);

        info!(
            "[MsgAPI] 📡 请求消息元数据更新，水位线: {}",
            last_sync_time
        );
        debug!("[MsgAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

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

        let api_resp =
            handle_http_response::<MessageMetadataResp>(response, "消息元数据同步").await?;
        let resp = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!(
            "[MsgAPI] ✅ 消息元数据更新响应，更新数: {}, 新水位线: {}",
            resp.updates.len(),
            resp.last_sync_time
        );
        Ok(resp)
    }
}
