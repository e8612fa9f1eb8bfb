//! 频道同步服务层
//!
//! 实现频道列表的增量同步：读游标 → 拉取 → 逐条合并 → 推进游标 →
//! 通知监听器。空响应同样推进游标（generatedAt 是服务端给的新水位线）。

use crate::im::channel::api::ChannelApi;
use crate::im::channel::dao::ChannelDao;
use crate::im::channel::listener::{ChannelListener, EmptyChannelListener};
use crate::im::channel::models::{ChannelFeed, LocalChannel};
use crate::im::cursor::dao::CursorDao;
use crate::im::types::{cursor_name, FULL_REFRESH_THRESHOLD};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// 频道同步器配置
pub struct ChannelSyncerConfig {
    /// 用户 ID
    pub user_id: String,
    /// API 基础 URL
    pub api_base_url: String,
    /// 软删除处理策略：true 时墓碑记录直接物理删除本地行并发删除回调，
    /// false（默认）时墓碑以 upsert 方式落库、仅从活跃列表隐藏
    pub skip_soft_deleted: bool,
}

/// 频道同步器
pub struct ChannelSyncer {
    config: ChannelSyncerConfig,
    /// 频道 API 客户端
    api: ChannelApi,
    /// 频道 DAO
    dao: Arc<ChannelDao>,
    /// 游标 DAO
    cursor_dao: Arc<CursorDao>,
    /// 频道监听器
    listener: Arc<dyn ChannelListener>,
}

impl ChannelSyncer {
    /// 创建新的频道同步器
    pub fn new(
        config: ChannelSyncerConfig,
        http_client: reqwest::Client,
        dao: Arc<ChannelDao>,
        cursor_dao: Arc<CursorDao>,
    ) -> Self {
        Self::with_listener(
            config,
            http_client,
            dao,
            cursor_dao,
            Arc::new(EmptyChannelListener),
        )
    }

    /// 创建新的频道同步器（带自定义监听器）
    pub fn with_listener(
        config: ChannelSyncerConfig,
        http_client: reqwest::Client,
        dao: Arc<ChannelDao>,
        cursor_dao: Arc<CursorDao>,
        listener: Arc<dyn ChannelListener>,
    ) -> Self {
        let api = ChannelApi::new(
            http_client,
            config.api_base_url.clone(),
            config.user_id.clone(),
        );
        Self {
            config,
            api,
            dao,
            cursor_dao,
            listener,
        }
    }

    /// 增量同步频道，返回受影响的频道数
    ///
    /// 拉取失败直接返回错误，游标保持原值。
    pub async fn sync_incremental(&self) -> Result<usize> {
        info!("[ChanSync] 🔄 开始增量同步频道...");
        let cursor = self.cursor_dao.get(cursor_name::CHANNEL_SYNC).await?;
        let resp = self.api.sync_channel_feed(&cursor).await?;

        let affected = self
            .apply_feed_page(&resp.channel_feeds, resp.generated_at)
            .await?;
        info!("[ChanSync] ✅ 增量同步频道完成，共 {} 个", affected);
        Ok(affected)
    }

    /// 合并一页频道 feed 并推进游标
    ///
    /// 缺主键的脏记录跳过且不中断整页；空页也推进游标。
    pub async fn apply_feed_page(&self, feeds: &[ChannelFeed], generated_at: i64) -> Result<usize> {
        let mut affected_keys: Vec<i64> = Vec::new();

        for feed in feeds {
            let Some(key) = feed.channel_key else {
                warn!("[ChanSync] ⚠️ 跳过缺少 channelKey 的频道 feed 记录");
                continue;
            };

            if feed.deleted_at_ms.is_some() && self.config.skip_soft_deleted {
                self.dao.delete_channel(key).await?;
                self.listener.on_channel_deleted(key).await;
                affected_keys.push(key);
                continue;
            }

            self.dao.merge_feed(feed).await?;
            affected_keys.push(key);
        }

        // 合并成功后才推进游标；无记录时也要推进到新的 generatedAt
        self.cursor_dao
            .advance(cursor_name::CHANNEL_SYNC, &generated_at.to_string())
            .await?;

        if affected_keys.len() > FULL_REFRESH_THRESHOLD {
            self.listener.on_channels_refresh_needed().await;
        } else if !affected_keys.is_empty() {
            let json =
                serde_json::to_string(&affected_keys).unwrap_or_else(|_| "[]".to_string());
            self.listener.on_channels_updated(json).await;
        }
        Ok(affected_keys.len())
    }

    /// 查询所有未软删除的频道
    pub async fn get_active_channels(&self) -> Result<Vec<LocalChannel>> {
        self.dao.get_active_channels().await
    }

    /// 按客户端群组 ID 查询本地频道（创建-或-获取幂等入口）
    pub async fn get_by_client_group_id(
        &self,
        client_group_id: &str,
    ) -> Result<Option<LocalChannel>> {
        self.dao.get_by_client_group_id(client_group_id).await
    }

    /// 频道 DAO（供客户端读取接口复用）
    pub fn dao(&self) -> &Arc<ChannelDao> {
        &self.dao
    }
}
