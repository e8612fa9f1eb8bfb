//! 用户同步服务层
//!
//! 三条同步流共用一个服务：注册用户（显式分页）、黑名单（双向列表、
//! 共用水位线）、免打扰列表。黑名单合并完成后立刻把压制名单推给会话
//! 跟踪器，被拉黑用户的后续消息不再进入最近会话列表。

use crate::im::conversation::service::ConversationTracker;
use crate::im::cursor::dao::CursorDao;
use crate::im::types::{cursor_name, FULL_REFRESH_THRESHOLD};
use crate::im::user::api::UserApi;
use crate::im::user::dao::UserDao;
use crate::im::user::listener::{ContactListener, EmptyContactListener};
use crate::im::user::models::{BlockFeed, LocalUserDetail, MuteFeed, UserFeed};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// 用户同步器配置
pub struct UserSyncerConfig {
    /// 用户 ID
    pub user_id: String,
    /// API 基础 URL
    pub api_base_url: String,
    /// 注册用户同步每页条数
    pub page_size: i64,
    /// 软删除处理策略：true 时墓碑记录物理删除并发删除回调
    pub skip_soft_deleted: bool,
}

/// 用户同步器
pub struct UserSyncer {
    config: UserSyncerConfig,
    /// 用户 API 客户端
    api: UserApi,
    /// 用户 DAO
    dao: Arc<UserDao>,
    /// 游标 DAO
    cursor_dao: Arc<CursorDao>,
    /// 会话跟踪器（黑名单压制联动）
    tracker: Arc<ConversationTracker>,
    /// 联系人监听器
    listener: Arc<dyn ContactListener>,
}

impl UserSyncer {
    /// 创建新的用户同步器
    pub fn new(
        config: UserSyncerConfig,
        http_client: reqwest::Client,
        dao: Arc<UserDao>,
        cursor_dao: Arc<CursorDao>,
        tracker: Arc<ConversationTracker>,
    ) -> Self {
        Self::with_listener(
            config,
            http_client,
            dao,
            cursor_dao,
            tracker,
            Arc::new(EmptyContactListener),
        )
    }

    /// 创建新的用户同步器（带自定义监听器）
    pub fn with_listener(
        config: UserSyncerConfig,
        http_client: reqwest::Client,
        dao: Arc<UserDao>,
        cursor_dao: Arc<CursorDao>,
        tracker: Arc<ConversationTracker>,
        listener: Arc<dyn ContactListener>,
    ) -> Self {
        let api = UserApi::new(
            http_client,
            config.api_base_url.clone(),
            config.user_id.clone(),
        );
        Self {
            config,
            api,
            dao,
            cursor_dao,
            tracker,
            listener,
        }
    }

    /// 增量同步注册用户（逐页拉取直到不满一页）
    ///
    /// 持久化的水位线是响应自带的 lastFetchTime，每页合并成功后推进一次，
    /// 中途失败/取消时停在最后一个完整合并的页。
    pub async fn sync_registered_users(&self) -> Result<usize> {
        info!("[UserSync] 🔄 开始增量同步注册用户...");
        let mut total = 0usize;
        loop {
            let cursor = self
                .cursor_dao
                .get(cursor_name::REGISTERED_USER_SYNC)
                .await?;
            let resp = self
                .api
                .fetch_registered_users(&cursor, self.config.page_size)
                .await?;
            let page_len = resp.users.len();

            total += self
                .apply_user_page(&resp.users, resp.last_fetch_time)
                .await?;

            if (page_len as i64) < self.config.page_size {
                break;
            }
        }
        info!("[UserSync] ✅ 注册用户同步完成，共 {} 个", total);
        Ok(total)
    }

    /// 合并一页用户 feed 并推进游标
    pub async fn apply_user_page(&self, feeds: &[UserFeed], last_fetch_time: i64) -> Result<usize> {
        let mut affected_ids: Vec<String> = Vec::new();

        for feed in feeds {
            let Some(ref user_id) = feed.user_id else {
                warn!("[UserSync] ⚠️ 跳过缺少 userID 的用户 feed 记录");
                continue;
            };

            if feed.deleted_at_ms.is_some() && self.config.skip_soft_deleted {
                self.dao.delete_user(user_id).await?;
                self.listener.on_contact_deleted(user_id.clone()).await;
                affected_ids.push(user_id.clone());
                continue;
            }

            self.dao.merge_feed(feed).await?;
            affected_ids.push(user_id.clone());
        }

        self.cursor_dao
            .advance(
                cursor_name::REGISTERED_USER_SYNC,
                &last_fetch_time.to_string(),
            )
            .await?;

        if affected_ids.len() > FULL_REFRESH_THRESHOLD {
            self.listener.on_contacts_refresh_needed().await;
        } else if !affected_ids.is_empty() {
            let json = serde_json::to_string(&affected_ids).unwrap_or_else(|_| "[]".to_string());
            self.listener.on_contact_list_changed(json).await;
        }
        Ok(affected_ids.len())
    }

    /// 同步黑名单（两个方向的列表，一个共用水位线）
    pub async fn sync_block_list(&self) -> Result<usize> {
        info!("[UserSync] 🔄 开始同步黑名单...");
        let cursor = self.cursor_dao.get(cursor_name::BLOCK_LIST_SYNC).await?;
        let resp = self.api.sync_block_list(&cursor).await?;

        let affected = self
            .apply_block_lists(&resp.blocked_by_me, &resp.blocking_me, resp.generated_at)
            .await?;
        info!("[UserSync] ✅ 黑名单同步完成，共 {} 条变更", affected);
        Ok(affected)
    }

    /// 合并黑名单两个方向的变更并推进共用游标
    pub async fn apply_block_lists(
        &self,
        blocked_by_me: &[BlockFeed],
        blocking_me: &[BlockFeed],
        generated_at: i64,
    ) -> Result<usize> {
        for entry in blocked_by_me {
            self.dao
                .set_block_status(&entry.user_id, Some(entry.blocked), None)
                .await?;
        }
        for entry in blocking_me {
            self.dao
                .set_block_status(&entry.user_id, None, Some(entry.blocked))
                .await?;
        }

        self.cursor_dao
            .advance(cursor_name::BLOCK_LIST_SYNC, &generated_at.to_string())
            .await?;

        // 拉黑立即生效：把最新压制名单推给会话跟踪器
        let blocked_ids: HashSet<String> =
            self.dao.get_blocked_user_ids().await?.into_iter().collect();
        self.tracker.set_blocked_users(blocked_ids.clone()).await;

        let affected = blocked_by_me.len() + blocking_me.len();
        if affected > 0 {
            let ids: Vec<&String> = blocked_ids.iter().collect();
            let json = serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string());
            self.listener.on_block_list_changed(json).await;
        }
        Ok(affected)
    }

    /// 同步免打扰列表
    pub async fn sync_mute_list(&self) -> Result<usize> {
        info!("[UserSync] 🔄 开始同步免打扰列表...");
        let cursor = self.cursor_dao.get(cursor_name::MUTE_LIST_SYNC).await?;
        let resp = self.api.sync_mute_list(&cursor).await?;

        let affected = self.apply_mute_list(&resp.mutes, resp.generated_at).await?;
        info!("[UserSync] ✅ 免打扰列表同步完成，共 {} 条", affected);
        Ok(affected)
    }

    /// 合并免打扰变更并推进游标
    pub async fn apply_mute_list(&self, mutes: &[MuteFeed], generated_at: i64) -> Result<usize> {
        let mut affected_ids = Vec::new();
        for entry in mutes {
            self.dao
                .set_mute_status(&entry.user_id, entry.muted_until_ms)
                .await?;
            affected_ids.push(entry.user_id.clone());
        }

        self.cursor_dao
            .advance(cursor_name::MUTE_LIST_SYNC, &generated_at.to_string())
            .await?;

        if !affected_ids.is_empty() {
            let json = serde_json::to_string(&affected_ids).unwrap_or_else(|_| "[]".to_string());
            self.listener.on_mute_list_changed(json).await;
        }
        Ok(affected_ids.len())
    }

    /// 查询活跃联系人列表
    pub async fn get_active_contacts(&self) -> Result<Vec<LocalUserDetail>> {
        self.dao.get_active_contacts().await
    }

    /// 用户 DAO（供客户端读取接口复用）
    pub fn dao(&self) -> &Arc<UserDao> {
        &self.dao
    }
}
