//! 消息同步服务层
//!
//! 实现消息 feed 的增量同步：读游标 → 拉取 → 逐条合并 → 推进游标 →
//! 通知监听器。页内按拉取顺序合并，每合并完一页才推进一次游标，
//! 中途崩溃/取消时游标停在最后一个完整合并的页上，重放靠 upsert 幂等。

use crate::im::conversation::recents::ConversationKey;
use crate::im::conversation::service::ConversationTracker;
use crate::im::cursor::dao::CursorDao;
use crate::im::message::api::MessageApi;
use crate::im::message::dao::MessageDao;
use crate::im::message::listener::{EmptyMessageListener, MessageListener};
use crate::im::message::models::{LocalMessage, MessageFeed, MessageMetadataFeed};
use crate::im::serialization::generate_local_key;
use crate::im::types::{cursor_name, status, FULL_REFRESH_THRESHOLD};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 消息同步器配置
pub struct MessageSyncerConfig {
    /// 用户 ID
    pub user_id: String,
    /// API 基础 URL
    pub api_base_url: String,
    /// 每页拉取的消息条数
    pub page_size: i64,
}

/// 本地新建消息的参数
pub struct MessageDraft {
    /// 单聊对端用户 ID（与 group_key 二选一）
    pub peer_user_id: Option<String>,
    /// 群聊频道 key（与 peer_user_id 二选一）
    pub group_key: Option<i64>,
    pub content: String,
    pub content_type: i32,
    pub metadata: HashMap<String, String>,
}

/// 消息同步器
pub struct MessageSyncer {
    config: MessageSyncerConfig,
    /// 消息 API 客户端
    api: MessageApi,
    /// 消息 DAO
    dao: Arc<MessageDao>,
    /// 游标 DAO
    cursor_dao: Arc<CursorDao>,
    /// 会话跟踪器
    tracker: Arc<ConversationTracker>,
    /// 消息监听器
    listener: Arc<dyn MessageListener>,
}

impl MessageSyncer {
    /// 创建新的消息同步器
    pub fn new(
        config: MessageSyncerConfig,
        http_client: reqwest::Client,
        dao: Arc<MessageDao>,
        cursor_dao: Arc<CursorDao>,
        tracker: Arc<ConversationTracker>,
    ) -> Self {
        Self::with_listener(
            config,
            http_client,
            dao,
            cursor_dao,
            tracker,
            Arc::new(EmptyMessageListener),
        )
    }

    /// 创建新的消息同步器（带自定义监听器）
    pub fn with_listener(
        config: MessageSyncerConfig,
        http_client: reqwest::Client,
        dao: Arc<MessageDao>,
        cursor_dao: Arc<CursorDao>,
        tracker: Arc<ConversationTracker>,
        listener: Arc<dyn MessageListener>,
    ) -> Self {
        let api = MessageApi::new(
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

    /// 增量同步消息（逐页拉取直到不满一页）
    ///
    /// 返回受影响的消息条数。拉取失败直接返回错误，游标保持原值，
    /// 重试时机由调用方决定。
    pub async fn sync_incremental(&self) -> Result<usize> {
        info!("[MsgSync] 🔄 开始增量同步消息...");
        let mut total = 0usize;
        loop {
            let cursor = self.cursor_dao.get(cursor_name::MESSAGE_SYNC).await?;
            let resp = self.api.fetch_feed(&cursor, self.config.page_size).await?;
            let page_len = resp.messages.len();

            total += self
                .apply_feed_page(&resp.messages, resp.last_sync_time)
                .await?;

            if (page_len as i64) < self.config.page_size {
                break;
            }
        }
        info!("[MsgSync] ✅ 增量同步消息完成，共 {} 条", total);
        Ok(total)
    }

    /// 合并一页消息 feed 并推进游标
    ///
    /// 缺 key 的脏记录跳过且不中断整页；落库错误让整页失败（游标不动），
    /// 页内已写入的部分靠 upsert 幂等在重试时自愈。
    pub async fn apply_feed_page(&self, feeds: &[MessageFeed], new_cursor: i64) -> Result<usize> {
        let mut affected_keys: Vec<String> = Vec::new();

        for feed in feeds {
            let Some(ref key) = feed.key_string else {
                warn!("[MsgSync] ⚠️ 跳过缺少 key 的消息 feed 记录");
                continue;
            };
            let merged = self.dao.merge_feed(feed).await?;
            if let Err(e) = self.tracker.on_message_merged(&merged).await {
                // 有 key 却没有会话身份：上游数据问题，不拖垮整页
                warn!("[MsgSync] ⚠️ 消息 {} 未进入最近会话列表: {}", key, e);
            }
            affected_keys.push(key.clone());
        }

        // 页合并成功后才推进游标；空页也推进，避免反复扫已知的空区间
        self.cursor_dao
            .advance(cursor_name::MESSAGE_SYNC, &new_cursor.to_string())
            .await?;

        if affected_keys.len() > FULL_REFRESH_THRESHOLD {
            self.listener.on_messages_refresh_needed().await;
        } else if !affected_keys.is_empty() {
            let json =
                serde_json::to_string(&affected_keys).unwrap_or_else(|_| "[]".to_string());
            self.listener.on_messages_updated(json).await;
        }
        if !affected_keys.is_empty() {
            self.tracker.notify_total_unread(&self.dao).await?;
        }
        Ok(affected_keys.len())
    }

    /// 增量同步消息元数据更新流（独立游标）
    pub async fn sync_metadata_updates(&self) -> Result<usize> {
        info!("[MsgSync] 🔄 开始同步消息元数据更新...");
        let cursor = self
            .cursor_dao
            .get(cursor_name::MESSAGE_METADATA_SYNC)
            .await?;
        let resp = self.api.fetch_metadata_updates(&cursor).await?;

        let affected = self
            .apply_metadata_page(&resp.updates, resp.last_sync_time)
            .await?;
        info!("[MsgSync] ✅ 消息元数据同步完成，共 {} 条", affected);
        Ok(affected)
    }

    /// 合并一页元数据更新并推进游标
    pub async fn apply_metadata_page(
        &self,
        updates: &[MessageMetadataFeed],
        new_cursor: i64,
    ) -> Result<usize> {
        let mut affected_keys = Vec::new();
        for update in updates {
            let Some(ref key) = update.key_string else {
                warn!("[MsgSync] ⚠️ 跳过缺少 key 的元数据更新记录");
                continue;
            };
            if self.dao.merge_metadata_update(update).await?.is_some() {
                affected_keys.push(key.clone());
            }
        }

        self.cursor_dao
            .advance(cursor_name::MESSAGE_METADATA_SYNC, &new_cursor.to_string())
            .await?;

        if !affected_keys.is_empty() {
            let json =
                serde_json::to_string(&affected_keys).unwrap_or_else(|_| "[]".to_string());
            self.listener.on_message_metadata_updated(json).await;
        }
        Ok(affected_keys.len())
    }

    /// 本地新建待发送消息（PENDING，本地 key 占位）
    ///
    /// 发送本身由薄封装的 REST 调用完成，不在本 SDK 范围；服务端确认的
    /// 回执会沿同一 key 通过 feed 合并回来，upsert 自然完成对账。
    pub async fn create_pending_message(&self, draft: MessageDraft) -> Result<LocalMessage> {
        let msg = LocalMessage {
            id: 0,
            key_string: Some(generate_local_key(&self.config.user_id)),
            peer_user_id: draft.peer_user_id,
            group_key: draft.group_key,
            sender_id: None,
            sent_by_me: true,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
            content: draft.content,
            content_type: draft.content_type,
            status: status::PENDING,
            metadata: draft.metadata,
            attachment: None,
        };
        let stored = self.dao.upsert_message(&msg).await?;
        self.tracker.on_message_merged(&stored).await?;
        Ok(stored)
    }

    /// 标记会话内全部消息为已读
    pub async fn mark_conversation_read(&self, key: &ConversationKey) -> Result<u64> {
        let changed = self.dao.mark_conversation_read(key).await?;
        if changed > 0 {
            self.tracker.notify_total_unread(&self.dao).await?;
        }
        Ok(changed)
    }

    /// 删除整个会话（消息 + 最近会话条目）
    pub async fn delete_conversation(&self, key: &ConversationKey) -> Result<u64> {
        let removed = self.dao.delete_conversation(key).await?;
        self.tracker.remove_conversation(key).await;
        self.tracker.notify_total_unread(&self.dao).await?;
        info!("[MsgSync] 删除会话 {}，共 {} 条消息", key, removed);
        Ok(removed)
    }

    /// 按服务端 key 删除单条消息（对所有人删除），并修复最新指针
    pub async fn delete_message(&self, message_key: &str) -> Result<bool> {
        let Some(existing) = self.dao.get_by_key(message_key).await? else {
            return Ok(false);
        };
        let conv_key = ConversationKey::of_message(&existing)
            .context("被删除的消息缺少会话身份")?;

        self.dao.delete_by_key(message_key).await?;

        // 只有删的是缓存的最新消息才需要修复指针
        let cached = self.tracker.latest_of(&conv_key).await;
        if cached.as_ref().and_then(|m| m.key_string.as_deref()) == Some(message_key) {
            let replacement = self.dao.latest_for_conversation(&conv_key).await?;
            self.tracker.repair_latest(&conv_key, replacement).await?;
        }

        self.listener
            .on_message_deleted(message_key.to_string())
            .await;
        self.tracker.notify_total_unread(&self.dao).await?;
        Ok(true)
    }

    /// 消息 DAO（供客户端读取接口复用）
    pub fn dao(&self) -> &Arc<MessageDao> {
        &self.dao
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::db::connect_memory_pool;
    use sqlx::{Pool, Sqlite};

    async fn syncer_with_pool() -> (MessageSyncer, Pool<Sqlite>) {
        let pool = connect_memory_pool().await;
        MessageDao::init_db_with_connection(&pool).await.unwrap();
        CursorDao::init_db_with_connection(&pool).await.unwrap();

        let dao = Arc::new(MessageDao::new(pool.clone()));
        let cursor_dao = Arc::new(CursorDao::new(pool.clone(), "me".to_string()));
        let tracker = Arc::new(ConversationTracker::new());
        let syncer = MessageSyncer::new(
            MessageSyncerConfig {
                user_id: "me".to_string(),
                api_base_url: "http://127.0.0.1:1".to_string(),
                page_size: 50,
            },
            reqwest::Client::new(),
            dao,
            cursor_dao,
            tracker,
        );
        (syncer, pool)
    }

    fn feed(key: &str, peer: &str, ts: i64) -> MessageFeed {
        MessageFeed {
            key_string: Some(key.to_string()),
            peer_user_id: Some(peer.to_string()),
            group_key: None,
            sender_id: Some(peer.to_string()),
            sent_by_me: Some(false),
            created_at_ms: ts,
            content: Some("hi".to_string()),
            content_type: Some(0),
            status: None,
            metadata: None,
            replace_metadata: false,
            attachment: None,
        }
    }

    #[tokio::test]
    async fn apply_page_advances_cursor_even_when_empty() {
        let (syncer, _pool) = syncer_with_pool().await;
        let affected = syncer.apply_feed_page(&[], 500).await.unwrap();
        assert_eq!(affected, 0);
        assert_eq!(
            syncer.cursor_dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(),
            "500"
        );
    }

    #[tokio::test]
    async fn poison_record_skipped_page_still_merges() {
        let (syncer, _pool) = syncer_with_pool().await;
        let mut poison = feed("ignored", "bob", 100);
        poison.key_string = None;

        let affected = syncer
            .apply_feed_page(&[poison, feed("k1", "bob", 100)], 200)
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert!(syncer.dao.get_by_key("k1").await.unwrap().is_some());
        assert_eq!(
            syncer.cursor_dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(),
            "200"
        );
    }

    #[tokio::test]
    async fn reapplying_same_page_is_idempotent() {
        let (syncer, _pool) = syncer_with_pool().await;
        let page = vec![feed("k1", "bob", 100), feed("k2", "bob", 200)];

        syncer.apply_feed_page(&page, 300).await.unwrap();
        let snapshot1 = syncer.dao.all_messages_by_time().await.unwrap();

        // 模拟崩溃后重放同一页（游标没动过也一样）
        syncer.apply_feed_page(&page, 300).await.unwrap();
        let snapshot2 = syncer.dao.all_messages_by_time().await.unwrap();

        assert_eq!(snapshot1.len(), 2);
        assert_eq!(snapshot1.len(), snapshot2.len());
        let keys: Vec<_> = snapshot2.iter().filter_map(|m| m.key_string.clone()).collect();
        assert_eq!(keys, vec!["k1".to_string(), "k2".to_string()]);
    }

    #[tokio::test]
    async fn crash_between_merge_and_cursor_advance_is_safe() {
        let (syncer, _pool) = syncer_with_pool().await;
        let page = vec![feed("k1", "bob", 100)];

        // 合并完成但游标未推进（模拟崩溃点）
        for f in &page {
            syncer.dao.merge_feed(f).await.unwrap();
        }
        assert_eq!(
            syncer.cursor_dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(),
            "0"
        );

        // 重启后用旧游标重拉同一页，再拉新页，结果与一次成功无异
        syncer.apply_feed_page(&page, 150).await.unwrap();
        syncer
            .apply_feed_page(&[feed("k2", "bob", 200)], 250)
            .await
            .unwrap();

        let all = syncer.dao.all_messages_by_time().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            syncer.cursor_dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(),
            "250"
        );
    }

    #[tokio::test]
    async fn create_pending_message_enters_recents() {
        let (syncer, _pool) = syncer_with_pool().await;
        let msg = syncer
            .create_pending_message(MessageDraft {
                peer_user_id: Some("bob".to_string()),
                group_key: None,
                content: "发出".to_string(),
                content_type: 0,
                metadata: HashMap::new(),
            })
            .await
            .unwrap();

        assert_eq!(msg.status, status::PENDING);
        assert!(msg.key_string.is_some());

        let bob = ConversationKey::Peer("bob".to_string());
        let latest = syncer.tracker.latest_of(&bob).await.unwrap();
        assert_eq!(latest.key_string, msg.key_string);

        // 服务端回执沿同一 key 合并，状态推进到 SENT
        let mut echo = feed(msg.key_string.as_deref().unwrap(), "bob", msg.created_at_ms);
        echo.sent_by_me = Some(true);
        echo.status = Some(status::SENT);
        let merged = syncer.dao.merge_feed(&echo).await.unwrap();
        assert_eq!(merged.id, msg.id);
        assert_eq!(merged.status, status::SENT);
    }

    #[tokio::test]
    async fn delete_message_repairs_latest_pointer() {
        let (syncer, _pool) = syncer_with_pool().await;
        syncer
            .apply_feed_page(&[feed("k1", "bob", 100), feed("k2", "bob", 200)], 300)
            .await
            .unwrap();

        assert!(syncer.delete_message("k2").await.unwrap());

        let bob = ConversationKey::Peer("bob".to_string());
        let latest = syncer.tracker.latest_of(&bob).await.unwrap();
        assert_eq!(latest.key_string.as_deref(), Some("k1"));

        // 未知 key 返回 false
        assert!(!syncer.delete_message("missing").await.unwrap());
    }

    #[tokio::test]
    async fn delete_conversation_clears_store_and_recents() {
        let (syncer, _pool) = syncer_with_pool().await;
        syncer
            .apply_feed_page(&[feed("k1", "bob", 100), feed("k2", "carol", 150)], 200)
            .await
            .unwrap();

        let bob = ConversationKey::Peer("bob".to_string());
        assert_eq!(syncer.delete_conversation(&bob).await.unwrap(), 1);
        assert!(syncer.tracker.latest_of(&bob).await.is_none());
        assert_eq!(syncer.tracker.recents_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn metadata_page_advances_own_cursor() {
        let (syncer, _pool) = syncer_with_pool().await;
        syncer
            .apply_feed_page(&[feed("k1", "bob", 100)], 150)
            .await
            .unwrap();

        let update = MessageMetadataFeed {
            key_string: Some("k1".to_string()),
            metadata: HashMap::from([("seen".to_string(), "1".to_string())]),
            replace_metadata: false,
        };
        let affected = syncer.apply_metadata_page(&[update], 999).await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(
            syncer
                .cursor_dao
                .get(cursor_name::MESSAGE_METADATA_SYNC)
                .await
                .unwrap(),
            "999"
        );
        // 消息游标不受影响
        assert_eq!(
            syncer.cursor_dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(),
            "150"
        );
    }
}
