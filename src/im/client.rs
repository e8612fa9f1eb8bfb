//! 客户端核心实现模块
//!
//! `KuaixinClient` 是会话级上下文：独占持有连接池、游标 DAO、各实体
//! 同步器与会话跟踪器，全部显式传递、不走全局单例，测试之间互不污染。
//! 传输层（MQTT 等）的连接管理在 SDK 之外，这里只消费它递进来的
//! "数据有变化"信号和输入/在线状态事件。

use crate::im::channel::dao::ChannelDao;
use crate::im::channel::listener::{ChannelListener, EmptyChannelListener};
use crate::im::channel::models::{LocalChannel, LocalChannelMember};
use crate::im::channel::service::{ChannelSyncer, ChannelSyncerConfig};
use crate::im::conversation::listener::{ConversationListener, EmptyConversationListener};
use crate::im::conversation::models::ConversationSummary;
use crate::im::conversation::recents::ConversationKey;
use crate::im::conversation::service::ConversationTracker;
use crate::im::cursor::dao::CursorDao;
use crate::im::db::create_sqlite_pool;
use crate::im::message::dao::MessageDao;
use crate::im::message::listener::{EmptyMessageListener, MessageListener};
use crate::im::message::models::LocalMessage;
use crate::im::message::service::{MessageDraft, MessageSyncer, MessageSyncerConfig};
use crate::im::sync::listener::{EmptySyncListener, SyncListener};
use crate::im::sync::orchestrator::{SyncEntityType, SyncOptions, SyncOrchestrator, SyncReport};
use crate::im::user::dao::UserDao;
use crate::im::user::listener::{ContactListener, EmptyContactListener};
use crate::im::user::models::LocalUserDetail;
use crate::im::user::service::{UserSyncer, UserSyncerConfig};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 用户 ID
    pub user_id: String,
    /// 认证 token
    pub token: String,
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// 本地 SQLite 数据库 URL
    ///
    /// 例如：`sqlite://kuaixin.db?mode=rwc`
    pub db_url: String,
    /// 分页拉取的每页条数
    pub page_size: i64,
    /// 软删除处理策略：true 时墓碑记录物理删除本地行
    pub skip_soft_deleted: bool,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(user_id: String, token: String) -> Self {
        Self {
            user_id,
            token,
            api_base_url: "http://localhost:10002".to_string(),
            db_url: "sqlite://kuaixin.db?mode=rwc".to_string(),
            page_size: 100,
            skip_soft_deleted: false,
        }
    }
}

/// 各层监听器集合，缺省全部为空实现
pub struct ClientListeners {
    pub message: Arc<dyn MessageListener>,
    pub conversation: Arc<dyn ConversationListener>,
    pub channel: Arc<dyn ChannelListener>,
    pub contact: Arc<dyn ContactListener>,
    pub sync: Arc<dyn SyncListener>,
}

impl Default for ClientListeners {
    fn default() -> Self {
        Self {
            message: Arc::new(EmptyMessageListener),
            conversation: Arc::new(EmptyConversationListener),
            channel: Arc::new(EmptyChannelListener),
            contact: Arc::new(EmptyContactListener),
            sync: Arc::new(EmptySyncListener),
        }
    }
}

/// 传输层信号（MQTT 或等价物递进来的事件）
///
/// DataChanged 只是触发器，不携带可以绕过拉取/合并管线的数据。
#[derive(Debug, Clone)]
pub enum TransportSignal {
    /// 服务端提示某实体类型有新数据
    DataChanged { entity: SyncEntityType },
    /// 对端输入状态
    Typing {
        peer_user_id: String,
        group_key: Option<i64>,
        active: bool,
    },
    /// 用户在线状态
    Presence {
        user_id: String,
        connected: bool,
        last_seen_at_ms: i64,
    },
}

/// Kuaixin 客户端
pub struct KuaixinClient {
    config: ClientConfig,
    cursor_dao: Arc<CursorDao>,
    message_dao: Arc<MessageDao>,
    channel_dao: Arc<ChannelDao>,
    user_dao: Arc<UserDao>,
    tracker: Arc<ConversationTracker>,
    message_syncer: Arc<MessageSyncer>,
    channel_syncer: Arc<ChannelSyncer>,
    user_syncer: Arc<UserSyncer>,
    orchestrator: Arc<SyncOrchestrator>,
    contact_listener: Arc<dyn ContactListener>,
}

impl KuaixinClient {
    /// 连接本地存储并组装同步管线（使用默认空监听器）
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with_listeners(config, ClientListeners::default()).await
    }

    /// 连接本地存储并组装同步管线（带自定义监听器）
    pub async fn connect_with_listeners(
        config: ClientConfig,
        listeners: ClientListeners,
    ) -> Result<Self> {
        info!(
            "[Client] 创建客户端，用户ID: {}, SQLite数据库: {}",
            config.user_id, config.db_url
        );
        let pool = create_sqlite_pool(&config.db_url)
            .await
            .context(format!("连接SQLite数据库失败: {}", config.db_url))?;

        // 初始化数据库表结构
        info!("[Client] 📋 初始化数据库表结构");
        MessageDao::init_db_with_connection(&pool).await?;
        ChannelDao::init_db_with_connection(&pool).await?;
        UserDao::init_db_with_connection(&pool).await?;
        CursorDao::init_db_with_connection(&pool).await?;

        // 创建带认证拦截器的 HTTP 客户端（token 通过 default_headers 自动添加）
        let http_client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("token"),
                    reqwest::header::HeaderValue::from_str(&config.token)
                        .context("无效的 token")?,
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")?;

        let cursor_dao = Arc::new(CursorDao::new(pool.clone(), config.user_id.clone()));
        let message_dao = Arc::new(MessageDao::new(pool.clone()));
        let channel_dao = Arc::new(ChannelDao::new(pool.clone()));
        let user_dao = Arc::new(UserDao::new(pool.clone()));
        let tracker = Arc::new(ConversationTracker::with_listener(listeners.conversation));

        let message_syncer = Arc::new(MessageSyncer::with_listener(
            MessageSyncerConfig {
                user_id: config.user_id.clone(),
                api_base_url: config.api_base_url.clone(),
                page_size: config.page_size,
            },
            http_client.clone(),
            message_dao.clone(),
            cursor_dao.clone(),
            tracker.clone(),
            listeners.message,
        ));
        let channel_syncer = Arc::new(ChannelSyncer::with_listener(
            ChannelSyncerConfig {
                user_id: config.user_id.clone(),
                api_base_url: config.api_base_url.clone(),
                skip_soft_deleted: config.skip_soft_deleted,
            },
            http_client.clone(),
            channel_dao.clone(),
            cursor_dao.clone(),
            listeners.channel,
        ));
        let user_syncer = Arc::new(UserSyncer::with_listener(
            UserSyncerConfig {
                user_id: config.user_id.clone(),
                api_base_url: config.api_base_url.clone(),
                page_size: config.page_size,
                skip_soft_deleted: config.skip_soft_deleted,
            },
            http_client,
            user_dao.clone(),
            cursor_dao.clone(),
            tracker.clone(),
            listeners.contact.clone(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::with_listener(
            message_syncer.clone(),
            channel_syncer.clone(),
            user_syncer.clone(),
            cursor_dao.clone(),
            listeners.sync,
        ));

        let client = Self {
            config,
            cursor_dao,
            message_dao,
            channel_dao,
            user_dao,
            tracker,
            message_syncer,
            channel_syncer,
            user_syncer,
            orchestrator,
            contact_listener: listeners.contact,
        };

        // 恢复内存态：压制名单 + 最近会话列表
        let blocked: HashSet<String> = client
            .user_dao
            .get_blocked_user_ids()
            .await?
            .into_iter()
            .collect();
        client.tracker.set_blocked_users(blocked).await;
        client.tracker.rebuild_from_store(&client.message_dao).await?;

        Ok(client)
    }

    /// 登录后引导：全量同步所有实体类型，完成前不信任增量游标
    pub async fn bootstrap_after_login(&self) -> Vec<SyncReport> {
        info!("[Client] 🚀 登录引导：全量同步所有实体类型");
        let reports = self
            .orchestrator
            .sync_all(SyncOptions { full: true })
            .await;
        if let Err(e) = self.tracker.rebuild_from_store(&self.message_dao).await {
            warn!("[Client] 登录引导后重建最近会话列表失败: {:?}", e);
        }
        reports
    }

    /// 登出边界：游标全部归零，同步来源的本地数据整体清空
    pub async fn logout(&self) -> Result<()> {
        info!("[Client] 👋 登出，清空本地同步数据");
        self.cursor_dao.reset_all().await?;
        self.message_dao.clear_all().await?;
        self.channel_dao.clear_all().await?;
        self.user_dao.clear_all().await?;
        self.tracker.set_blocked_users(HashSet::new()).await;
        self.tracker.rebuild_from_store(&self.message_dao).await?;
        Ok(())
    }

    /// 消费一条传输层信号
    pub async fn handle_transport_signal(&self, signal: TransportSignal) -> Result<()> {
        match signal {
            TransportSignal::DataChanged { entity } => {
                // 信号只是触发器，数据一律走拉取/合并管线
                let report = self.orchestrator.sync(entity, SyncOptions::default()).await;
                if !report.success {
                    warn!(
                        "[Client] 信号触发的 {} 同步失败: {:?}",
                        entity, report.error
                    );
                }
            }
            TransportSignal::Typing {
                peer_user_id,
                group_key,
                active,
            } => {
                let json = serde_json::json!({
                    "peerUserID": peer_user_id,
                    "groupKey": group_key,
                    "active": active,
                })
                .to_string();
                self.tracker.on_typing_status(json).await;
            }
            TransportSignal::Presence {
                user_id,
                connected,
                last_seen_at_ms,
            } => {
                self.user_dao
                    .update_presence(&user_id, connected, last_seen_at_ms)
                    .await?;
                let json = serde_json::json!({
                    "userID": user_id,
                    "connected": connected,
                    "lastSeenAt": last_seen_at_ms,
                })
                .to_string();
                self.contact_listener.on_presence_changed(json).await;
            }
        }
        Ok(())
    }

    /// 手动触发一次同步（下拉刷新、定时任务等）
    pub async fn sync(&self, entity: SyncEntityType, options: SyncOptions) -> SyncReport {
        self.orchestrator.sync(entity, options).await
    }

    /// 手动触发全部实体类型的同步
    pub async fn sync_all(&self, options: SyncOptions) -> Vec<SyncReport> {
        self.orchestrator.sync_all(options).await
    }

    // ========== 本地读取接口 ==========

    /// 会话摘要列表（最近活跃在前，分页）
    pub async fn get_conversation_summaries(
        &self,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ConversationSummary>> {
        self.tracker
            .summaries(&self.message_dao, offset, count)
            .await
    }

    /// 会话消息列表（时间倒序分页）
    pub async fn get_conversation_messages(
        &self,
        key: &ConversationKey,
        offset: i64,
        count: i64,
    ) -> Result<Vec<LocalMessage>> {
        self.message_dao
            .get_conversation_messages(key, offset, count)
            .await
    }

    /// 总未读消息数
    pub async fn get_total_unread_count(&self) -> Result<i64> {
        self.message_dao.total_unread_count().await
    }

    /// 活跃联系人列表（排除墓碑）
    pub async fn get_active_contacts(&self) -> Result<Vec<LocalUserDetail>> {
        self.user_syncer.get_active_contacts().await
    }

    /// 按用户 ID 解析（墓碑行也返回，历史消息归属用）
    pub async fn get_user(&self, user_id: &str) -> Result<Option<LocalUserDetail>> {
        self.user_dao.get_by_id(user_id).await
    }

    /// 活跃频道列表
    pub async fn get_active_channels(&self) -> Result<Vec<LocalChannel>> {
        self.channel_syncer.get_active_channels().await
    }

    /// 按客户端群组 ID 查询本地频道（创建-或-获取幂等入口）
    pub async fn get_channel_by_client_group_id(
        &self,
        client_group_id: &str,
    ) -> Result<Option<LocalChannel>> {
        self.channel_syncer
            .get_by_client_group_id(client_group_id)
            .await
    }

    /// 频道成员列表
    pub async fn get_channel_members(&self, channel_key: i64) -> Result<Vec<LocalChannelMember>> {
        self.channel_dao.get_members(channel_key).await
    }

    // ========== 本地写入接口 ==========

    /// 新建待发送消息（PENDING 状态，本地 key 占位）
    pub async fn create_pending_message(&self, draft: MessageDraft) -> Result<LocalMessage> {
        self.message_syncer.create_pending_message(draft).await
    }

    /// 标记会话为已读
    pub async fn mark_conversation_read(&self, key: &ConversationKey) -> Result<u64> {
        self.message_syncer.mark_conversation_read(key).await
    }

    /// 删除整个会话
    pub async fn delete_conversation(&self, key: &ConversationKey) -> Result<u64> {
        self.message_syncer.delete_conversation(key).await
    }

    /// 删除单条消息（对所有人删除）
    pub async fn delete_message(&self, message_key: &str) -> Result<bool> {
        self.message_syncer.delete_message(message_key).await
    }

    /// 本地发起的拉黑/解除拉黑
    ///
    /// 与在飞的黑名单同步共用同键串行化，不会互相覆盖；压制名单
    /// 立即更新，后续消息马上生效。
    pub async fn block_user(&self, user_id: &str, blocked: bool) -> Result<()> {
        self.user_dao
            .set_block_status(user_id, Some(blocked), None)
            .await?;
        let blocked_ids: HashSet<String> = self
            .user_dao
            .get_blocked_user_ids()
            .await?
            .into_iter()
            .collect();
        self.tracker.set_blocked_users(blocked_ids).await;
        Ok(())
    }

    /// 当前配置
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::message::models::MessageFeed;
    use crate::im::types::cursor_name;

    async fn client(dir: &tempfile::TempDir) -> KuaixinClient {
        let db_path = dir.path().join("kuaixin-test.db");
        let config = ClientConfig {
            user_id: "me".to_string(),
            token: "test-token".to_string(),
            api_base_url: "http://127.0.0.1:1".to_string(),
            db_url: format!("sqlite://{}?mode=rwc", db_path.display()),
            page_size: 50,
            skip_soft_deleted: false,
        };
        KuaixinClient::connect(config).await.unwrap()
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
    async fn logout_resets_cursors_and_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        client
            .message_syncer
            .apply_feed_page(&[feed("k1", "bob", 100)], 500)
            .await
            .unwrap();
        assert_eq!(
            client.cursor_dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(),
            "500"
        );
        assert_eq!(client.get_conversation_summaries(0, 10).await.unwrap().len(), 1);

        client.logout().await.unwrap();
        assert_eq!(
            client.cursor_dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(),
            "0"
        );
        assert!(client.get_conversation_summaries(0, 10).await.unwrap().is_empty());
        assert_eq!(client.get_total_unread_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recents_survive_reconnect_via_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        {
            let client = client(&dir).await;
            client
                .message_syncer
                .apply_feed_page(&[feed("k1", "bob", 100), feed("k2", "carol", 200)], 300)
                .await
                .unwrap();
        }

        // 重新连接（模拟进程重启），最近会话列表从库里重建
        let client = client(&dir).await;
        let summaries = client.get_conversation_summaries(0, 10).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].peer_user_id.as_deref(), Some("carol"));
        assert_eq!(
            client.cursor_dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(),
            "300"
        );
    }

    #[tokio::test]
    async fn local_block_takes_effect_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        client.block_user("mallory", true).await.unwrap();
        client
            .message_syncer
            .apply_feed_page(&[feed("k1", "mallory", 100)], 200)
            .await
            .unwrap();

        // 消息落库了（历史可查）但不出现在最近会话里
        assert!(client.get_conversation_summaries(0, 10).await.unwrap().is_empty());
        assert!(client
            .message_dao
            .get_by_key("k1")
            .await
            .unwrap()
            .is_some());

        client.block_user("mallory", false).await.unwrap();
        client
            .message_syncer
            .apply_feed_page(&[feed("k2", "mallory", 300)], 400)
            .await
            .unwrap();
        assert_eq!(client.get_conversation_summaries(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn presence_signal_updates_user_row() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        client
            .handle_transport_signal(TransportSignal::Presence {
                user_id: "bob".to_string(),
                connected: true,
                last_seen_at_ms: 123,
            })
            .await
            .unwrap();

        let bob = client.get_user("bob").await.unwrap().unwrap();
        assert!(bob.connected);
        assert_eq!(bob.last_seen_at_ms, 123);
    }

    #[tokio::test]
    async fn typing_signal_is_passthrough_only() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        client
            .handle_transport_signal(TransportSignal::Typing {
                peer_user_id: "bob".to_string(),
                group_key: None,
                active: true,
            })
            .await
            .unwrap();

        // 不产生任何落库痕迹
        assert!(client.get_user("bob").await.unwrap().is_none());
        assert!(client.get_conversation_summaries(0, 10).await.unwrap().is_empty());
    }
}
