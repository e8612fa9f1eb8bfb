//! 会话跟踪服务层
//!
//! 持有最近会话列表的当前版本（纯 reducer 的不可变快照），消费合并层
//! 产出的消息更新它，并对外提供会话摘要视图。被拉黑用户的消息在这里
//! 被拦下，不会进入最近会话列表。

use crate::im::conversation::listener::{ConversationListener, EmptyConversationListener};
use crate::im::conversation::models::ConversationSummary;
use crate::im::conversation::recents::{ConversationKey, RecentList};
use crate::im::message::dao::MessageDao;
use crate::im::message::models::LocalMessage;
use crate::im::types::content_type;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 会话跟踪器
pub struct ConversationTracker {
    /// 最近会话列表的当前快照
    recents: RwLock<RecentList>,
    /// 当前被我拉黑的用户，消息到达时直接压制
    blocked: RwLock<HashSet<String>>,
    /// 会话监听器
    listener: Arc<dyn ConversationListener>,
}

impl ConversationTracker {
    /// 创建新的会话跟踪器（使用默认空监听器）
    pub fn new() -> Self {
        Self::with_listener(Arc::new(EmptyConversationListener))
    }

    /// 创建新的会话跟踪器（带自定义监听器）
    pub fn with_listener(listener: Arc<dyn ConversationListener>) -> Self {
        Self {
            recents: RwLock::new(RecentList::new()),
            blocked: RwLock::new(HashSet::new()),
            listener,
        }
    }

    /// 从本地消息库全量重建最近会话列表
    pub async fn rebuild_from_store(&self, dao: &MessageDao) -> Result<()> {
        let blocked = self.blocked.read().await.clone();
        let messages = dao
            .all_messages_by_time()
            .await?
            .into_iter()
            .filter(|m| !Self::is_suppressed(m, &blocked));
        let rebuilt = RecentList::rebuild(messages);
        info!("[ConvTrack] 重建最近会话列表，共 {} 个会话", rebuilt.len());
        *self.recents.write().await = rebuilt;
        Ok(())
    }

    /// 消费一条刚合并/新建的消息
    ///
    /// 返回 true 表示最近会话列表发生了变化。系统消息没有会话身份，
    /// 直接跳过；非系统消息缺身份属于上游 bug，报错而不是吞掉。
    pub async fn on_message_merged(&self, msg: &LocalMessage) -> Result<bool> {
        if msg.content_type == content_type::SYSTEM
            && msg.group_key.is_none()
            && msg.peer_user_id.is_none()
        {
            return Ok(false);
        }

        {
            let blocked = self.blocked.read().await;
            if Self::is_suppressed(msg, &blocked) {
                debug!(
                    "[ConvTrack] 压制被拉黑用户的消息: key={:?}",
                    msg.key_string
                );
                return Ok(false);
            }
        }

        let key = ConversationKey::of_message(msg)?;

        let (changed, was_present, snapshot) = {
            let mut recents = self.recents.write().await;
            let was_present = recents.latest(&key).is_some();
            let before = recents.latest(&key).map(|m| m.id);
            let next = recents.insert(msg.clone())?;
            let after = next.latest(&key).map(|m| m.id);
            let changed = before != after;
            *recents = next;
            (changed, was_present, recents.latest(&key).cloned())
        };

        if changed {
            if let Some(latest) = snapshot {
                let summary = ConversationSummary {
                    peer_user_id: key.peer_id().map(str::to_string),
                    group_key: match key {
                        ConversationKey::Group(g) => Some(g),
                        ConversationKey::Peer(_) => None,
                    },
                    latest_message: latest,
                    unread_count: 0,
                };
                let json = serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string());
                if was_present {
                    self.listener.on_conversation_changed(json).await;
                } else {
                    self.listener.on_new_conversation(json).await;
                }
            }
        }
        Ok(changed)
    }

    /// 会话整体删除
    pub async fn remove_conversation(&self, key: &ConversationKey) {
        {
            let mut recents = self.recents.write().await;
            *recents = recents.remove(key);
        }
        self.listener.on_conversation_removed(key.to_string()).await;
    }

    /// 修复某会话的最新指针（删除单条消息之后）
    ///
    /// `replacement` 为库里重新算出的最新消息；None 表示会话已空。
    pub async fn repair_latest(
        &self,
        key: &ConversationKey,
        replacement: Option<LocalMessage>,
    ) -> Result<()> {
        let mut recents = self.recents.write().await;
        let mut next = recents.remove(key);
        if let Some(msg) = replacement {
            next = next.insert(msg)?;
        }
        *recents = next;
        Ok(())
    }

    /// 整体替换拉黑名单（来自黑名单同步结果）
    pub async fn set_blocked_users(&self, user_ids: HashSet<String>) {
        info!("[ConvTrack] 更新压制名单，共 {} 个用户", user_ids.len());
        *self.blocked.write().await = user_ids;
    }

    /// 当前最近会话快照（最近活跃在前）
    pub async fn recents_snapshot(&self) -> Vec<LocalMessage> {
        self.recents.read().await.iter().cloned().collect()
    }

    /// 某会话当前缓存的最新消息
    pub async fn latest_of(&self, key: &ConversationKey) -> Option<LocalMessage> {
        self.recents.read().await.latest(key).cloned()
    }

    /// 组装会话摘要列表（最近活跃在前，分页）
    pub async fn summaries(
        &self,
        dao: &MessageDao,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let snapshot = self.recents_snapshot().await;
        let mut result = Vec::new();
        for msg in snapshot.into_iter().skip(offset).take(count) {
            let key = ConversationKey::of_message(&msg)?;
            let unread = dao.unread_count_for(&key).await?;
            result.push(ConversationSummary {
                peer_user_id: key.peer_id().map(str::to_string),
                group_key: match key {
                    ConversationKey::Group(g) => Some(g),
                    ConversationKey::Peer(_) => None,
                },
                latest_message: msg,
                unread_count: unread,
            });
        }
        Ok(result)
    }

    /// 推送总未读数回调
    pub async fn notify_total_unread(&self, dao: &MessageDao) -> Result<()> {
        let total = dao.total_unread_count().await?;
        self.listener
            .on_total_unread_message_count_changed(total)
            .await;
        Ok(())
    }

    /// 输入状态透传（来自传输层信令，不落库）
    pub async fn on_typing_status(&self, typing_json: String) {
        self.listener.on_typing_status_changed(typing_json).await;
    }

    fn is_suppressed(msg: &LocalMessage, blocked: &HashSet<String>) -> bool {
        if let Some(ref sender) = msg.sender_id {
            if !msg.sent_by_me && blocked.contains(sender) {
                return true;
            }
        }
        if let Some(ref peer) = msg.peer_user_id {
            if !msg.sent_by_me && msg.group_key.is_none() && blocked.contains(peer) {
                return true;
            }
        }
        false
    }
}

impl Default for ConversationTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::db::connect_memory_pool;
    use crate::im::message::models::MessageFeed;

    fn msg(key: &str, peer: &str, ts: i64) -> LocalMessage {
        LocalMessage {
            id: 0,
            key_string: Some(key.to_string()),
            peer_user_id: Some(peer.to_string()),
            group_key: None,
            sender_id: Some(peer.to_string()),
            sent_by_me: false,
            created_at_ms: ts,
            content: "hi".to_string(),
            content_type: 0,
            status: 0,
            metadata: Default::default(),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn merged_message_appears_in_recents() {
        let tracker = ConversationTracker::new();
        assert!(tracker.on_message_merged(&msg("k1", "bob", 100)).await.unwrap());

        let snapshot = tracker.recents_snapshot().await;
        assert_eq!(snapshot.len(), 1);

        // 过期消息不改变快照
        assert!(!tracker.on_message_merged(&msg("k0", "bob", 50)).await.unwrap());
        let latest = tracker
            .latest_of(&ConversationKey::Peer("bob".to_string()))
            .await
            .unwrap();
        assert_eq!(latest.key_string.as_deref(), Some("k1"));
    }

    #[tokio::test]
    async fn blocked_sender_is_suppressed() {
        let tracker = ConversationTracker::new();
        tracker
            .set_blocked_users(HashSet::from(["mallory".to_string()]))
            .await;

        assert!(!tracker
            .on_message_merged(&msg("k1", "mallory", 100))
            .await
            .unwrap());
        assert!(tracker.recents_snapshot().await.is_empty());

        // 其他人不受影响
        assert!(tracker.on_message_merged(&msg("k2", "bob", 100)).await.unwrap());
    }

    #[tokio::test]
    async fn own_message_to_blocked_peer_still_surfaces() {
        // 拉黑只压制对方来的消息，自己发出去的还要显示
        let tracker = ConversationTracker::new();
        tracker
            .set_blocked_users(HashSet::from(["mallory".to_string()]))
            .await;

        let mut mine = msg("k1", "mallory", 100);
        mine.sent_by_me = true;
        mine.sender_id = None;
        assert!(tracker.on_message_merged(&mine).await.unwrap());
    }

    #[tokio::test]
    async fn repair_latest_after_delete() {
        let pool = connect_memory_pool().await;
        MessageDao::init_db_with_connection(&pool).await.unwrap();
        let dao = MessageDao::new(pool);

        let feed = |key: &str, ts: i64| MessageFeed {
            key_string: Some(key.to_string()),
            peer_user_id: Some("bob".to_string()),
            group_key: None,
            sender_id: Some("bob".to_string()),
            sent_by_me: Some(false),
            created_at_ms: ts,
            content: Some("hi".to_string()),
            content_type: Some(0),
            status: None,
            metadata: None,
            replace_metadata: false,
            attachment: None,
        };

        let tracker = ConversationTracker::new();
        for (k, ts) in [("k1", 100), ("k2", 200)] {
            let merged = dao.merge_feed(&feed(k, ts)).await.unwrap();
            tracker.on_message_merged(&merged).await.unwrap();
        }

        let bob = ConversationKey::Peer("bob".to_string());
        assert_eq!(
            tracker.latest_of(&bob).await.unwrap().key_string.as_deref(),
            Some("k2")
        );

        // 删除当前最新的 k2 后，最新指针应退回 k1
        dao.delete_by_key("k2").await.unwrap();
        let replacement = dao.latest_for_conversation(&bob).await.unwrap();
        tracker.repair_latest(&bob, replacement).await.unwrap();
        assert_eq!(
            tracker.latest_of(&bob).await.unwrap().key_string.as_deref(),
            Some("k1")
        );

        // 会话清空后条目消失
        dao.delete_conversation(&bob).await.unwrap();
        let replacement = dao.latest_for_conversation(&bob).await.unwrap();
        tracker.repair_latest(&bob, replacement).await.unwrap();
        assert!(tracker.latest_of(&bob).await.is_none());
    }

    #[tokio::test]
    async fn rebuild_skips_blocked_users() {
        let pool = connect_memory_pool().await;
        MessageDao::init_db_with_connection(&pool).await.unwrap();
        let dao = MessageDao::new(pool);

        for (k, peer, ts) in [("k1", "bob", 100), ("k2", "mallory", 200)] {
            dao.merge_feed(&MessageFeed {
                key_string: Some(k.to_string()),
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
            })
            .await
            .unwrap();
        }

        let tracker = ConversationTracker::new();
        tracker
            .set_blocked_users(HashSet::from(["mallory".to_string()]))
            .await;
        tracker.rebuild_from_store(&dao).await.unwrap();

        let snapshot = tracker.recents_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].peer_user_id.as_deref(), Some("bob"));
    }
}
