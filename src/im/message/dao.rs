//! 消息数据访问层（DAO）
//!
//! 负责所有消息相关的数据库操作，将数据访问逻辑与业务逻辑分离。
//! 合并走"读取-合并-写回"，同一消息 key 的合并由 KeyLocks 串行化，
//! 不同 key 并发执行互不影响。

use crate::im::conversation::recents::ConversationKey;
use crate::im::db::KeyLocks;
use crate::im::message::models::{
    apply_metadata_update, merge_message, AttachmentInfo, LocalMessage, MessageFeed,
    MessageMetadataFeed,
};
use crate::im::serialization::{metadata_from_json, metadata_to_json};
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, warn};

/// 消息 DAO（基于 sqlx）
pub struct MessageDao {
    db: Pool<Sqlite>,
    locks: KeyLocks,
}

impl MessageDao {
    /// 创建新的消息 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            locks: KeyLocks::new(),
        }
    }

    /// 使用共享连接初始化数据库表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS local_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key_string TEXT UNIQUE,
                peer_user_id TEXT,
                group_key INTEGER,
                sender_id TEXT,
                sent_by_me INTEGER NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL DEFAULT 0,
                content TEXT NOT NULL DEFAULT '',
                content_type INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                attachment TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_local_messages_peer
                ON local_messages(peer_user_id, created_at_ms);
            CREATE INDEX IF NOT EXISTS idx_local_messages_group
                ON local_messages(group_key, created_at_ms);
            CREATE INDEX IF NOT EXISTS idx_local_messages_status
                ON local_messages(status);
        "#;
        sqlx::query(sql)
            .execute(db)
            .await
            .context("创建消息表失败")?;
        Ok(())
    }

    /// 合并一条服务端 feed 记录，返回合并后的本地消息
    ///
    /// 缺 key 的记录属于脏数据，调用方应提前跳过；这里再兜底报错。
    pub async fn merge_feed(&self, feed: &MessageFeed) -> Result<LocalMessage> {
        let key = feed
            .key_string
            .clone()
            .context("消息 feed 记录缺少 key，无法合并")?;

        let _guard = self.locks.lock(&key).await;
        let existing = self.get_by_key(&key).await?;
        let mut merged = merge_message(existing.as_ref(), feed);
        merged.id = self.write_message(existing.as_ref(), &merged).await?;
        Ok(merged)
    }

    /// 插入或更新一条本地消息（本地新建 PENDING 消息等场景）
    pub async fn upsert_message(&self, msg: &LocalMessage) -> Result<LocalMessage> {
        let key = msg
            .key_string
            .clone()
            .context("本地消息缺少 key，无法落库")?;
        let _guard = self.locks.lock(&key).await;
        let existing = self.get_by_key(&key).await?;
        let mut stored = msg.clone();
        stored.id = self.write_message(existing.as_ref(), msg).await?;
        Ok(stored)
    }

    /// 应用一条元数据更新记录；本地不存在该消息时返回 None
    pub async fn merge_metadata_update(
        &self,
        update: &MessageMetadataFeed,
    ) -> Result<Option<LocalMessage>> {
        let key = update
            .key_string
            .clone()
            .context("元数据更新记录缺少 key，无法合并")?;

        let _guard = self.locks.lock(&key).await;
        let Some(mut local) = self.get_by_key(&key).await? else {
            warn!("[MsgDAO] 元数据更新指向本地不存在的消息: {}", key);
            return Ok(None);
        };
        apply_metadata_update(&mut local, update);
        sqlx::query(
            r#"
            UPDATE local_messages SET metadata = ? WHERE key_string = ?
            "#,
        )
        .bind(metadata_to_json(&local.metadata))
        .bind(&key)
        .execute(&self.db)
        .await
        .context("更新消息元数据失败")?;
        Ok(Some(local))
    }

    /// 按服务端 key 查询消息
    pub async fn get_by_key(&self, key: &str) -> Result<Option<LocalMessage>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM local_messages WHERE key_string = ? LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .context("按 key 查询消息失败")?;
        Ok(row.map(Self::row_to_message))
    }

    /// 查询会话消息（时间倒序分页）
    pub async fn get_conversation_messages(
        &self,
        key: &ConversationKey,
        offset: i64,
        count: i64,
    ) -> Result<Vec<LocalMessage>> {
        let (clause, peer, group) = Self::conversation_clause(key);
        let sql = format!(
            "SELECT * FROM local_messages WHERE {clause} \
             ORDER BY created_at_ms DESC LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query(&sql);
        if let Some(peer) = peer {
            query = query.bind(peer);
        }
        if let Some(group) = group {
            query = query.bind(group);
        }
        let rows = query
            .bind(count)
            .bind(offset)
            .fetch_all(&self.db)
            .await
            .context("查询会话消息失败")?;
        Ok(rows.into_iter().map(Self::row_to_message).collect())
    }

    /// 查询会话当前时间戳最大的消息（删除后修复最新指针用）
    pub async fn latest_for_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<LocalMessage>> {
        Ok(self.get_conversation_messages(key, 0, 1).await?.pop())
    }

    /// 每个会话各取最新一条（重建最近会话列表用）
    ///
    /// 按时间升序整体捞出后交给纯 reducer 归并，归并逻辑只有一份。
    pub async fn all_messages_by_time(&self) -> Result<Vec<LocalMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM local_messages ORDER BY created_at_ms ASC, id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("查询全量消息失败")?;
        Ok(rows.into_iter().map(Self::row_to_message).collect())
    }

    /// 会话未读数（status = UNREAD 的接收消息）
    pub async fn unread_count_for(&self, key: &ConversationKey) -> Result<i64> {
        let (clause, peer, group) = Self::conversation_clause(key);
        let sql = format!(
            "SELECT COUNT(*) AS total FROM local_messages WHERE {clause} AND status = 0"
        );
        let mut query = sqlx::query(&sql);
        if let Some(peer) = peer {
            query = query.bind(peer);
        }
        if let Some(group) = group {
            query = query.bind(group);
        }
        let row = query
            .fetch_one(&self.db)
            .await
            .context("查询会话未读数失败")?;
        Ok(row.get::<i64, _>("total"))
    }

    /// 总未读数
    pub async fn total_unread_count(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM local_messages WHERE status = 0
            "#,
        )
        .fetch_one(&self.db)
        .await
        .context("查询总未读数失败")?;
        Ok(row.get::<i64, _>("total"))
    }

    /// 把会话内全部未读消息推进到已读（状态只前进，发出的消息不受影响）
    pub async fn mark_conversation_read(&self, key: &ConversationKey) -> Result<u64> {
        let (clause, peer, group) = Self::conversation_clause(key);
        let sql = format!("UPDATE local_messages SET status = 1 WHERE {clause} AND status = 0");
        let mut query = sqlx::query(&sql);
        if let Some(peer) = peer {
            query = query.bind(peer);
        }
        if let Some(group) = group {
            query = query.bind(group);
        }
        let res = query
            .execute(&self.db)
            .await
            .context("标记会话已读失败")?;
        Ok(res.rows_affected())
    }

    /// 删除整个会话的消息
    pub async fn delete_conversation(&self, key: &ConversationKey) -> Result<u64> {
        let (clause, peer, group) = Self::conversation_clause(key);
        let sql = format!("DELETE FROM local_messages WHERE {clause}");
        let mut query = sqlx::query(&sql);
        if let Some(peer) = peer {
            query = query.bind(peer);
        }
        if let Some(group) = group {
            query = query.bind(group);
        }
        let res = query
            .execute(&self.db)
            .await
            .context("删除会话消息失败")?;
        debug!("[MsgDAO] 删除会话 {} 的 {} 条消息", key, res.rows_affected());
        Ok(res.rows_affected())
    }

    /// 按服务端 key 删除单条消息（"对所有人删除"）
    pub async fn delete_by_key(&self, key: &str) -> Result<bool> {
        let res = sqlx::query(
            r#"
            DELETE FROM local_messages WHERE key_string = ?
            "#,
        )
        .bind(key)
        .execute(&self.db)
        .await
        .context("删除消息失败")?;
        Ok(res.rows_affected() > 0)
    }

    /// 清空消息表（登出边界）
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_messages")
            .execute(&self.db)
            .await
            .context("清空消息表失败")?;
        Ok(())
    }

    /// 会话过滤子句与绑定值
    ///
    /// 单聊必须排除群聊行（peer_user_id 在群消息里也可能出现，归桶以
    /// group_key 优先）。
    fn conversation_clause(key: &ConversationKey) -> (&'static str, Option<String>, Option<i64>) {
        match key {
            ConversationKey::Peer(peer) => (
                "peer_user_id = ? AND group_key IS NULL",
                Some(peer.clone()),
                None,
            ),
            ConversationKey::Group(group) => ("group_key = ?", None, Some(*group)),
        }
    }

    /// 插入或更新一行，返回行 ID；同 key 串行化由调用方持锁保证
    async fn write_message(
        &self,
        existing: Option<&LocalMessage>,
        msg: &LocalMessage,
    ) -> Result<i64> {
        let attachment_json = msg
            .attachment
            .as_ref()
            .map(|a| serde_json::to_string(a).unwrap_or_default());

        if let Some(existing) = existing {
            sqlx::query(
                r#"
                UPDATE local_messages SET
                    peer_user_id = ?,
                    group_key = ?,
                    sender_id = ?,
                    sent_by_me = ?,
                    created_at_ms = ?,
                    content = ?,
                    content_type = ?,
                    status = ?,
                    metadata = ?,
                    attachment = ?
                WHERE id = ?
                "#,
            )
            .bind(&msg.peer_user_id)
            .bind(msg.group_key)
            .bind(&msg.sender_id)
            .bind(if msg.sent_by_me { 1 } else { 0 })
            .bind(msg.created_at_ms)
            .bind(&msg.content)
            .bind(msg.content_type)
            .bind(msg.status)
            .bind(metadata_to_json(&msg.metadata))
            .bind(attachment_json)
            .bind(existing.id)
            .execute(&self.db)
            .await
            .context("更新消息失败")?;
            Ok(existing.id)
        } else {
            let res = sqlx::query(
                r#"
                INSERT INTO local_messages (
                    key_string, peer_user_id, group_key, sender_id, sent_by_me,
                    created_at_ms, content, content_type, status, metadata, attachment
                ) VALUES (?,?,?,?,?,?,?,?,?,?,?)
                "#,
            )
            .bind(&msg.key_string)
            .bind(&msg.peer_user_id)
            .bind(msg.group_key)
            .bind(&msg.sender_id)
            .bind(if msg.sent_by_me { 1 } else { 0 })
            .bind(msg.created_at_ms)
            .bind(&msg.content)
            .bind(msg.content_type)
            .bind(msg.status)
            .bind(metadata_to_json(&msg.metadata))
            .bind(attachment_json)
            .execute(&self.db)
            .await
            .context("插入消息失败")?;
            Ok(res.last_insert_rowid())
        }
    }

    fn row_to_message(row: sqlx::sqlite::SqliteRow) -> LocalMessage {
        let sent_by_me: i64 = row.get("sent_by_me");
        let metadata_raw: String = row.get("metadata");
        let attachment_raw: Option<String> = row.get("attachment");
        LocalMessage {
            id: row.get("id"),
            key_string: row.get("key_string"),
            peer_user_id: row.get("peer_user_id"),
            group_key: row.get("group_key"),
            sender_id: row.get("sender_id"),
            sent_by_me: sent_by_me != 0,
            created_at_ms: row.get("created_at_ms"),
            content: row.get("content"),
            content_type: row.get("content_type"),
            status: row.get("status"),
            metadata: metadata_from_json(&metadata_raw),
            attachment: attachment_raw
                .and_then(|raw| serde_json::from_str::<AttachmentInfo>(&raw).ok()),
        }
    }
}
