//! 频道数据访问层（DAO）
//!
//! 负责频道与成员角色的数据库操作。频道合并走"读取-合并-写回"并按
//! channel_key 串行化；成员角色 upsert 是单条 SQL，COALESCE 保证
//! null 角色不覆盖已知角色。

use crate::im::channel::models::{
    merge_channel, ChannelFeed, ChannelMemberFeed, LocalChannel, LocalChannelMember,
};
use crate::im::db::KeyLocks;
use crate::im::serialization::{metadata_from_json, metadata_to_json};
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// 频道 DAO（基于 sqlx）
pub struct ChannelDao {
    db: Pool<Sqlite>,
    locks: KeyLocks,
}

impl ChannelDao {
    /// 创建新的频道 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            locks: KeyLocks::new(),
        }
    }

    /// 使用共享连接初始化数据库表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS local_channels (
                channel_key INTEGER PRIMARY KEY,
                client_group_id TEXT UNIQUE,
                name TEXT,
                admin_id TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                parent_key INTEGER,
                deleted_at_ms INTEGER
            );
            CREATE TABLE IF NOT EXISTS local_channel_members (
                channel_key INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                role INTEGER,
                PRIMARY KEY (channel_key, user_id)
            );
        "#;
        sqlx::query(sql)
            .execute(db)
            .await
            .context("创建频道表失败")?;
        Ok(())
    }

    /// 合并一条频道 feed 记录（含成员角色子记录），返回合并后的本地频道
    pub async fn merge_feed(&self, feed: &ChannelFeed) -> Result<LocalChannel> {
        let key = feed
            .channel_key
            .context("频道 feed 记录缺少 channelKey，无法合并")?;

        let _guard = self.locks.lock(&format!("chan:{key}")).await;
        let existing = self.get_by_key(key).await?;
        let merged = merge_channel(existing.as_ref(), feed);
        self.write_channel(&merged).await?;

        for member in &feed.members {
            self.upsert_member(key, member).await?;
        }
        Ok(merged)
    }

    /// 按主键查询频道（含墓碑行）
    pub async fn get_by_key(&self, channel_key: i64) -> Result<Option<LocalChannel>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM local_channels WHERE channel_key = ? LIMIT 1
            "#,
        )
        .bind(channel_key)
        .fetch_optional(&self.db)
        .await
        .context("按 key 查询频道失败")?;
        Ok(row.map(Self::row_to_channel))
    }

    /// 按客户端群组 ID 查询频道（创建-或-获取幂等用）
    pub async fn get_by_client_group_id(
        &self,
        client_group_id: &str,
    ) -> Result<Option<LocalChannel>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM local_channels WHERE client_group_id = ? LIMIT 1
            "#,
        )
        .bind(client_group_id)
        .fetch_optional(&self.db)
        .await
        .context("按客户端群组ID查询频道失败")?;
        Ok(row.map(Self::row_to_channel))
    }

    /// 查询所有未软删除的频道
    pub async fn get_active_channels(&self) -> Result<Vec<LocalChannel>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM local_channels WHERE deleted_at_ms IS NULL
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("查询频道列表失败")?;
        Ok(rows.into_iter().map(Self::row_to_channel).collect())
    }

    /// 插入或更新一条成员角色记录
    ///
    /// feed 里 role 为 null 时保留现有角色，非 null 覆盖。
    pub async fn upsert_member(&self, channel_key: i64, member: &ChannelMemberFeed) -> Result<()> {
        let sql = r#"
            INSERT INTO local_channel_members (channel_key, user_id, role)
            VALUES (?, ?, ?)
            ON CONFLICT(channel_key, user_id) DO UPDATE SET
                role = COALESCE(excluded.role, role)
        "#;
        sqlx::query(sql)
            .bind(channel_key)
            .bind(&member.user_id)
            .bind(member.role)
            .execute(&self.db)
            .await
            .context("插入或更新频道成员失败")?;
        Ok(())
    }

    /// 查询频道成员列表
    pub async fn get_members(&self, channel_key: i64) -> Result<Vec<LocalChannelMember>> {
        let rows = sqlx::query(
            r#"
            SELECT channel_key, user_id, role FROM local_channel_members
            WHERE channel_key = ?
            "#,
        )
        .bind(channel_key)
        .fetch_all(&self.db)
        .await
        .context("查询频道成员失败")?;
        Ok(rows
            .into_iter()
            .map(|r| LocalChannelMember {
                channel_key: r.get("channel_key"),
                user_id: r.get("user_id"),
                role: r.get("role"),
            })
            .collect())
    }

    /// 物理删除频道及其成员（skip-soft-deleted 策略）
    pub async fn delete_channel(&self, channel_key: i64) -> Result<()> {
        let _guard = self.locks.lock(&format!("chan:{channel_key}")).await;
        sqlx::query("DELETE FROM local_channel_members WHERE channel_key = ?")
            .bind(channel_key)
            .execute(&self.db)
            .await
            .context("删除频道成员失败")?;
        sqlx::query("DELETE FROM local_channels WHERE channel_key = ?")
            .bind(channel_key)
            .execute(&self.db)
            .await
            .context("删除频道失败")?;
        debug!("[ChanDAO] 已物理删除频道 {}", channel_key);
        Ok(())
    }

    /// 清空频道表（登出边界）
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_channel_members")
            .execute(&self.db)
            .await
            .context("清空频道成员表失败")?;
        sqlx::query("DELETE FROM local_channels")
            .execute(&self.db)
            .await
            .context("清空频道表失败")?;
        Ok(())
    }

    fn row_to_channel(row: sqlx::sqlite::SqliteRow) -> LocalChannel {
        let metadata_raw: String = row.get("metadata");
        LocalChannel {
            channel_key: row.get("channel_key"),
            client_group_id: row.get("client_group_id"),
            name: row.get("name"),
            admin_id: row.get("admin_id"),
            metadata: metadata_from_json(&metadata_raw),
            parent_key: row.get("parent_key"),
            deleted_at_ms: row.get("deleted_at_ms"),
        }
    }

    async fn write_channel(&self, chan: &LocalChannel) -> Result<()> {
        let sql = r#"
            INSERT INTO local_channels (
                channel_key, client_group_id, name, admin_id, metadata,
                parent_key, deleted_at_ms
            ) VALUES (?,?,?,?,?,?,?)
            ON CONFLICT(channel_key) DO UPDATE SET
                client_group_id = excluded.client_group_id,
                name = excluded.name,
                admin_id = excluded.admin_id,
                metadata = excluded.metadata,
                parent_key = excluded.parent_key,
                deleted_at_ms = excluded.deleted_at_ms
        "#;
        sqlx::query(sql)
            .bind(chan.channel_key)
            .bind(&chan.client_group_id)
            .bind(&chan.name)
            .bind(&chan.admin_id)
            .bind(metadata_to_json(&chan.metadata))
            .bind(chan.parent_key)
            .bind(chan.deleted_at_ms)
            .execute(&self.db)
            .await
            .context("插入或更新频道失败")?;
        Ok(())
    }
}
