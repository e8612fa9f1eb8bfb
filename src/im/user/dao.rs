//! 用户数据访问层（DAO）
//!
//! 负责联系人/用户详情的数据库操作。详情合并走"读取-合并-写回"并按
//! user_id 串行化；黑名单/免打扰标记用单条 COALESCE upsert，可以在
//! 联系人记录尚未到达时先落占位行（最终一致）。

use crate::im::db::KeyLocks;
use crate::im::serialization::{metadata_from_json, metadata_to_json};
use crate::im::user::models::{merge_user, LocalUserDetail, UserFeed};
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// 用户 DAO（基于 sqlx）
pub struct UserDao {
    db: Pool<Sqlite>,
    locks: KeyLocks,
}

impl UserDao {
    /// 创建新的用户 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            locks: KeyLocks::new(),
        }
    }

    /// 使用共享连接初始化数据库表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS local_users (
                user_id TEXT PRIMARY KEY,
                display_name TEXT,
                image_link TEXT,
                phone_number TEXT,
                email TEXT,
                connected INTEGER NOT NULL DEFAULT 0,
                last_seen_at_ms INTEGER NOT NULL DEFAULT 0,
                role_type INTEGER NOT NULL DEFAULT 0,
                blocked INTEGER NOT NULL DEFAULT 0,
                blocked_by INTEGER NOT NULL DEFAULT 0,
                muted_until_ms INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                deleted_at_ms INTEGER
            )
        "#;
        sqlx::query(sql)
            .execute(db)
            .await
            .context("创建用户表失败")?;
        Ok(())
    }

    /// 合并一条用户 feed 记录，返回合并后的本地用户
    pub async fn merge_feed(&self, feed: &UserFeed) -> Result<LocalUserDetail> {
        let user_id = feed
            .user_id
            .clone()
            .context("用户 feed 记录缺少 userID，无法合并")?;

        let _guard = self.locks.lock(&user_id).await;
        let existing = self.get_by_id(&user_id).await?;
        let merged = merge_user(existing.as_ref(), feed);
        self.write_user(&merged).await?;
        Ok(merged)
    }

    /// 按用户 ID 查询（墓碑行也返回，历史消息归属要靠它）
    pub async fn get_by_id(&self, user_id: &str) -> Result<Option<LocalUserDetail>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM local_users WHERE user_id = ? LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("按ID查询用户失败")?;
        Ok(row.map(Self::row_to_user))
    }

    /// 查询活跃联系人列表（排除墓碑行）
    pub async fn get_active_contacts(&self) -> Result<Vec<LocalUserDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM local_users WHERE deleted_at_ms IS NULL
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("查询联系人列表失败")?;
        Ok(rows.into_iter().map(Self::row_to_user).collect())
    }

    /// 更新黑名单标记（任一方向传 None 表示保持现状）
    ///
    /// 目标用户可能还没有联系人记录，先落占位行。
    pub async fn set_block_status(
        &self,
        user_id: &str,
        blocked: Option<bool>,
        blocked_by: Option<bool>,
    ) -> Result<()> {
        let sql = r#"
            INSERT INTO local_users (user_id, blocked, blocked_by)
            VALUES (?1, COALESCE(?2, 0), COALESCE(?3, 0))
            ON CONFLICT(user_id) DO UPDATE SET
                blocked = COALESCE(?2, blocked),
                blocked_by = COALESCE(?3, blocked_by)
        "#;
        sqlx::query(sql)
            .bind(user_id)
            .bind(blocked.map(|b| if b { 1 } else { 0 }))
            .bind(blocked_by.map(|b| if b { 1 } else { 0 }))
            .execute(&self.db)
            .await
            .context("更新黑名单标记失败")?;
        debug!(
            "[UserDAO] 更新黑名单标记: {} blocked={:?} blockedBy={:?}",
            user_id, blocked, blocked_by
        );
        Ok(())
    }

    /// 更新免打扰标记（占位行逻辑同黑名单）
    pub async fn set_mute_status(&self, user_id: &str, muted_until_ms: i64) -> Result<()> {
        let sql = r#"
            INSERT INTO local_users (user_id, muted_until_ms)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                muted_until_ms = excluded.muted_until_ms
        "#;
        sqlx::query(sql)
            .bind(user_id)
            .bind(muted_until_ms)
            .execute(&self.db)
            .await
            .context("更新免打扰标记失败")?;
        Ok(())
    }

    /// 当前被我拉黑的用户 ID 列表
    pub async fn get_blocked_user_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id FROM local_users WHERE blocked = 1
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("查询黑名单失败")?;
        Ok(rows
            .into_iter()
            .map(|r| r.get::<String, _>("user_id"))
            .collect())
    }

    /// 更新在线状态（传输层 presence 信令透写）
    pub async fn update_presence(
        &self,
        user_id: &str,
        connected: bool,
        last_seen_at_ms: i64,
    ) -> Result<()> {
        let sql = r#"
            INSERT INTO local_users (user_id, connected, last_seen_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                connected = excluded.connected,
                last_seen_at_ms = excluded.last_seen_at_ms
        "#;
        sqlx::query(sql)
            .bind(user_id)
            .bind(if connected { 1 } else { 0 })
            .bind(last_seen_at_ms)
            .execute(&self.db)
            .await
            .context("更新在线状态失败")?;
        Ok(())
    }

    /// 物理删除用户行（skip-soft-deleted 策略）
    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        let _guard = self.locks.lock(user_id).await;
        sqlx::query("DELETE FROM local_users WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("删除用户失败")?;
        Ok(())
    }

    /// 清空用户表（登出边界）
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_users")
            .execute(&self.db)
            .await
            .context("清空用户表失败")?;
        Ok(())
    }

    fn row_to_user(row: sqlx::sqlite::SqliteRow) -> LocalUserDetail {
        let connected: i64 = row.get("connected");
        let blocked: i64 = row.get("blocked");
        let blocked_by: i64 = row.get("blocked_by");
        let metadata_raw: String = row.get("metadata");
        LocalUserDetail {
            user_id: row.get("user_id"),
            display_name: row.get("display_name"),
            image_link: row.get("image_link"),
            phone_number: row.get("phone_number"),
            email: row.get("email"),
            connected: connected != 0,
            last_seen_at_ms: row.get("last_seen_at_ms"),
            role_type: row.get("role_type"),
            blocked: blocked != 0,
            blocked_by: blocked_by != 0,
            muted_until_ms: row.get("muted_until_ms"),
            metadata: metadata_from_json(&metadata_raw),
            deleted_at_ms: row.get("deleted_at_ms"),
        }
    }

    async fn write_user(&self, user: &LocalUserDetail) -> Result<()> {
        let sql = r#"
            INSERT INTO local_users (
                user_id, display_name, image_link, phone_number, email,
                connected, last_seen_at_ms, role_type, blocked, blocked_by,
                muted_until_ms, metadata, deleted_at_ms
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                image_link = excluded.image_link,
                phone_number = excluded.phone_number,
                email = excluded.email,
                connected = excluded.connected,
                last_seen_at_ms = excluded.last_seen_at_ms,
                role_type = excluded.role_type,
                blocked = excluded.blocked,
                blocked_by = excluded.blocked_by,
                muted_until_ms = excluded.muted_until_ms,
                metadata = excluded.metadata,
                deleted_at_ms = excluded.deleted_at_ms
        "#;
        sqlx::query(sql)
            .bind(&user.user_id)
            .bind(&user.display_name)
            .bind(&user.image_link)
            .bind(&user.phone_number)
            .bind(&user.email)
            .bind(if user.connected { 1 } else { 0 })
            .bind(user.last_seen_at_ms)
            .bind(user.role_type)
            .bind(if user.blocked { 1 } else { 0 })
            .bind(if user.blocked_by { 1 } else { 0 })
            .bind(user.muted_until_ms)
            .bind(metadata_to_json(&user.metadata))
            .bind(user.deleted_at_ms)
            .execute(&self.db)
            .await
            .context("插入或更新用户失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::db::connect_memory_pool;

    async fn dao() -> UserDao {
        let pool = connect_memory_pool().await;
        UserDao::init_db_with_connection(&pool).await.unwrap();
        UserDao::new(pool)
    }

    fn feed(user_id: &str) -> UserFeed {
        UserFeed {
            user_id: Some(user_id.to_string()),
            display_name: Some("Alice".to_string()),
            image_link: Some("http://x/y.png".to_string()),
            phone_number: None,
            email: None,
            connected: None,
            last_seen_at_ms: None,
            role_type: None,
            metadata: None,
            replace_metadata: false,
            deleted_at_ms: None,
        }
    }

    #[tokio::test]
    async fn merge_is_idempotent_and_partial_safe() {
        let dao = dao().await;
        dao.merge_feed(&feed("u1")).await.unwrap();
        dao.merge_feed(&feed("u1")).await.unwrap();
        assert_eq!(dao.get_active_contacts().await.unwrap().len(), 1);

        // 部分响应：改名不抹头像
        let mut partial = feed("u1");
        partial.display_name = Some("Bob".to_string());
        partial.image_link = None;
        dao.merge_feed(&partial).await.unwrap();

        let user = dao.get_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Bob"));
        assert_eq!(user.image_link.as_deref(), Some("http://x/y.png"));
    }

    #[tokio::test]
    async fn tombstone_hidden_but_resolvable() {
        let dao = dao().await;
        dao.merge_feed(&feed("u1")).await.unwrap();

        let mut tomb = feed("u1");
        tomb.deleted_at_ms = Some(777);
        dao.merge_feed(&tomb).await.unwrap();

        assert!(dao.get_active_contacts().await.unwrap().is_empty());
        let user = dao.get_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.deleted_at_ms, Some(777));
        assert_eq!(user.display_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn block_flags_work_on_placeholder_rows() {
        let dao = dao().await;
        // 联系人记录还没同步到，黑名单先到
        dao.set_block_status("ghost", Some(true), None).await.unwrap();
        assert_eq!(dao.get_blocked_user_ids().await.unwrap(), vec!["ghost"]);

        // 后到的详情合并不会覆盖标记
        dao.merge_feed(&feed("ghost")).await.unwrap();
        assert_eq!(dao.get_blocked_user_ids().await.unwrap(), vec!["ghost"]);

        // 解除拉黑；另一方向的标记不受影响
        dao.set_block_status("ghost", Some(false), Some(true))
            .await
            .unwrap();
        assert!(dao.get_blocked_user_ids().await.unwrap().is_empty());
        let user = dao.get_by_id("ghost").await.unwrap().unwrap();
        assert!(user.blocked_by);
    }

    #[tokio::test]
    async fn mute_status_roundtrip() {
        let dao = dao().await;
        dao.set_mute_status("u1", 123456).await.unwrap();
        let user = dao.get_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.muted_until_ms, 123456);

        dao.set_mute_status("u1", 0).await.unwrap();
        let user = dao.get_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.muted_until_ms, 0);
    }

    #[tokio::test]
    async fn presence_update_touches_only_presence_fields() {
        let dao = dao().await;
        dao.merge_feed(&feed("u1")).await.unwrap();
        dao.update_presence("u1", true, 999).await.unwrap();

        let user = dao.get_by_id("u1").await.unwrap().unwrap();
        assert!(user.connected);
        assert_eq!(user.last_seen_at_ms, 999);
        assert_eq!(user.display_name.as_deref(), Some("Alice"));
    }
}
