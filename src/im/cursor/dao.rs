//! 游标数据访问层（DAO）
//!
//! 负责各同步集合水位线的持久化。写入是单键原子 upsert，键之间互相独立，
//! 不需要跨键事务。

use crate::im::cursor::models::LocalSyncCursor;
use crate::im::types::cursor_name;
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

/// 游标 DAO（基于 sqlx）
pub struct CursorDao {
    db: Pool<Sqlite>,
    user_id: String,
}

impl CursorDao {
    /// 创建新的游标 DAO
    pub fn new(db: Pool<Sqlite>, user_id: String) -> Self {
        Self { db, user_id }
    }

    /// 使用共享连接初始化数据库表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS local_sync_cursors (
                cursor_name TEXT NOT NULL,
                user_id TEXT NOT NULL,
                value TEXT NOT NULL DEFAULT '0',
                PRIMARY KEY (cursor_name, user_id)
            )
        "#;
        sqlx::query(sql)
            .execute(db)
            .await
            .context("创建游标表失败")?;
        Ok(())
    }

    /// 读取游标值，不存在时返回 "0"（全量同步起点）
    pub async fn get(&self, name: &str) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT value FROM local_sync_cursors
            WHERE cursor_name = ? AND user_id = ?
            "#,
        )
        .bind(name)
        .bind(&self.user_id)
        .fetch_optional(&self.db)
        .await
        .context("查询游标失败")?;

        let value = row
            .map(|r| r.get::<String, _>("value"))
            .unwrap_or_else(|| cursor_name::ZERO.to_string());
        debug!("[CursorDAO] 读取游标 {} = {}", name, value);
        Ok(value)
    }

    /// 写入游标值（单键原子 upsert）
    ///
    /// 只允许在对应 feed 页合并成功后调用，绝不能先于合并。
    pub async fn set(&self, name: &str, value: &str) -> Result<()> {
        let sql = r#"
            INSERT INTO local_sync_cursors (cursor_name, user_id, value)
            VALUES (?, ?, ?)
            ON CONFLICT(cursor_name, user_id) DO UPDATE SET
                value = excluded.value
        "#;
        sqlx::query(sql)
            .bind(name)
            .bind(&self.user_id)
            .bind(value)
            .execute(&self.db)
            .await
            .context("保存游标失败")?;
        debug!("[CursorDAO] 推进游标 {} -> {}", name, value);
        Ok(())
    }

    /// 单调推进游标：新值按数值比较不大于当前值时不写入
    ///
    /// 游标值对外不透明，但本 SDK 的水位线都是毫秒时间戳字符串，
    /// 数值比较足以挡住偶发的回退响应。
    pub async fn advance(&self, name: &str, value: &str) -> Result<()> {
        let current = self.get(name).await?;
        let cur_num = current.parse::<i64>().unwrap_or(0);
        let new_num = value.parse::<i64>().unwrap_or(0);
        if new_num <= cur_num {
            debug!(
                "[CursorDAO] 忽略不前进的游标值 {}: {} -> {}",
                name, current, value
            );
            return Ok(());
        }
        self.set(name, value).await
    }

    /// 读取当前用户的所有游标记录
    pub async fn get_all(&self) -> Result<Vec<LocalSyncCursor>> {
        let rows = sqlx::query(
            r#"
            SELECT cursor_name, user_id, value FROM local_sync_cursors
            WHERE user_id = ?
            "#,
        )
        .bind(&self.user_id)
        .fetch_all(&self.db)
        .await
        .context("查询游标列表失败")?;

        Ok(rows
            .into_iter()
            .map(|r| LocalSyncCursor {
                cursor_name: r.get("cursor_name"),
                user_id: r.get("user_id"),
                value: r.get("value"),
            })
            .collect())
    }

    /// 重置当前用户的全部游标（登出边界），之后的同步一律从 "0" 开始
    pub async fn reset_all(&self) -> Result<()> {
        info!("[CursorDAO] 重置用户 {} 的全部游标", self.user_id);
        sqlx::query(
            r#"
            DELETE FROM local_sync_cursors WHERE user_id = ?
            "#,
        )
        .bind(&self.user_id)
        .execute(&self.db)
        .await
        .context("重置游标失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::db::connect_memory_pool;

    async fn dao() -> CursorDao {
        let pool = connect_memory_pool().await;
        CursorDao::init_db_with_connection(&pool).await.unwrap();
        CursorDao::new(pool, "u1".to_string())
    }

    #[tokio::test]
    async fn missing_cursor_defaults_to_zero() {
        let dao = dao().await;
        assert_eq!(dao.get(cursor_name::CHANNEL_SYNC).await.unwrap(), "0");
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let dao = dao().await;
        dao.set(cursor_name::CHANNEL_SYNC, "500").await.unwrap();
        assert_eq!(dao.get(cursor_name::CHANNEL_SYNC).await.unwrap(), "500");

        // 再次推进覆盖旧值
        dao.set(cursor_name::CHANNEL_SYNC, "800").await.unwrap();
        assert_eq!(dao.get(cursor_name::CHANNEL_SYNC).await.unwrap(), "800");
    }

    #[tokio::test]
    async fn cursors_are_independent_per_name() {
        let dao = dao().await;
        dao.set(cursor_name::MESSAGE_SYNC, "123").await.unwrap();
        assert_eq!(dao.get(cursor_name::BLOCK_LIST_SYNC).await.unwrap(), "0");
        assert_eq!(dao.get(cursor_name::MESSAGE_SYNC).await.unwrap(), "123");
    }

    #[tokio::test]
    async fn get_all_lists_only_written_cursors() {
        let dao = dao().await;
        dao.set(cursor_name::MESSAGE_SYNC, "10").await.unwrap();
        dao.set(cursor_name::MUTE_LIST_SYNC, "20").await.unwrap();

        let all = dao.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.user_id == "u1"));
    }

    #[tokio::test]
    async fn advance_is_monotonic() {
        let dao = dao().await;
        dao.advance(cursor_name::CHANNEL_SYNC, "500").await.unwrap();
        assert_eq!(dao.get(cursor_name::CHANNEL_SYNC).await.unwrap(), "500");

        // 回退值被忽略
        dao.advance(cursor_name::CHANNEL_SYNC, "300").await.unwrap();
        assert_eq!(dao.get(cursor_name::CHANNEL_SYNC).await.unwrap(), "500");

        // 相同值也不重写
        dao.advance(cursor_name::CHANNEL_SYNC, "500").await.unwrap();
        assert_eq!(dao.get(cursor_name::CHANNEL_SYNC).await.unwrap(), "500");

        dao.advance(cursor_name::CHANNEL_SYNC, "800").await.unwrap();
        assert_eq!(dao.get(cursor_name::CHANNEL_SYNC).await.unwrap(), "800");
    }

    #[tokio::test]
    async fn reset_all_returns_cursors_to_zero() {
        let dao = dao().await;
        for name in cursor_name::ALL {
            dao.set(name, "42").await.unwrap();
        }
        dao.reset_all().await.unwrap();
        for name in cursor_name::ALL {
            assert_eq!(dao.get(name).await.unwrap(), "0");
        }
    }
}
