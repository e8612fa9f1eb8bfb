//! SQLite 数据库工具：统一创建连接池与同键合并串行化
//!
//! 约定：各 DAO 自行负责建表（`init_db_with_connection`），连接池由
//! 客户端创建后在所有 DAO 之间共享。

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 创建 SQLite 连接池
///
/// `db_url` 形如 `sqlite://kuaixin.db?mode=rwc`
pub async fn create_sqlite_pool(db_url: &str) -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;
    Ok(pool)
}

/// 按主键串行化合并操作的锁表
///
/// 同一主键的"读取-合并-写回"必须互斥（否则并发的服务端合并与本地更新
/// 会互相覆盖）；不同主键之间并发执行。
#[derive(Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指定主键的互斥锁，持有期间对该键的合并操作串行执行
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

/// 测试用内存数据库连接池
///
/// 注意：`sqlite::memory:` 每个连接是独立的数据库，因此测试池必须限制
/// 为单连接，否则建表和查询可能落在不同库上。
#[cfg(test)]
pub(crate) async fn connect_memory_pool() -> Pool<Sqlite> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("创建内存数据库失败")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn key_locks_serialize_same_key() {
        let locks = Arc::new(KeyLocks::new());
        let counter = Arc::new(std::sync::Mutex::new(0i32));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("user_1").await;
                // 临界区内读-改-写不会交错
                let v = *counter.lock().unwrap();
                tokio::task::yield_now().await;
                *counter.lock().unwrap() = v + 1;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 8);
    }

    #[tokio::test]
    async fn key_locks_independent_keys() {
        let locks = KeyLocks::new();
        let g1 = locks.lock("a").await;
        // 不同键互不阻塞
        let g2 = locks.lock("b").await;
        drop(g1);
        drop(g2);
    }
}
