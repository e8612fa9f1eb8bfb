//! 同步编排器
//!
//! 每个实体类型一个同步任务：读游标 → 拉取 → 合并 → 推进游标 → 通知。
//! 不同实体类型的任务可以并发跑；同一实体类型同时只允许一个在跑，
//! 重复请求被合并（直接忽略，不排队），避免游标乱序推进。
//! 拉取/合并失败不抛出，以 SyncReport 形式交给调用方决定重试时机。

use crate::im::channel::service::ChannelSyncer;
use crate::im::cursor::dao::CursorDao;
use crate::im::message::service::MessageSyncer;
use crate::im::sync::listener::{EmptySyncListener, SyncListener};
use crate::im::types::cursor_name;
use crate::im::user::service::UserSyncer;
use anyhow::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// 同步实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEntityType {
    Messages,
    MessageMetadata,
    Channels,
    RegisteredUsers,
    BlockList,
    MuteList,
}

impl SyncEntityType {
    pub const ALL: &'static [SyncEntityType] = &[
        SyncEntityType::Messages,
        SyncEntityType::MessageMetadata,
        SyncEntityType::Channels,
        SyncEntityType::RegisteredUsers,
        SyncEntityType::BlockList,
        SyncEntityType::MuteList,
    ];

    /// 对应的游标名
    pub fn cursor_name(&self) -> &'static str {
        match self {
            SyncEntityType::Messages => cursor_name::MESSAGE_SYNC,
            SyncEntityType::MessageMetadata => cursor_name::MESSAGE_METADATA_SYNC,
            SyncEntityType::Channels => cursor_name::CHANNEL_SYNC,
            SyncEntityType::RegisteredUsers => cursor_name::REGISTERED_USER_SYNC,
            SyncEntityType::BlockList => cursor_name::BLOCK_LIST_SYNC,
            SyncEntityType::MuteList => cursor_name::MUTE_LIST_SYNC,
        }
    }
}

impl fmt::Display for SyncEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncEntityType::Messages => "messages",
            SyncEntityType::MessageMetadata => "message_metadata",
            SyncEntityType::Channels => "channels",
            SyncEntityType::RegisteredUsers => "registered_users",
            SyncEntityType::BlockList => "block_list",
            SyncEntityType::MuteList => "mute_list",
        };
        f.write_str(name)
    }
}

/// 同步选项
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// true 时先把游标重置为 "0"，强制全量同步
    pub full: bool,
}

/// 同步任务结果（不抛错，调用方看这个决定重试策略）
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub entity: SyncEntityType,
    /// 任务是否成功（被合并的任务也算成功——别人正在干同样的活）
    pub success: bool,
    /// true 表示同类型任务已在跑，本次被合并忽略
    pub skipped: bool,
    /// 受影响的记录数
    pub affected: usize,
    /// 失败时的诊断信息
    pub error: Option<String>,
}

/// 在飞任务标记的 RAII guard：析构时释放，任务被取消也不会卡死后续同步
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<SyncEntityType>>>,
    entity: SyncEntityType,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.entity);
        }
    }
}

/// 同步编排器
pub struct SyncOrchestrator {
    message_syncer: Arc<MessageSyncer>,
    channel_syncer: Arc<ChannelSyncer>,
    user_syncer: Arc<UserSyncer>,
    cursor_dao: Arc<CursorDao>,
    listener: Arc<dyn SyncListener>,
    in_flight: Arc<Mutex<HashSet<SyncEntityType>>>,
}

impl SyncOrchestrator {
    /// 创建新的同步编排器
    pub fn new(
        message_syncer: Arc<MessageSyncer>,
        channel_syncer: Arc<ChannelSyncer>,
        user_syncer: Arc<UserSyncer>,
        cursor_dao: Arc<CursorDao>,
    ) -> Self {
        Self::with_listener(
            message_syncer,
            channel_syncer,
            user_syncer,
            cursor_dao,
            Arc::new(EmptySyncListener),
        )
    }

    /// 创建新的同步编排器（带自定义监听器）
    pub fn with_listener(
        message_syncer: Arc<MessageSyncer>,
        channel_syncer: Arc<ChannelSyncer>,
        user_syncer: Arc<UserSyncer>,
        cursor_dao: Arc<CursorDao>,
        listener: Arc<dyn SyncListener>,
    ) -> Self {
        Self {
            message_syncer,
            channel_syncer,
            user_syncer,
            cursor_dao,
            listener,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 同步一个实体类型（统一入口）
    pub async fn sync(&self, entity: SyncEntityType, options: SyncOptions) -> SyncReport {
        let Some(_guard) = self.try_begin(entity) else {
            info!("[SyncOrch] 同步任务 {} 已在进行，合并本次请求", entity);
            return SyncReport {
                entity,
                success: true,
                skipped: true,
                affected: 0,
                error: None,
            };
        };

        self.listener.on_sync_start(entity).await;
        info!("[SyncOrch] 🔄 开始同步 {}（full={}）", entity, options.full);

        let result = self.run_job(entity, options).await;
        match result {
            Ok(affected) => {
                info!("[SyncOrch] ✅ {} 同步完成，{} 条变更", entity, affected);
                self.listener.on_sync_finish(entity, affected).await;
                SyncReport {
                    entity,
                    success: true,
                    skipped: false,
                    affected,
                    error: None,
                }
            }
            Err(e) => {
                // 游标未推进，下次从原位重试即可
                warn!("[SyncOrch] ❌ {} 同步失败: {:?}", entity, e);
                self.listener.on_sync_failed(entity, format!("{e:#}")).await;
                SyncReport {
                    entity,
                    success: false,
                    skipped: false,
                    affected: 0,
                    error: Some(format!("{e:#}")),
                }
            }
        }
    }

    /// 并发同步所有实体类型（登录引导、整体刷新用）
    pub async fn sync_all(&self, options: SyncOptions) -> Vec<SyncReport> {
        let jobs = SyncEntityType::ALL
            .iter()
            .map(|entity| self.sync(*entity, options));
        futures_util::future::join_all(jobs).await
    }

    async fn run_job(&self, entity: SyncEntityType, options: SyncOptions) -> Result<usize> {
        if options.full {
            self.cursor_dao
                .set(entity.cursor_name(), cursor_name::ZERO)
                .await?;
        }
        match entity {
            SyncEntityType::Messages => self.message_syncer.sync_incremental().await,
            SyncEntityType::MessageMetadata => self.message_syncer.sync_metadata_updates().await,
            SyncEntityType::Channels => self.channel_syncer.sync_incremental().await,
            SyncEntityType::RegisteredUsers => self.user_syncer.sync_registered_users().await,
            SyncEntityType::BlockList => self.user_syncer.sync_block_list().await,
            SyncEntityType::MuteList => self.user_syncer.sync_mute_list().await,
        }
    }

    /// 标记实体类型进入同步，已在飞则返回 None（合并语义）
    fn try_begin(&self, entity: SyncEntityType) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(entity) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: self.in_flight.clone(),
            entity,
        })
    }
}
