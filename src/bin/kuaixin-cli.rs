//! Kuaixin CLI 客户端（测试版）
//!
//! 非交互式 CLI，用于测试和展示同步引擎
//! 启动时通过命令行参数指定用户，执行登录引导全量同步，之后按固定
//! 间隔触发增量同步，只展示接收到的回调信息

use anyhow::Result;
use clap::Parser;
use kuaixin_sdk_core::im::channel::listener::ChannelListener;
use kuaixin_sdk_core::im::conversation::listener::ConversationListener;
use kuaixin_sdk_core::im::message::listener::MessageListener;
use kuaixin_sdk_core::im::sync::listener::SyncListener;
use kuaixin_sdk_core::im::sync::orchestrator::SyncEntityType;
use kuaixin_sdk_core::im::user::listener::ContactListener;
use kuaixin_sdk_core::{ClientConfig, ClientListeners, KuaixinClient, SyncOptions};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

/// Kuaixin CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "kuaixin-cli")]
#[command(about = "Kuaixin CLI 客户端 - 用于测试和展示同步引擎", long_about = None)]
struct Args {
    /// 用户 ID
    #[arg(short, long, default_value = "demo-user")]
    user_id: String,

    /// 认证 token
    #[arg(short, long, default_value = "demo-token")]
    token: String,

    /// HTTP API 基础地址
    #[arg(long, default_value = "http://localhost:10002")]
    api_base_url: String,

    /// 本地 SQLite 数据库 URL
    #[arg(long, default_value = "sqlite://kuaixin.db?mode=rwc")]
    db_url: String,

    /// 增量同步间隔（秒）
    #[arg(long, default_value = "30")]
    sync_interval: u64,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 日志级别（默认: info,kuaixin_sdk_core=debug）
    #[arg(long, default_value = "info,kuaixin_sdk_core=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("无法创建日志文件 debug.log");

    // 输出到 stdout（控制台），保留 ANSI 颜色代码用于终端显示
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 输出到文件，禁用 ANSI 颜色代码（文件不需要颜色）
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
}

/// 组装监听器集合（输出所有接收到的回调）
fn build_listeners() -> ClientListeners {
    // 消息监听器
    struct CliMessageListener;
    #[async_trait::async_trait]
    impl MessageListener for CliMessageListener {
        async fn on_messages_updated(&self, message_keys_json: String) {
            info!("[CLI/Message] 📨 消息变更: {}", message_keys_json);
        }

        async fn on_messages_refresh_needed(&self) {
            info!("[CLI/Message] 🔄 批次过大，需要整体刷新消息视图");
        }

        async fn on_message_metadata_updated(&self, message_keys_json: String) {
            info!("[CLI/Message] 🏷️ 元数据变更: {}", message_keys_json);
        }

        async fn on_message_deleted(&self, message_key: String) {
            info!("[CLI/Message] 🗑️ 消息删除: {}", message_key);
        }
    }

    // 会话监听器
    struct CliConversationListener;
    #[async_trait::async_trait]
    impl ConversationListener for CliConversationListener {
        async fn on_new_conversation(&self, conversation_json: String) {
            info!("[CLI/Conversation] 🆕 新会话: {}", conversation_json);
        }

        async fn on_conversation_changed(&self, conversation_json: String) {
            info!("[CLI/Conversation] 🔄 会话变更: {}", conversation_json);
        }

        async fn on_conversation_removed(&self, conversation_key: String) {
            info!("[CLI/Conversation] 🗑️ 会话删除: {}", conversation_key);
        }

        async fn on_total_unread_message_count_changed(&self, total_unread_count: i64) {
            info!("[CLI/Conversation] 📬 总未读数: {}", total_unread_count);
        }

        async fn on_typing_status_changed(&self, typing_json: String) {
            info!("[CLI/Conversation] ⌨️ 输入状态: {}", typing_json);
        }
    }

    // 频道监听器
    struct CliChannelListener;
    #[async_trait::async_trait]
    impl ChannelListener for CliChannelListener {
        async fn on_channels_updated(&self, channel_keys_json: String) {
            info!("[CLI/Channel] 👥 频道变更: {}", channel_keys_json);
        }

        async fn on_channels_refresh_needed(&self) {
            info!("[CLI/Channel] 🔄 批次过大，需要整体刷新频道列表");
        }

        async fn on_channel_deleted(&self, channel_key: i64) {
            info!("[CLI/Channel] 🗑️ 频道删除: {}", channel_key);
        }
    }

    // 联系人监听器
    struct CliContactListener;
    #[async_trait::async_trait]
    impl ContactListener for CliContactListener {
        async fn on_contact_list_changed(&self, user_ids_json: String) {
            info!("[CLI/Contact] 👤 联系人变更: {}", user_ids_json);
        }

        async fn on_contacts_refresh_needed(&self) {
            info!("[CLI/Contact] 🔄 批次过大，需要整体刷新联系人列表");
        }

        async fn on_contact_deleted(&self, user_id: String) {
            info!("[CLI/Contact] 🗑️ 联系人删除: {}", user_id);
        }

        async fn on_block_list_changed(&self, blocked_ids_json: String) {
            info!("[CLI/Contact] 🚫 黑名单变更: {}", blocked_ids_json);
        }

        async fn on_mute_list_changed(&self, user_ids_json: String) {
            info!("[CLI/Contact] 🔕 免打扰变更: {}", user_ids_json);
        }

        async fn on_presence_changed(&self, presence_json: String) {
            info!("[CLI/Contact] 🟢 在线状态: {}", presence_json);
        }
    }

    // 同步过程监听器
    struct CliSyncListener;
    #[async_trait::async_trait]
    impl SyncListener for CliSyncListener {
        async fn on_sync_start(&self, entity: SyncEntityType) {
            info!("[CLI/Sync] 🔄 同步开始: {}", entity);
        }

        async fn on_sync_finish(&self, entity: SyncEntityType, affected: usize) {
            info!("[CLI/Sync] ✅ 同步完成: {}，{} 条变更", entity, affected);
        }

        async fn on_sync_failed(&self, entity: SyncEntityType, error: String) {
            error!("[CLI/Sync] ❌ 同步失败: {}: {}", entity, error);
        }
    }

    ClientListeners {
        message: Arc::new(CliMessageListener),
        conversation: Arc::new(CliConversationListener),
        channel: Arc::new(CliChannelListener),
        contact: Arc::new(CliContactListener),
        sync: Arc::new(CliSyncListener),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    init_logger(&args.log_level);

    info!("[CLI] 🚀 Kuaixin CLI 客户端（测试模式）");
    info!("[CLI] 👤 用户ID: {}", args.user_id);
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    let config = ClientConfig {
        user_id: args.user_id,
        token: args.token,
        api_base_url: args.api_base_url,
        db_url: args.db_url,
        page_size: 100,
        skip_soft_deleted: false,
    };

    info!("[CLI] 🔗 正在连接本地存储...");
    let client = KuaixinClient::connect_with_listeners(config, build_listeners())
        .await
        .map_err(|e| anyhow::anyhow!("连接失败: {}", e))?;
    info!("[CLI] ✅ 连接成功！");

    // 登录引导：全量同步
    info!("[CLI] 🔄 登录引导全量同步...");
    let reports = client.bootstrap_after_login().await;
    for report in &reports {
        if report.success {
            info!(
                "[CLI]   {} 同步成功，{} 条变更",
                report.entity, report.affected
            );
        } else {
            error!(
                "[CLI]   {} 同步失败: {}",
                report.entity,
                report.error.as_deref().unwrap_or("未知错误")
            );
        }
    }

    // 显示初始信息
    if let Ok(summaries) = client.get_conversation_summaries(0, 5).await {
        info!("[CLI] 📋 会话列表（前 {} 个）:", summaries.len());
        for summary in &summaries {
            let name = summary
                .peer_user_id
                .clone()
                .unwrap_or_else(|| format!("群 {}", summary.group_key.unwrap_or_default()));
            info!(
                "[CLI]   - {} | 未读: {} | 最新: {}",
                name,
                summary.unread_count,
                if summary.latest_message.content.chars().count() > 30 {
                    summary
                        .latest_message
                        .content
                        .chars()
                        .take(30)
                        .collect::<String>()
                } else {
                    summary.latest_message.content.clone()
                }
            );
        }
    }

    if let Ok(contacts) = client.get_active_contacts().await {
        info!("[CLI] 👥 联系人列表（共 {} 个）", contacts.len());
    }

    if let Ok(unread) = client.get_total_unread_count().await {
        info!("[CLI] 📬 总未读数: {}", unread);
    }

    info!(
        "[CLI] 📥 开始周期增量同步（每 {} 秒）...",
        args.sync_interval
    );
    let deadline = if args.duration > 0 {
        Some(tokio::time::Instant::now() + Duration::from_secs(args.duration))
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        None
    };

    loop {
        sleep(Duration::from_secs(args.sync_interval)).await;
        if let Some(deadline) = deadline {
            if tokio::time::Instant::now() >= deadline {
                info!("[CLI] 👋 程序退出");
                break;
            }
        }
        let _ = client.sync_all(SyncOptions::default()).await;
    }

    Ok(())
}
