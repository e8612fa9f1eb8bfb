pub mod channel;
pub mod client;
pub mod conversation;
pub mod cursor;
pub mod db;
pub mod message;
pub mod serialization;
pub mod sync;
pub mod types;
pub mod user;

// 重新导出客户端入口相关类型
pub use client::{ClientConfig, ClientListeners, KuaixinClient, TransportSignal};

// 重新导出同步编排相关类型
pub use sync::{SyncEntityType, SyncOptions, SyncOrchestrator, SyncReport};
