pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;

pub use listener::{EmptyMessageListener, MessageListener};
pub use models::LocalMessage;
pub use service::{MessageDraft, MessageSyncer, MessageSyncerConfig};
