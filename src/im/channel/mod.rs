pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;

pub use listener::{ChannelListener, EmptyChannelListener};
pub use models::{LocalChannel, LocalChannelMember};
pub use service::{ChannelSyncer, ChannelSyncerConfig};
