pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;

pub use listener::{ContactListener, EmptyContactListener};
pub use models::LocalUserDetail;
pub use service::{UserSyncer, UserSyncerConfig};
