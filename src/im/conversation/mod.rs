pub mod listener;
pub mod models;
pub mod recents;
pub mod service;

pub use listener::{ConversationListener, EmptyConversationListener};
pub use models::ConversationSummary;
pub use recents::{ConversationKey, RecentList};
pub use service::ConversationTracker;
