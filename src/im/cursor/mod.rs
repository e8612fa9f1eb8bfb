pub mod dao;
pub mod models;

pub use dao::CursorDao;
pub use models::LocalSyncCursor;
