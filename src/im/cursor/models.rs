//! 同步游标本地模型定义

use serde::{Deserialize, Serialize};

/// 同步游标（水位线）
///
/// 每个同步集合一条记录，value 为不透明的时间戳/版本字符串，
/// 只在对应 feed 页合并成功之后推进，从不回退。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSyncCursor {
    /// 游标名（见 `types::cursor_name`）
    #[serde(rename = "cursorName")]
    pub cursor_name: String,
    /// 所属用户 ID
    #[serde(rename = "userID")]
    pub user_id: String,
    /// 游标值，"0" 表示从头全量同步
    pub value: String,
}
