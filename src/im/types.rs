use serde::Deserialize;

/// 消息内容类型
pub mod content_type {
    pub const TEXT: i32 = 0;
    pub const ATTACHMENT: i32 = 1;
    pub const LOCATION: i32 = 2;
    pub const CONTACT_CARD: i32 = 3;
    pub const SYSTEM: i32 = 4;
}

/// 消息状态机
///
/// 状态只能前进：UNREAD → READ（接收方向），PENDING → SENT → DELIVERED →
/// DELIVERED_READ（发送方向）。远端反馈永远不会把状态往回拨。
pub mod status {
    pub const UNREAD: i32 = 0;
    pub const READ: i32 = 1;
    pub const PENDING: i32 = 2;
    pub const SENT: i32 = 3;
    pub const DELIVERED: i32 = 4;
    pub const DELIVERED_READ: i32 = 5;

    /// 状态合并：只前进不后退
    pub fn forward(local: i32, remote: i32) -> i32 {
        local.max(remote)
    }
}

/// 各同步集合的游标名（cursor_name）
pub mod cursor_name {
    pub const MESSAGE_SYNC: &str = "message_sync";
    pub const MESSAGE_METADATA_SYNC: &str = "message_metadata_sync";
    pub const CHANNEL_SYNC: &str = "channel_sync";
    pub const REGISTERED_USER_SYNC: &str = "registered_user_sync";
    pub const BLOCK_LIST_SYNC: &str = "block_list_sync";
    pub const MUTE_LIST_SYNC: &str = "mute_list_sync";

    /// 游标初始值，重置到该值触发全量同步
    pub const ZERO: &str = "0";

    pub const ALL: &[&str] = &[
        MESSAGE_SYNC,
        MESSAGE_METADATA_SYNC,
        CHANNEL_SYNC,
        REGISTERED_USER_SYNC,
        BLOCK_LIST_SYNC,
        MUTE_LIST_SYNC,
    ];
}

/// 变更批次超过该数量时不再逐键通知，改为触发"整体刷新"回调
pub const FULL_REFRESH_THRESHOLD: usize = 200;

/// 统一的 API 响应包装结构体（包含 errCode、errMsg、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    pub data: Option<T>,
}

/// 通用 HTTP 响应处理函数：直接反序列化为统一的响应结构体
/// 返回 `ApiResponse<T>`，调用方可以根据需要处理 `data` 字段（可能为 None）
/// 所有 API 都可以共用此方法
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    use anyhow::Context;
    use tracing::{debug, error};

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    // 从 bytes 反序列化（因为 body 已经被消费了）
    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    // 检查错误码
    if api_resp.err_code != 0 {
        error!(
            "[HTTP] {}服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
        return Err(anyhow::anyhow!(
            "服务器错误 {}: {}",
            api_resp.err_code,
            api_resp.err_msg
        ));
    }

    Ok(api_resp)
}
