//! 联系人监听器回调接口

use async_trait::async_trait;

/// 联系人监听器回调接口
///
/// 回调必须幂等：同一变更重复通知不应破坏 UI 可见状态。
#[async_trait]
pub trait ContactListener: Send + Sync {
    /// 联系人新增或变更，参数为受影响用户 ID 的 JSON 数组字符串
    async fn on_contact_list_changed(&self, user_ids_json: String);

    /// 变更批次过大，应整体刷新联系人列表
    async fn on_contacts_refresh_needed(&self);

    /// 联系人被删除（skip-soft-deleted 策略下的物理删除）
    async fn on_contact_deleted(&self, user_id: String);

    /// 黑名单变更，参数为当前被我拉黑用户 ID 的 JSON 数组字符串
    async fn on_block_list_changed(&self, blocked_ids_json: String);

    /// 免打扰列表变更，参数为受影响用户 ID 的 JSON 数组字符串
    async fn on_mute_list_changed(&self, user_ids_json: String);

    /// 在线状态变更（透传自传输层），参数为用户详情 JSON
    async fn on_presence_changed(&self, presence_json: String);
}

/// 空实现（默认监听器）
pub struct EmptyContactListener;

#[async_trait]
impl ContactListener for EmptyContactListener {
    async fn on_contact_list_changed(&self, _user_ids_json: String) {}
    async fn on_contacts_refresh_needed(&self) {}
    async fn on_contact_deleted(&self, _user_id: String) {}
    async fn on_block_list_changed(&self, _blocked_ids_json: String) {}
    async fn on_mute_list_changed(&self, _user_ids_json: String) {}
    async fn on_presence_changed(&self, _presence_json: String) {}
}
