use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 元数据 map 序列化为 JSON 文本（落库格式）
pub fn metadata_to_json(metadata: &HashMap<String, String>) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

/// 从 JSON 文本恢复元数据 map，空串/坏数据一律当作空 map
pub fn metadata_from_json(raw: &str) -> HashMap<String, String> {
    if raw.is_empty() {
        return HashMap::new();
    }
    serde_json::from_str(raw).unwrap_or_default()
}

/// 逐键合并元数据：服务端键覆盖同名本地键，其余本地键保留
pub fn merge_metadata(local: &mut HashMap<String, String>, server: &HashMap<String, String>) {
    for (k, v) in server {
        local.insert(k.clone(), v.clone());
    }
}

/// 生成本地消息 key（本地先占位，服务端确认后沿用同一 key）
pub fn generate_local_key(user_id: &str) -> String {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{}", user_id, nanos)
}
