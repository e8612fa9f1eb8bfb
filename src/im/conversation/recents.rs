//! 最近会话去重排序引擎
//!
//! 维护"每个会话身份至多一条、且永远是目前见过时间戳最大的那条"的有序
//! 列表。纯内存 reducer，不做任何 I/O，insert/remove 返回新列表，便于
//! 无锁共享与单测。

use crate::im::message::models::LocalMessage;
use anyhow::{bail, Result};
use std::fmt;

/// 会话身份：群聊 key 优先于单聊对端 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Group(i64),
    Peer(String),
}

impl ConversationKey {
    /// 从消息推导会话身份
    ///
    /// 两者皆空属于上游程序错误（合法 feed 不会出现），直接拒绝，
    /// 绝不悄悄归并到别的会话桶里。
    pub fn of_message(msg: &LocalMessage) -> Result<Self> {
        if let Some(group_key) = msg.group_key {
            return Ok(ConversationKey::Group(group_key));
        }
        if let Some(ref peer) = msg.peer_user_id {
            if !peer.is_empty() {
                return Ok(ConversationKey::Peer(peer.clone()));
            }
        }
        bail!("消息缺少会话身份（peerUserID 与 groupKey 均为空）")
    }

    /// 单聊会话的对端用户 ID
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            ConversationKey::Peer(id) => Some(id),
            ConversationKey::Group(_) => None,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::Group(key) => write!(f, "group:{}", key),
            ConversationKey::Peer(id) => write!(f, "peer:{}", id),
        }
    }
}

/// 最近会话列表
///
/// 序列按插入顺序排列；每次生效的 insert 都把条目挪到表头，因此整体就是
/// "最近活跃在前"，与会话列表 UX 一致。
#[derive(Debug, Clone, Default)]
pub struct RecentList {
    entries: Vec<LocalMessage>,
}

impl RecentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一条消息，返回新列表
    ///
    /// - 同会话已有条目且其时间戳 <= 新消息：移除旧条目，新消息插到表头
    ///   （时间戳相等时后到者胜）；
    /// - 已有条目时间戳更大：乱序/过期到达，整个操作是 no-op，可见的
    ///   "最新"指针绝不回退；
    /// - 没有同会话条目：直接插到表头。
    pub fn insert(&self, msg: LocalMessage) -> Result<RecentList> {
        let key = ConversationKey::of_message(&msg)?;

        let mut entries = self.entries.clone();
        if let Some(pos) = Self::position_of(&entries, &key) {
            if entries[pos].created_at_ms > msg.created_at_ms {
                // 过期到达，保持现状
                return Ok(RecentList { entries });
            }
            entries.remove(pos);
        }
        entries.insert(0, msg);
        Ok(RecentList { entries })
    }

    /// 移除某个会话的条目（会话整体删除时调用），返回新列表
    pub fn remove(&self, key: &ConversationKey) -> RecentList {
        let entries = self
            .entries
            .iter()
            .filter(|m| {
                ConversationKey::of_message(m)
                    .map(|k| k != *key)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        RecentList { entries }
    }

    /// 查询某会话当前的最新消息
    pub fn latest(&self, key: &ConversationKey) -> Option<&LocalMessage> {
        Self::position_of(&self.entries, key).map(|pos| &self.entries[pos])
    }

    /// 按最近活跃在前的顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &LocalMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 从一批消息重建列表（本地库全量重放）
    ///
    /// 身份非法的消息直接丢弃（重建场景没有上游可报错）。
    pub fn rebuild<I: IntoIterator<Item = LocalMessage>>(messages: I) -> RecentList {
        let mut list = RecentList::new();
        for msg in messages {
            if let Ok(next) = list.insert(msg) {
                list = next;
            }
        }
        list
    }

    fn position_of(entries: &[LocalMessage], key: &ConversationKey) -> Option<usize> {
        entries.iter().position(|m| {
            ConversationKey::of_message(m)
                .map(|k| k == *key)
                .unwrap_or(false)
        })
    }
}
