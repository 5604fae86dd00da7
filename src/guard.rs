//! 监听器冲突检测
//!
//! 同一消费组内多个监听器订阅同一 topic 时，消息会在监听器之间分摊或重复消费，
//! 测试表现为偶发失败。装配阶段检查一次，发现即报配置错误。

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Result, TestkitError};
use crate::types::GroupId;

/// 一个监听器的订阅信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerBinding {
    pub listener_id: String,
    pub group_id: GroupId,
    pub topics: Vec<String>,
}

impl ListenerBinding {
    pub fn new<I, S>(listener_id: impl Into<String>, group_id: impl Into<GroupId>, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            listener_id: listener_id.into(),
            group_id: group_id.into(),
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }
}

/// 监听器注册表
pub trait ListenerRegistry {
    fn bindings(&self) -> Vec<ListenerBinding>;
}

impl ListenerRegistry for Vec<ListenerBinding> {
    fn bindings(&self) -> Vec<ListenerBinding> {
        self.clone()
    }
}

impl ListenerRegistry for [ListenerBinding] {
    fn bindings(&self) -> Vec<ListenerBinding> {
        self.to_vec()
    }
}

/// 检查是否有多个监听器在同一消费组内订阅同一 topic
///
/// 没有 topic 的监听器跳过；发现冲突时返回 `ListenerConflict`
pub fn detect_conflicting_listeners<R>(registry: &R) -> Result<()>
where
    R: ListenerRegistry + ?Sized,
{
    let bindings = registry.bindings();
    let mut listeners_per_topic: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
    for binding in &bindings {
        for topic in &binding.topics {
            listeners_per_topic
                .entry((binding.group_id.as_str(), topic.as_str()))
                .or_default()
                .push(binding.listener_id.as_str());
        }
    }

    if let Some(((group, topic), listeners)) = listeners_per_topic
        .into_iter()
        .find(|(_, listeners)| listeners.len() > 1)
    {
        return Err(TestkitError::ListenerConflict {
            listeners: listeners.into_iter().map(str::to_string).collect(),
            topic: topic.to_string(),
            group: group.to_string(),
        });
    }

    debug!(listeners = bindings.len(), "No conflicting listeners detected");
    Ok(())
}
