//! 内存 Broker 实现
//!
//! 主要用于测试：偏移量完全由调用方驱动，末端偏移量只能前进，
//! 并记录每类查询的调用次数，方便断言检测器的查询行为。

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::BrokerAdmin;
use crate::error::{Result, TestkitError};
use crate::types::{ConsumerGroupOffsetMap, GroupId, Offset, PartitionOffsetMap, TopicPartition};

/// 管理接口操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdminOperation {
    ListTopics,
    DescribeTopics,
    EndOffsets,
    ListConsumerGroups,
    CommittedOffsets,
}

impl AdminOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminOperation::ListTopics => "list_topics",
            AdminOperation::DescribeTopics => "describe_topics",
            AdminOperation::EndOffsets => "end_offsets",
            AdminOperation::ListConsumerGroups => "list_consumer_groups",
            AdminOperation::CommittedOffsets => "committed_offsets",
        }
    }
}

/// 各类查询的调用次数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminCallCounts {
    pub list_topics: u64,
    pub describe_topics: u64,
    pub end_offsets: u64,
    pub list_consumer_groups: u64,
    pub committed_offsets: u64,
}

#[derive(Default)]
struct BrokerState {
    topics: BTreeMap<String, i32>,
    end_offsets: PartitionOffsetMap,
    groups: BTreeSet<GroupId>,
    commits: ConsumerGroupOffsetMap,
    failures: BTreeMap<AdminOperation, String>,
    calls: AdminCallCounts,
}

/// 内存 Broker
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    /// 创建空的内存 Broker
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建 topic，所有分区末端偏移量从 0 开始
    ///
    /// 已存在的 topic 只会扩容分区，不会重置偏移量
    pub fn create_topic(&self, topic: impl Into<String>, partitions: i32) {
        let topic = topic.into();
        let mut state = self.state.lock();
        let current = state.topics.get(&topic).copied().unwrap_or(0);
        for partition in current..partitions {
            state
                .end_offsets
                .insert(TopicPartition::new(topic.clone(), partition), 0);
        }
        state.topics.insert(topic, current.max(partitions));
    }

    /// 向分区追加 `count` 条记录，返回新的末端偏移量
    pub fn produce(&self, tp: &TopicPartition, count: u32) -> Offset {
        let mut state = self.state.lock();
        let end = state.end_offsets.entry(tp.clone()).or_insert(0);
        *end += Offset::from(count);
        let end = *end;
        if !state.topics.contains_key(&tp.topic) || state.topics[&tp.topic] <= tp.partition {
            state.topics.insert(tp.topic.clone(), tp.partition + 1);
        }
        debug!(partition = %tp, end_offset = end, "Produced records");
        end
    }

    /// 登记一个消费组（尚无任何提交）
    pub fn register_group(&self, group: impl Into<GroupId>) {
        self.state.lock().groups.insert(group.into());
    }

    /// 为消费组提交分区偏移量
    pub fn commit(&self, group: impl Into<GroupId>, tp: &TopicPartition, offset: Offset) {
        let group = group.into();
        let mut state = self.state.lock();
        state.groups.insert(group.clone());
        state
            .commits
            .entry(group)
            .or_default()
            .insert(tp.clone(), offset);
    }

    /// 消费组提交给定 topic 所有分区当前的末端偏移量
    pub fn commit_to_end(&self, group: impl Into<GroupId>, topic: &str) {
        let group = group.into();
        let mut state = self.state.lock();
        let ends: Vec<(TopicPartition, Offset)> = state
            .end_offsets
            .iter()
            .filter(|(tp, _)| tp.topic == topic)
            .map(|(tp, end)| (tp.clone(), *end))
            .collect();
        state.groups.insert(group.clone());
        state.commits.entry(group).or_default().extend(ends);
    }

    /// 当前的末端偏移量
    pub fn end_offset(&self, tp: &TopicPartition) -> Option<Offset> {
        self.state.lock().end_offsets.get(tp).copied()
    }

    /// 让指定操作持续失败，直到 `clear_failure`
    pub fn fail_on(&self, operation: AdminOperation, reason: impl Into<String>) {
        self.state.lock().failures.insert(operation, reason.into());
    }

    /// 取消指定操作的失败注入
    pub fn clear_failure(&self, operation: AdminOperation) {
        self.state.lock().failures.remove(&operation);
    }

    /// 各类查询的累计调用次数
    pub fn calls(&self) -> AdminCallCounts {
        self.state.lock().calls
    }

    fn begin(&self, operation: AdminOperation) -> Result<parking_lot::MutexGuard<'_, BrokerState>> {
        let mut state = self.state.lock();
        match operation {
            AdminOperation::ListTopics => state.calls.list_topics += 1,
            AdminOperation::DescribeTopics => state.calls.describe_topics += 1,
            AdminOperation::EndOffsets => state.calls.end_offsets += 1,
            AdminOperation::ListConsumerGroups => state.calls.list_consumer_groups += 1,
            AdminOperation::CommittedOffsets => state.calls.committed_offsets += 1,
        }
        if let Some(reason) = state.failures.get(&operation) {
            return Err(TestkitError::broker(operation.as_str(), reason.clone()));
        }
        Ok(state)
    }
}

#[async_trait]
impl BrokerAdmin for InMemoryBroker {
    async fn list_topics(&self) -> Result<BTreeSet<String>> {
        let state = self.begin(AdminOperation::ListTopics)?;
        Ok(state.topics.keys().cloned().collect())
    }

    async fn describe_topics(&self, topics: &BTreeSet<String>) -> Result<BTreeMap<String, i32>> {
        let state = self.begin(AdminOperation::DescribeTopics)?;
        topics
            .iter()
            .map(|topic| match state.topics.get(topic) {
                Some(count) => Ok((topic.clone(), *count)),
                None => Err(TestkitError::broker(
                    AdminOperation::DescribeTopics.as_str(),
                    format!("unknown topic '{}'", topic),
                )),
            })
            .collect()
    }

    async fn end_offsets(
        &self,
        partitions: &BTreeSet<TopicPartition>,
    ) -> Result<PartitionOffsetMap> {
        let state = self.begin(AdminOperation::EndOffsets)?;
        Ok(partitions
            .iter()
            .filter_map(|tp| state.end_offsets.get(tp).map(|end| (tp.clone(), *end)))
            .collect())
    }

    async fn list_consumer_groups(&self) -> Result<BTreeSet<GroupId>> {
        let state = self.begin(AdminOperation::ListConsumerGroups)?;
        Ok(state.groups.clone())
    }

    async fn committed_offsets(
        &self,
        groups: &BTreeSet<GroupId>,
        partitions: &BTreeSet<TopicPartition>,
    ) -> Result<ConsumerGroupOffsetMap> {
        let state = self.begin(AdminOperation::CommittedOffsets)?;
        let mut result = ConsumerGroupOffsetMap::new();
        for group in groups {
            let Some(commits) = state.commits.get(group) else {
                continue;
            };
            let committed: PartitionOffsetMap = partitions
                .iter()
                .filter_map(|tp| commits.get(tp).map(|offset| (tp.clone(), *offset)))
                .collect();
            if !committed.is_empty() {
                result.insert(group.clone(), committed);
            }
        }
        Ok(result)
    }
}
