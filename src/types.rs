//! 公共类型定义

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 偏移量（与 Kafka 一致使用 i64）
pub type Offset = i64;

/// 消费组 ID
pub type GroupId = String;

/// 分区 -> 日志末端偏移量
pub type PartitionOffsetMap = BTreeMap<TopicPartition, Offset>;

/// 消费组 -> 该组已提交的分区偏移量（只包含有提交记录的分区）
pub type ConsumerGroupOffsetMap = BTreeMap<GroupId, PartitionOffsetMap>;

/// Topic 分区
///
/// 按 (topic, partition) 排序，分区集合因此有唯一的规范形式
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// 计算偏移量总和
pub fn offsets_total(offsets: &PartitionOffsetMap) -> Offset {
    offsets.values().sum()
}
