//! Broker 管理接口
//!
//! 检测器只依赖这里定义的查询接口，不直接接触任何 Kafka 客户端：
//! - `InMemoryBroker`: 确定性的内存实现，用于测试夹具
//! - `KafkaBrokerAdmin`: 基于 rdkafka 的实现（需要 `kafka` feature）

pub mod memory;

pub use memory::InMemoryBroker;

use crate::error::Result;
use crate::types::{ConsumerGroupOffsetMap, GroupId, PartitionOffsetMap, TopicPartition};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Broker 管理查询接口
///
/// 所有调用都可能很慢，也可能失败；调用方不做内部重试
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// 列出集群中的所有 topic
    async fn list_topics(&self) -> Result<BTreeSet<String>>;

    /// 查询每个 topic 的分区数
    async fn describe_topics(&self, topics: &BTreeSet<String>) -> Result<BTreeMap<String, i32>>;

    /// 以 read-committed 隔离级别查询分区末端偏移量
    ///
    /// 未知分区不出现在结果中
    async fn end_offsets(&self, partitions: &BTreeSet<TopicPartition>)
    -> Result<PartitionOffsetMap>;

    /// 列出所有消费组
    async fn list_consumer_groups(&self) -> Result<BTreeSet<GroupId>>;

    /// 查询每个消费组在给定分区上的已提交偏移量
    ///
    /// 没有提交记录的分区不出现在对应组的结果中
    async fn committed_offsets(
        &self,
        groups: &BTreeSet<GroupId>,
        partitions: &BTreeSet<TopicPartition>,
    ) -> Result<ConsumerGroupOffsetMap>;
}
