//! 分区与消费组解析

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::admin::BrokerAdmin;
use crate::error::Result;
use crate::types::{GroupId, TopicPartition};

/// 通过 Broker 管理接口把 topic 名解析为分区集合，并列出活跃消费组
#[derive(Clone)]
pub struct PartitionResolver {
    admin: Arc<dyn BrokerAdmin>,
}

impl PartitionResolver {
    pub fn new(admin: Arc<dyn BrokerAdmin>) -> Self {
        Self { admin }
    }

    /// 集群中的所有 topic
    pub async fn all_topics(&self) -> Result<BTreeSet<String>> {
        self.admin.list_topics().await
    }

    /// 查询每个 topic 的分区数，并展开为 0..count-1 的分区集合
    pub async fn partitions_for_topics(
        &self,
        topics: &BTreeSet<String>,
    ) -> Result<BTreeSet<TopicPartition>> {
        if topics.is_empty() {
            return Ok(BTreeSet::new());
        }
        let counts = self.admin.describe_topics(topics).await?;
        let partitions: BTreeSet<TopicPartition> = counts
            .iter()
            .flat_map(|(topic, count)| (0..*count).map(move |p| TopicPartition::new(topic.clone(), p)))
            .collect();
        debug!(
            topics = topics.len(),
            partitions = partitions.len(),
            "Resolved topic partitions"
        );
        Ok(partitions)
    }

    /// 集群已知的所有消费组
    pub async fn active_consumer_groups(&self) -> Result<BTreeSet<GroupId>> {
        self.admin.list_consumer_groups().await
    }
}
