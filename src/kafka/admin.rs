//! 基于 rdkafka 的 Broker 管理接口实现
//!
//! librdkafka 的元数据、水位与已提交偏移量查询都是阻塞调用，统一放到
//! `spawn_blocking` 中执行。已提交偏移量需要以对应消费组的身份查询，
//! 每个消费组懒加载一个不加入组的 `BaseConsumer`。
//!
//! 每个缓存的客户端都持有 librdkafka 的后台线程：列出消费组时会关闭已不存在的
//! 消费组对应的客户端，也可以通过 `forget_group` 主动释放。

use async_trait::async_trait;
use dashmap::DashMap;
use rdkafka::Offset as KafkaOffset;
use rdkafka::TopicPartitionList;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaResult;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::admin_config::KafkaAdminConfig;
use crate::admin::BrokerAdmin;
use crate::error::conversions::broker_error_code;
use crate::error::{Result, TestkitError};
use crate::types::{ConsumerGroupOffsetMap, GroupId, PartitionOffsetMap, TopicPartition};

/// 元数据客户端使用的消费组，不会加入该组
const METADATA_GROUP_ID: &str = "flare-kafka-testkit-admin";

/// 基于 rdkafka 的 Broker 管理接口
pub struct KafkaBrokerAdmin {
    bootstrap: String,
    isolation_level: String,
    timeout: Duration,
    metadata: Arc<BaseConsumer>,
    group_clients: DashMap<GroupId, Arc<BaseConsumer>>,
}

impl KafkaBrokerAdmin {
    /// 构建管理客户端
    pub fn new(config: &dyn KafkaAdminConfig) -> Result<Self> {
        let metadata = build_query_consumer(
            config.kafka_bootstrap(),
            METADATA_GROUP_ID,
            config.isolation_level(),
        )?;

        info!(
            bootstrap = %config.kafka_bootstrap(),
            timeout_ms = config.request_timeout_ms(),
            isolation_level = %config.isolation_level(),
            "Kafka admin client created successfully"
        );

        Ok(Self {
            bootstrap: config.kafka_bootstrap().to_string(),
            isolation_level: config.isolation_level().to_string(),
            timeout: Duration::from_millis(config.request_timeout_ms()),
            metadata: Arc::new(metadata),
            group_clients: DashMap::new(),
        })
    }

    fn group_client(&self, group: &str) -> Result<Arc<BaseConsumer>> {
        if let Some(client) = self.group_clients.get(group) {
            return Ok(Arc::clone(client.value()));
        }
        let client = Arc::new(build_query_consumer(
            &self.bootstrap,
            group,
            &self.isolation_level,
        )?);
        let entry = self
            .group_clients
            .entry(group.to_string())
            .or_insert(client);
        Ok(Arc::clone(entry.value()))
    }

    /// 释放指定消费组的查询客户端
    pub fn forget_group(&self, group: &str) -> bool {
        self.group_clients.remove(group).is_some()
    }

    /// 当前缓存的消费组查询客户端数量
    pub fn cached_group_clients(&self) -> usize {
        self.group_clients.len()
    }

    // 只保留 broker 上仍然存在的消费组的客户端
    fn retain_group_clients(&self, live: &BTreeSet<GroupId>) {
        let before = self.group_clients.len();
        self.group_clients.retain(|group, _| live.contains(group));
        let evicted = before - self.group_clients.len();
        if evicted > 0 {
            debug!(
                evicted,
                cached = self.group_clients.len(),
                "Released query clients of vanished groups"
            );
        }
    }

    async fn fetch_topic_partition_counts(&self) -> Result<BTreeMap<String, i32>> {
        let client = Arc::clone(&self.metadata);
        let timeout = self.timeout;
        run_blocking("describe_topics", move || {
            let metadata = client.fetch_metadata(None, timeout)?;
            Ok(metadata
                .topics()
                .iter()
                .filter(|topic| topic.error().is_none())
                .map(|topic| (topic.name().to_string(), topic.partitions().len() as i32))
                .collect())
        })
        .await
    }
}

#[async_trait]
impl BrokerAdmin for KafkaBrokerAdmin {
    async fn list_topics(&self) -> Result<BTreeSet<String>> {
        let counts = self.fetch_topic_partition_counts().await?;
        // 与 Kafka AdminClient 默认行为一致，不包含内部 topic
        Ok(counts
            .into_keys()
            .filter(|name| !name.starts_with("__"))
            .collect())
    }

    async fn describe_topics(&self, topics: &BTreeSet<String>) -> Result<BTreeMap<String, i32>> {
        let counts = self.fetch_topic_partition_counts().await?;
        topics
            .iter()
            .map(|topic| match counts.get(topic) {
                Some(count) => Ok((topic.clone(), *count)),
                None => Err(TestkitError::broker(
                    "describe_topics",
                    format!("unknown topic '{}'", topic),
                )),
            })
            .collect()
    }

    async fn end_offsets(
        &self,
        partitions: &BTreeSet<TopicPartition>,
    ) -> Result<PartitionOffsetMap> {
        let client = Arc::clone(&self.metadata);
        let partitions = partitions.clone();
        let timeout = self.timeout;
        run_blocking("end_offsets", move || {
            let mut offsets = PartitionOffsetMap::new();
            for tp in partitions {
                let (_low, high) = client.fetch_watermarks(&tp.topic, tp.partition, timeout)?;
                offsets.insert(tp, high);
            }
            Ok(offsets)
        })
        .await
    }

    async fn list_consumer_groups(&self) -> Result<BTreeSet<GroupId>> {
        let client = Arc::clone(&self.metadata);
        let timeout = self.timeout;
        let groups = run_blocking("list_consumer_groups", move || {
            let list = client.fetch_group_list(None, timeout)?;
            Ok(list
                .groups()
                .iter()
                .map(|group| group.name().to_string())
                .collect::<BTreeSet<_>>())
        })
        .await?;
        self.retain_group_clients(&groups);
        debug!(groups = groups.len(), "Listed consumer groups");
        Ok(groups)
    }

    async fn committed_offsets(
        &self,
        groups: &BTreeSet<GroupId>,
        partitions: &BTreeSet<TopicPartition>,
    ) -> Result<ConsumerGroupOffsetMap> {
        let mut result = ConsumerGroupOffsetMap::new();
        for group in groups {
            let client = self.group_client(group)?;
            let partitions = partitions.clone();
            let timeout = self.timeout;
            let committed = run_blocking("committed_offsets", move || {
                let mut tpl = TopicPartitionList::new();
                for tp in &partitions {
                    tpl.add_partition(&tp.topic, tp.partition);
                }
                let committed = client.committed_offsets(tpl, timeout)?;
                Ok(committed
                    .elements()
                    .iter()
                    .filter_map(|elem| match elem.offset() {
                        KafkaOffset::Offset(offset) => Some((
                            TopicPartition::new(elem.topic(), elem.partition()),
                            offset,
                        )),
                        _ => None,
                    })
                    .collect::<PartitionOffsetMap>())
            })
            .await?;
            if !committed.is_empty() {
                result.insert(group.clone(), committed);
            }
        }
        Ok(result)
    }
}

fn build_query_consumer(
    bootstrap: &str,
    group_id: &str,
    isolation_level: &str,
) -> Result<BaseConsumer> {
    let consumer: BaseConsumer = ClientConfig::new()
        .set("bootstrap.servers", bootstrap)
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("enable.partition.eof", "false")
        .set("isolation.level", isolation_level)
        .set("security.protocol", "plaintext")
        .create()
        .map_err(|e| {
            TestkitError::broker_with_code("create_client", broker_error_code(&e), e.to_string())
        })?;
    Ok(consumer)
}

async fn run_blocking<T, F>(operation: &'static str, query: F) -> Result<T>
where
    F: FnOnce() -> KafkaResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(query)
        .await
        .map_err(|e| TestkitError::broker(operation, format!("blocking query failed: {}", e)))?
        .map_err(|e| TestkitError::broker_with_code(operation, broker_error_code(&e), e.to_string()))
}
