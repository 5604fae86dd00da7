//! 并发捕获存储
//!
//! 按 topic、key 分桶保存消费到的消息，每个桶内保持写入顺序，只追加不删除。
//! 桶的创建通过 `DashMap::entry` 原子完成，每个桶有独立的锁，
//! 不同 key 的写入者不会争用同一把桶锁。

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::record::RecordSnapshot;
use crate::config::CaptureConfig;

type Bucket = Arc<Mutex<Vec<RecordSnapshot>>>;

/// 并发捕获存储
///
/// # 使用示例
/// ```rust,no_run
/// use std::time::Duration;
/// use flare_kafka_testkit::{CaptureStore, RecordSnapshot};
///
/// # async fn example() {
/// let store = CaptureStore::new();
/// store.capture(RecordSnapshot::new("orders", "created").with_key("order-1"));
///
/// let records = store
///     .await_at_least("orders", Some("order-1"), 1, Duration::from_secs(1))
///     .await;
/// assert_eq!(records.len(), 1);
/// # }
/// ```
#[derive(Default)]
pub struct CaptureStore {
    topics: DashMap<String, DashMap<Option<String>, Bucket>>,
    config: CaptureConfig,
}

impl CaptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CaptureConfig) -> Self {
        Self {
            topics: DashMap::new(),
            config,
        }
    }

    /// 捕获一条消息
    ///
    /// 重复投递的消息同样保留
    pub fn capture(&self, record: RecordSnapshot) {
        debug!(
            topic = %record.topic,
            key = ?record.key,
            headers = ?record.headers,
            value = %record.value,
            "Record captured"
        );
        let bucket = self.bucket(&record.topic, &record.key);
        bucket.lock().push(record);
    }

    /// 指定 topic、key 下当前已捕获的消息（按捕获顺序）
    pub fn records(&self, topic: &str, key: Option<&str>) -> Vec<RecordSnapshot> {
        let Some(keys) = self.topics.get(topic) else {
            return Vec::new();
        };
        let key = key.map(str::to_string);
        let bucket = match keys.get(&key) {
            Some(bucket) => Arc::clone(bucket.value()),
            None => return Vec::new(),
        };
        drop(keys);
        bucket.lock().clone()
    }

    /// 指定 topic 下所有 key 的消息
    ///
    /// 不同 key 之间的顺序不保证，同一 key 内保持捕获顺序
    pub fn records_for_topic(&self, topic: &str) -> Vec<RecordSnapshot> {
        let Some(keys) = self.topics.get(topic) else {
            return Vec::new();
        };
        let buckets: Vec<Bucket> = keys.iter().map(|entry| entry.value().clone()).collect();
        drop(keys);
        buckets
            .iter()
            .flat_map(|bucket| bucket.lock().clone())
            .collect()
    }

    /// 已捕获过消息的 topic
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    /// 已捕获的消息总数
    pub fn len(&self) -> usize {
        let buckets: Vec<Bucket> = self
            .topics
            .iter()
            .flat_map(|keys| {
                keys.value()
                    .iter()
                    .map(|entry| entry.value().clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        buckets.iter().map(|bucket| bucket.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 等待指定 topic、key 下至少有 `count` 条消息
    ///
    /// 按配置的间隔轮询；超时后不报错，返回当前已有的消息，由调用方断言
    pub async fn await_at_least(
        &self,
        topic: &str,
        key: Option<&str>,
        count: usize,
        timeout: Duration,
    ) -> Vec<RecordSnapshot> {
        let deadline = Instant::now() + timeout;
        let poll_interval = self.config.poll_interval();
        loop {
            let records = self.records(topic, key);
            if records.len() >= count {
                return records;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(
                    topic,
                    key = ?key,
                    expected = count,
                    actual = records.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Waiting for records timed out"
                );
                return records;
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    /// 返回一个等待器：对任意 topic、key 等待至少 `count` 条消息，最长 `timeout`
    pub fn await_at_most(&self, count: usize, timeout: Duration) -> RecordAwaiter<'_> {
        RecordAwaiter {
            store: self,
            count,
            timeout,
        }
    }

    fn bucket(&self, topic: &str, key: &Option<String>) -> Bucket {
        if let Some(keys) = self.topics.get(topic) {
            if let Some(bucket) = keys.get(key) {
                return Arc::clone(bucket.value());
            }
        }
        let keys = self.topics.entry(topic.to_string()).or_default();
        let bucket = keys.entry(key.clone()).or_default();
        Arc::clone(bucket.value())
    }
}

/// 由 `CaptureStore::await_at_most` 创建的等待器
pub struct RecordAwaiter<'a> {
    store: &'a CaptureStore,
    count: usize,
    timeout: Duration,
}

impl RecordAwaiter<'_> {
    pub async fn records(&self, topic: &str, key: Option<&str>) -> Vec<RecordSnapshot> {
        self.store
            .await_at_least(topic, key, self.count, self.timeout)
            .await
    }
}
