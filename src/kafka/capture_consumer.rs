//! Kafka 捕获消费者
//!
//! 把订阅 topic 上的每条消息转换为 `RecordSnapshot` 写入捕获存储，再提交 offset，
//! 这样捕获消费组本身也会参与偏移量收敛检测

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::consumer_builder::{build_capture_consumer, wait_for_assignment};
use super::consumer_config::CaptureConsumerConfig;
use crate::capture::{CaptureStore, RecordSnapshot};
use crate::error::Result;

/// Kafka 捕获消费者
pub struct CaptureConsumer {
    listener_id: String,
    consumer: StreamConsumer,
    store: Arc<CaptureStore>,
}

impl CaptureConsumer {
    /// 构建并订阅捕获 topic
    pub fn new(config: &dyn CaptureConsumerConfig, store: Arc<CaptureStore>) -> Result<Self> {
        Ok(Self {
            listener_id: format!("record-captor-{}", config.consumer_group()),
            consumer: build_capture_consumer(config)?,
            store,
        })
    }

    pub fn listener_id(&self) -> &str {
        &self.listener_id
    }

    pub fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }

    pub fn store(&self) -> &Arc<CaptureStore> {
        &self.store
    }

    /// 等待至少分配到一个 partition（需要 `run` 已在运行）
    pub async fn wait_for_assignment(&self, max_wait: Duration) -> Result<usize> {
        wait_for_assignment(&self.consumer, &self.listener_id, 1, max_wait).await
    }

    /// 消费循环，收到关闭信号后退出
    pub async fn run(&self, mut shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        info!(listener = %self.listener_id, "Capture consumer started");
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!(listener = %self.listener_id, "Capture consumer shutdown signal received");
                    return Ok(());
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => {
                        self.store.capture(snapshot_from_message(&message));
                        if let Err(err) = self.consumer.commit_message(&message, CommitMode::Async) {
                            warn!(
                                error = %err,
                                topic = %message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                "Failed to commit captured record"
                            );
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, listener = %self.listener_id, "Failed to receive Kafka message");
                    }
                },
            }
        }
    }
}

/// 把 Kafka 消息转换为快照
pub fn snapshot_from_message(message: &BorrowedMessage<'_>) -> RecordSnapshot {
    let headers: Vec<(&str, Option<&[u8]>)> = message
        .headers()
        .map(|headers| headers.iter().map(|h| (h.key, h.value)).collect())
        .unwrap_or_default();
    RecordSnapshot::from_raw(message.topic(), message.key(), message.payload(), headers)
        .with_position(message.partition(), message.offset())
}
