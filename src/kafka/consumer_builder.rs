//! Kafka 捕获消费者构建器
//!
//! 构建订阅捕获 topic 的消费者，并提供等待 partition assignment 的工具

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::{ErrorCode, Result, TestkitError};
use crate::guard::{ListenerRegistry, detect_conflicting_listeners};
use crate::kafka::consumer_config::CaptureConsumerConfig;

/// 等待 assignment 时的轮询间隔
const ASSIGNMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 构建捕获消费者并订阅配置中的 topic
///
/// offset 由捕获逻辑在消息写入存储后手动提交
pub fn build_capture_consumer(config: &dyn CaptureConsumerConfig) -> Result<StreamConsumer> {
    if config.capture_topics().is_empty() {
        return Err(TestkitError::configuration(
            "capture consumer requires at least one topic",
        ));
    }

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", config.kafka_bootstrap())
        .set("group.id", config.consumer_group())
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", config.session_timeout_ms().to_string())
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", config.auto_offset_reset())
        .set("isolation.level", "read_committed")
        .set("security.protocol", "plaintext")
        .set("fetch.wait.max.ms", config.fetch_max_wait_ms().to_string())
        .set("metadata.max.age.ms", config.metadata_max_age_ms().to_string())
        .create()?;

    let topics: Vec<&str> = config.capture_topics().iter().map(String::as_str).collect();
    consumer.subscribe(&topics)?;

    info!(
        bootstrap = %config.kafka_bootstrap(),
        group = %config.consumer_group(),
        topics = ?topics,
        "Capture consumer subscribed"
    );
    Ok(consumer)
}

/// 等待消费者至少分配到 `min_partitions` 个 partition
///
/// assignment 只会在消费者被轮询时发生，调用前需要确保消费循环已经在运行
pub async fn wait_for_assignment<C>(
    consumer: &C,
    listener_id: &str,
    min_partitions: usize,
    max_wait: Duration,
) -> Result<usize>
where
    C: Consumer,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let assigned = consumer.assignment()?.count();
        if assigned >= min_partitions {
            let topics: Vec<String> = consumer
                .assignment()?
                .elements()
                .iter()
                .map(|elem| elem.topic().to_string())
                .collect();
            debug!(
                listener = %listener_id,
                partitions = assigned,
                elapsed_ms = started.elapsed().as_millis() as u64,
                topics = ?topics,
                "Waiting for partition assignment succeeded"
            );
            return Ok(assigned);
        }

        if started.elapsed() >= max_wait {
            error!(
                listener = %listener_id,
                partitions = assigned,
                attempts = attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Waiting for partition assignment failed"
            );
            return Err(TestkitError::broker_with_code(
                "assignment",
                ErrorCode::BrokerTimeout,
                format!(
                    "listener '{}' has {} assigned partitions after {:?}, expected at least {}",
                    listener_id, assigned, max_wait, min_partitions
                ),
            ));
        }

        tokio::time::sleep(ASSIGNMENT_POLL_INTERVAL).await;
    }
}

/// 测试开始前的准备：先检查监听器冲突，再等待每个消费者至少分配到一个 partition
pub async fn wait_for_partition_assignment<R, C>(
    registry: &R,
    consumers: &[(&str, &C)],
    max_wait: Duration,
) -> Result<()>
where
    R: ListenerRegistry + ?Sized,
    C: Consumer,
{
    detect_conflicting_listeners(registry)?;

    let started = Instant::now();
    debug!(consumers = consumers.len(), "Waiting for partition assignment is requested");
    for (listener_id, consumer) in consumers {
        wait_for_assignment(*consumer, listener_id, 1, max_wait).await?;
    }
    debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Waiting for partition assignment is finished, every consumer has at least one partition"
    );
    Ok(())
}
