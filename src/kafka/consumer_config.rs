//! Kafka 捕获消费者配置 Trait
//!
//! 定义捕获消费者的配置接口，允许不同测试提供自己的配置实现

use crate::config::KafkaSettings;

/// Kafka 捕获消费者配置 Trait
pub trait CaptureConsumerConfig: Send + Sync {
    /// Kafka Bootstrap Servers 地址
    fn kafka_bootstrap(&self) -> &str;

    /// Consumer Group ID
    fn consumer_group(&self) -> &str;

    /// 需要捕获的 topic
    fn capture_topics(&self) -> &[String];

    /// 会话超时（毫秒），默认 30000
    fn session_timeout_ms(&self) -> u64 {
        30000
    }

    /// Offset 重置策略，默认 "earliest"
    fn auto_offset_reset(&self) -> &str {
        "earliest"
    }

    /// 最大 fetch 等待时间（毫秒），默认 100，测试场景下尽快拿到消息
    fn fetch_max_wait_ms(&self) -> u64 {
        100
    }

    /// 元数据最大年龄（毫秒），默认 5 分钟
    fn metadata_max_age_ms(&self) -> u64 {
        300000
    }
}

impl CaptureConsumerConfig for KafkaSettings {
    fn kafka_bootstrap(&self) -> &str {
        &self.bootstrap_servers
    }

    fn consumer_group(&self) -> &str {
        &self.capture_group
    }

    fn capture_topics(&self) -> &[String] {
        &self.capture_topics
    }
}
