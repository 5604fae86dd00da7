//! Kafka 管理客户端配置 Trait

use crate::config::KafkaSettings;

/// Kafka 管理客户端配置 Trait
///
/// 任何需要构建 `KafkaBrokerAdmin` 的测试配置都应该实现此 trait
pub trait KafkaAdminConfig: Send + Sync {
    /// Kafka Bootstrap Servers 地址
    fn kafka_bootstrap(&self) -> &str;

    /// 单次管理请求超时（毫秒），默认 5000
    fn request_timeout_ms(&self) -> u64 {
        5000
    }

    /// 偏移量查询使用的隔离级别，默认 "read_committed"
    fn isolation_level(&self) -> &str {
        "read_committed"
    }
}

impl KafkaAdminConfig for KafkaSettings {
    fn kafka_bootstrap(&self) -> &str {
        &self.bootstrap_servers
    }

    fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }
}
