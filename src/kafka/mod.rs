//! Kafka 后端模块
//!
//! 提供基于 rdkafka 的 Broker 管理接口实现和捕获消费者
//!
//! 此模块需要启用 `kafka` feature 才能使用

pub mod admin;
pub mod admin_config;
pub mod capture_consumer;
pub mod consumer_builder;
pub mod consumer_config;

pub use admin::KafkaBrokerAdmin;
pub use admin_config::KafkaAdminConfig;
pub use capture_consumer::{CaptureConsumer, snapshot_from_message};
pub use consumer_builder::{build_capture_consumer, wait_for_assignment, wait_for_partition_assignment};
pub use consumer_config::CaptureConsumerConfig;
