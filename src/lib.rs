//! Flare Kafka Testkit
//!
//! Helps integration tests of message-driven services wait until the system is
//! fully drained before assertions run: an offset convergence detector over a
//! broker admin interface, and a concurrent capture store for consumed records.

pub mod admin;
pub mod capture;
pub mod config;
pub mod convergence;
pub mod error;
pub mod guard;
pub mod resolver;
pub mod telemetry;
pub mod types;

// Kafka 后端（可选）
#[cfg(feature = "kafka")]
pub mod kafka;

// Re-exports
pub use admin::{BrokerAdmin, InMemoryBroker};
pub use capture::{CaptureStore, RecordAwaiter, RecordSnapshot};
pub use config::{CaptureConfig, ConvergenceConfig, KafkaSettings, TestkitConfig};
pub use convergence::{
    ConvergenceDetector, ConvergenceMemo, ConvergenceOutcome, ConvergenceScope,
    ConvergenceSnapshot, MemoKey, OffsetVerdict, render_snapshot,
};
pub use error::{ErrorCategory, ErrorCode, Result, TestkitError};
pub use guard::{ListenerBinding, ListenerRegistry, detect_conflicting_listeners};
pub use resolver::PartitionResolver;
pub use telemetry::{init_json_logging, init_test_logging};
pub use types::{ConsumerGroupOffsetMap, GroupId, Offset, PartitionOffsetMap, TopicPartition};

// Kafka 后端 re-exports（可选）
#[cfg(feature = "kafka")]
pub use kafka::{
    CaptureConsumer, CaptureConsumerConfig, KafkaAdminConfig, KafkaBrokerAdmin,
    wait_for_partition_assignment,
};
