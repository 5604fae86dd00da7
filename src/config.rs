//! Testkit 配置
//!
//! 所有默认值都可以由嵌入的测试框架通过 `with_*` 方法或 TOML 文件覆盖

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TestkitError};

/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 200;
/// 默认两次尝试之间的等待时间（毫秒）
pub const DEFAULT_WAIT_INTERVAL_MS: u64 = 10;
/// 默认捕获存储轮询间隔（毫秒）
pub const DEFAULT_CAPTURE_POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TestkitConfig {
    #[serde(default)]
    pub kafka: Option<KafkaSettings>,
    #[serde(default)]
    pub convergence: ConvergenceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl TestkitConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TestkitConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.convergence.max_attempts == 0 {
            return Err(TestkitError::configuration(
                "convergence.max_attempts must be at least 1",
            ));
        }
        if self.capture.poll_interval_ms == 0 {
            return Err(TestkitError::configuration(
                "capture.poll_interval_ms must be greater than 0",
            ));
        }
        if let Some(kafka) = &self.kafka {
            if kafka.bootstrap_servers.trim().is_empty() {
                return Err(TestkitError::configuration(
                    "kafka.bootstrap_servers must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// Kafka 连接设置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaSettings {
    pub bootstrap_servers: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 捕获消费者订阅的 topic
    #[serde(default)]
    pub capture_topics: Vec<String>,
    #[serde(default = "default_capture_group")]
    pub capture_group: String,
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_capture_group() -> String {
    "test".to_string()
}

/// 收敛检测配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConvergenceConfig {
    /// 最大尝试次数（默认 200）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 两次尝试之间的等待时间，毫秒（默认 10）
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_wait_interval_ms() -> u64 {
    DEFAULT_WAIT_INTERVAL_MS
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_interval_ms: DEFAULT_WAIT_INTERVAL_MS,
        }
    }
}

impl ConvergenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置最大尝试次数（至少为 1）
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// 设置两次尝试之间的等待时间
    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

/// 捕获存储配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// 等待记录时的轮询间隔，毫秒（默认 50）
    #[serde(default = "default_capture_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_capture_poll_interval_ms() -> u64 {
    DEFAULT_CAPTURE_POLL_INTERVAL_MS
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_CAPTURE_POLL_INTERVAL_MS,
        }
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置轮询间隔（最小 1 毫秒）
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = (interval.as_millis() as u64).max(1);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TestkitConfig::from_toml_str("").unwrap();
        assert_eq!(config.convergence.max_attempts, 200);
        assert_eq!(config.convergence.wait_interval(), Duration::from_millis(10));
        assert_eq!(config.capture.poll_interval(), Duration::from_millis(50));
        assert!(config.kafka.is_none());
    }

    #[test]
    fn overrides_from_toml() {
        let config = TestkitConfig::from_toml_str(
            r#"
            [kafka]
            bootstrap_servers = "localhost:9092"
            capture_topics = ["orders", "audit"]

            [convergence]
            max_attempts = 3
            wait_interval_ms = 1
            "#,
        )
        .unwrap();
        let kafka = config.kafka.unwrap();
        assert_eq!(kafka.request_timeout_ms, 5000);
        assert_eq!(kafka.capture_group, "test");
        assert_eq!(kafka.capture_topics, vec!["orders", "audit"]);
        assert_eq!(config.convergence.max_attempts, 3);
        assert_eq!(config.capture.poll_interval_ms, 50);
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = TestkitConfig::from_toml_str("[convergence]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, TestkitError::Configuration(_)));
    }

    #[test]
    fn builders_clamp_values() {
        assert_eq!(ConvergenceConfig::new().with_max_attempts(0).max_attempts, 1);
        let capture = CaptureConfig::new().with_poll_interval(Duration::from_micros(10));
        assert_eq!(capture.poll_interval_ms, 1);
    }
}
