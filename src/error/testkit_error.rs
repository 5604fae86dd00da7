//! Testkit 统一错误类型

use super::code::ErrorCode;
use crate::convergence::ConvergenceSnapshot;
use thiserror::Error;

/// Testkit 统一错误类型
#[derive(Error, Debug)]
pub enum TestkitError {
    /// 超过最大尝试次数仍未收敛，携带最后一次的诊断快照
    #[error("offsets did not converge after {attempts} attempts\n{snapshot}")]
    ConvergenceTimeout {
        attempts: u32,
        snapshot: Box<ConvergenceSnapshot>,
    },

    /// Broker 管理接口调用失败（不在内部重试）
    #[error("broker {operation} failed: {reason}")]
    Broker {
        operation: &'static str,
        code: ErrorCode,
        reason: String,
    },

    /// 等待间隔中收到取消请求
    #[error("convergence wait cancelled during attempt {attempt}")]
    Cancelled { attempt: u32 },

    /// 同一消费组内多个监听器订阅了同一 topic
    #[error(
        "detected multiple listeners ({}) consuming topic '{topic}' within the same group '{group}'; \
         each topic must be consumed by a unique group or listener",
        .listeners.join(", ")
    )]
    ListenerConflict {
        listeners: Vec<String>,
        topic: String,
        group: String,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(String),
}

impl TestkitError {
    /// 创建 Broker 请求失败错误
    pub fn broker(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::broker_with_code(operation, ErrorCode::BrokerRequestFailed, reason)
    }

    /// 创建带指定错误代码的 Broker 错误
    pub fn broker_with_code(
        operation: &'static str,
        code: ErrorCode,
        reason: impl Into<String>,
    ) -> Self {
        TestkitError::Broker {
            operation,
            code,
            reason: reason.into(),
        }
    }

    /// 创建配置错误
    pub fn configuration(reason: impl Into<String>) -> Self {
        TestkitError::Configuration(reason.into())
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            TestkitError::ConvergenceTimeout { .. } => ErrorCode::ConvergenceTimeout,
            TestkitError::Broker { code, .. } => *code,
            TestkitError::Cancelled { .. } => ErrorCode::WaitCancelled,
            TestkitError::ListenerConflict { .. } => ErrorCode::ListenerConflict,
            TestkitError::Configuration(_) => ErrorCode::ConfigurationError,
            TestkitError::Serialization(_) => ErrorCode::SerializationError,
            TestkitError::Io(_) => ErrorCode::IoError,
        }
    }

    /// 超时错误携带的最后一次快照
    pub fn snapshot(&self) -> Option<&ConvergenceSnapshot> {
        match self {
            TestkitError::ConvergenceTimeout { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, TestkitError>;
