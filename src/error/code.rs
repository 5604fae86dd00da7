//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: Broker 访问相关错误
/// - 2000-2999: 收敛等待相关错误
/// - 3000-3999: 配置相关错误
/// - 8000-8999: 序列化相关错误
/// - 9000-9999: 通用错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // Broker 访问相关错误 (1000-1999)
    // ============================================================
    BrokerRequestFailed = 1000,
    BrokerTimeout = 1001,
    BrokerUnavailable = 1002,

    // ============================================================
    // 收敛等待相关错误 (2000-2999)
    // ============================================================
    ConvergenceTimeout = 2000,
    WaitCancelled = 2001,

    // ============================================================
    // 配置相关错误 (3000-3999)
    // ============================================================
    ConfigurationError = 3000,
    ListenerConflict = 3001,

    // ============================================================
    // 序列化相关错误 (8000-8999)
    // ============================================================
    SerializationError = 8000,

    // ============================================================
    // 通用错误 (9000-9999)
    // ============================================================
    IoError = 9000,
    UnknownError = 9999,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 从数字值创建错误代码
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1000 => Some(ErrorCode::BrokerRequestFailed),
            1001 => Some(ErrorCode::BrokerTimeout),
            1002 => Some(ErrorCode::BrokerUnavailable),
            2000 => Some(ErrorCode::ConvergenceTimeout),
            2001 => Some(ErrorCode::WaitCancelled),
            3000 => Some(ErrorCode::ConfigurationError),
            3001 => Some(ErrorCode::ListenerConflict),
            8000 => Some(ErrorCode::SerializationError),
            9000 => Some(ErrorCode::IoError),
            9999 => Some(ErrorCode::UnknownError),
            _ => None,
        }
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BrokerRequestFailed => "BROKER_REQUEST_FAILED",
            ErrorCode::BrokerTimeout => "BROKER_TIMEOUT",
            ErrorCode::BrokerUnavailable => "BROKER_UNAVAILABLE",
            ErrorCode::ConvergenceTimeout => "CONVERGENCE_TIMEOUT",
            ErrorCode::WaitCancelled => "WAIT_CANCELLED",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::ListenerConflict => "LISTENER_CONFLICT",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// 获取错误代码的类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Broker,
            2000..=2999 => ErrorCategory::Convergence,
            3000..=3999 => ErrorCategory::Configuration,
            8000..=8999 => ErrorCategory::Serialization,
            _ => ErrorCategory::General,
        }
    }

    /// 判断是否为可重试的错误
    ///
    /// 检测器本身从不重试 Broker 错误，此标记供调用方决定是否整体重跑
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::BrokerTimeout | ErrorCode::BrokerUnavailable | ErrorCode::ConvergenceTimeout
        )
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Broker,
    Convergence,
    Configuration,
    Serialization,
    General,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Broker => write!(f, "BROKER"),
            ErrorCategory::Convergence => write!(f, "CONVERGENCE"),
            ErrorCategory::Configuration => write!(f, "CONFIGURATION"),
            ErrorCategory::Serialization => write!(f, "SERIALIZATION"),
            ErrorCategory::General => write!(f, "GENERAL"),
        }
    }
}
