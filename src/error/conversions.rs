//! 错误类型转换实现
//!
//! 提供各种错误类型之间的转换

use super::TestkitError;
use std::io;

impl From<io::Error> for TestkitError {
    fn from(err: io::Error) -> Self {
        TestkitError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TestkitError {
    fn from(err: serde_json::Error) -> Self {
        TestkitError::Serialization(format!("JSON 序列化错误: {}", err))
    }
}

impl From<toml::de::Error> for TestkitError {
    fn from(err: toml::de::Error) -> Self {
        TestkitError::Configuration(format!("TOML 解析错误: {}", err))
    }
}

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for TestkitError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        TestkitError::broker_with_code("request", broker_error_code(&err), err.to_string())
    }
}

/// 根据 librdkafka 错误码映射到 Testkit 错误代码
#[cfg(feature = "kafka")]
pub(crate) fn broker_error_code(err: &rdkafka::error::KafkaError) -> super::ErrorCode {
    use super::ErrorCode;
    use rdkafka::error::RDKafkaErrorCode;

    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::OperationTimedOut) | Some(RDKafkaErrorCode::RequestTimedOut) => {
            ErrorCode::BrokerTimeout
        }
        Some(RDKafkaErrorCode::BrokerTransportFailure)
        | Some(RDKafkaErrorCode::AllBrokersDown)
        | Some(RDKafkaErrorCode::BrokerNotAvailable) => ErrorCode::BrokerUnavailable,
        _ => ErrorCode::BrokerRequestFailed,
    }
}
