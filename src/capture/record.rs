//! 捕获的消息快照

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 一条被消费消息的不可变快照
///
/// 在消费时创建一次，此后由捕获存储持有，不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub topic: String,
    /// 消息 key，无 key 的消息单独归为一组
    pub key: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub value: serde_json::Value,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub captured_at: DateTime<Utc>,
}

impl RecordSnapshot {
    /// 创建无 key、无 header 的快照
    pub fn new(topic: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            headers: BTreeMap::new(),
            value: value.into(),
            partition: None,
            offset: None,
            captured_at: Utc::now(),
        }
    }

    /// 从原始字节创建快照
    ///
    /// key 与 header 按 UTF-8 解码（非法字节替换），消息体能解析为 JSON 时保留结构，
    /// 否则按字符串保存，空消息体为 `null`
    pub fn from_raw<'a>(
        topic: impl Into<String>,
        key: Option<&[u8]>,
        payload: Option<&[u8]>,
        headers: impl IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
    ) -> Self {
        let mut snapshot = Self::new(topic, decode_value(payload));
        snapshot.key = key.map(|k| String::from_utf8_lossy(k).into_owned());
        snapshot.headers = headers
            .into_iter()
            .map(|(name, value)| {
                let value = value
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .unwrap_or_default();
                (name.to_string(), value)
            })
            .collect();
        snapshot
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 记录消息在 broker 中的位置
    #[must_use]
    pub fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.partition = Some(partition);
        self.offset = Some(offset);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// 解码消息体
pub fn decode_value(payload: Option<&[u8]>) -> serde_json::Value {
    match payload {
        None => serde_json::Value::Null,
        Some(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_payloads_prefer_json() {
        assert_eq!(decode_value(Some(br#"{"id":7}"#.as_slice())), json!({"id": 7}));
        assert_eq!(decode_value(Some(b"plain text".as_slice())), json!("plain text"));
        assert_eq!(decode_value(None), serde_json::Value::Null);
    }

    #[test]
    fn from_raw_decodes_key_and_headers() {
        let record = RecordSnapshot::from_raw(
            "orders",
            Some(b"order-1".as_slice()),
            Some(br#"{"amount":10}"#.as_slice()),
            [("trace-id", Some(b"abc".as_slice())), ("empty", None)],
        );
        assert_eq!(record.key.as_deref(), Some("order-1"));
        assert_eq!(record.header("trace-id"), Some("abc"));
        assert_eq!(record.header("empty"), Some(""));
        assert_eq!(record.value["amount"], 10);
    }
}
