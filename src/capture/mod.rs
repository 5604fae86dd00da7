//! 消息捕获模块
//!
//! 消费回调把每条消息交给 `CaptureStore::capture`，测试断言再从存储中读取

pub mod record;
pub mod store;

pub use record::{RecordSnapshot, decode_value};
pub use store::{CaptureStore, RecordAwaiter};
