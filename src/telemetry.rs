//! 测试日志初始化
//!
//! 日志级别通过 `RUST_LOG` 控制，例如 `RUST_LOG=flare_kafka_testkit=debug`
//! 可以看到每次尝试的偏移量对比表格。重复调用是安全的。

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 初始化面向终端的日志输出（输出到测试捕获的 writer）
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_test_writer()
        .try_init();
}

/// 初始化 JSON 格式日志，适合 CI 收集
pub fn init_json_logging() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .with_current_span(false)
        .try_init();
}
