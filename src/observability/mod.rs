//! 可观测性：tracing 日志初始化
//!
//! 日志写到 stderr，stdout 只输出运行结果（JSON），便于管道处理。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 默认级别 info，可通过 RUST_LOG 覆盖；重复初始化时静默忽略
pub fn init() {
    init_with_default("info");
}

pub fn init_with_default(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
