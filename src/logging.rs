use tracing_subscriber::{fmt, EnvFilter};

/// 初始化 tracing 日志系统（控制台输出，RUST_LOG 可调级别）
pub fn init() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    tracing::debug!("日志系统初始化完成");
}
