//! ========== 日志辅助函数 ==========

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志订阅器
///
/// 默认 info 级别，可用 RUST_LOG 覆盖；verbose 模式下放开到 debug。
pub fn init(config: &Config) {
    let default_level = if config.verbose_logging { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// 打印启动信息
pub fn log_startup(config: &Config) {
    tracing::info!("🚀 论文解读服务启动");
    tracing::info!("   数据目录: {}", config.data_dir);
    tracing::info!("   任务文件: {}", config.task_file);
    tracing::info!("   默认模型: {}", config.default_model_name);
    tracing::info!("   并发上限: {}", config.max_concurrent_papers);
    tracing::info!("   缓存 TTL: {}s", config.cache_ttl_secs);
}

/// 截断长文本用于日志输出（按字符数，不切断多字节字符）
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdefghij", 5), "abcde...");
        // 多字节字符按字符计数
        assert_eq!(truncate_text("论文解读服务", 2), "论文...");
    }
}
