/// 日志工具模块
///
/// 提供日志初始化和输出格式化的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志（`RUST_LOG` 优先，默认 info）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 信息流抽样阅读");
    info!("🌐 信息流: {}", config.feed_url);
    info!("📁 目录文件: {}", config.catalog_path);
    info!(
        "📊 每次阅读: {}-{} 篇，发现最多重试 {} 次",
        config.min_per_run, config.max_per_run, config.max_retries
    );
    if let Some(seed) = config.rng_seed {
        info!("🎲 固定随机种子: {}", seed);
    }
    info!("{}", "=".repeat(60));
}

/// 截断文本用于日志显示（按字符计）
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短标题", 10), "短标题");
        assert_eq!(truncate_text("一二三四五六", 3), "一二三...");
    }
}
