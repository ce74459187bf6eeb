//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：校验配置、检查浏览器可用、打开目录文件
//! 2. **组装调度器**：真实浏览器驱动 + DOM 提取器 + JSON 目录
//! 3. **执行一次运行**：确定今天的日期和随机源，交给 `RunScheduler`
//! 4. **全局统计**：输出本次运行的汇总

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::browser::{ChromiumSessionFactory, SessionFactory};
use crate::catalog::{Catalog, JsonFileStore};
use crate::config::Config;
use crate::error::AppError;
use crate::orchestrator::scheduler::{RunReport, RunScheduler};
use crate::services::DomLinkExtractor;
use crate::utils::logging::log_startup;

/// 应用主结构
pub struct App {
    config: Config,
    scheduler: RunScheduler<ChromiumSessionFactory, DomLinkExtractor, JsonFileStore>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().map_err(AppError::from)?;
        log_startup(&config);

        // 拿不到浏览器就没必要继续
        let factory = ChromiumSessionFactory::new(&config);
        // 启动 + 关闭各给一个调用超时
        check_browser_within(&factory, config.driver_call_timeout() * 2)
            .await
            .context("无法获取浏览器，请检查 Chrome 是否安装或调试端口是否开启")?;
        info!("✓ 浏览器可用 ({:?} 模式)", config.browser_mode);

        let extractor = DomLinkExtractor::new(&config)?;

        let catalog = Catalog::open(JsonFileStore::new(&config.catalog_path));
        info!(
            "✓ 已加载目录: {} 条，上次同步: {}",
            catalog.len(),
            catalog
                .last_sync_date()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "从未".to_string())
        );

        let scheduler = RunScheduler::new(&config, factory, extractor, catalog);
        Ok(Self { config, scheduler })
    }

    /// 运行应用主逻辑
    pub async fn run(mut self) -> Result<RunReport> {
        let today = chrono::Local::now().date_naive();
        let mut rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        info!("📅 今天: {}", today);
        let report = self.scheduler.run_once(today, &mut rng).await;

        print_final_stats(&report, &self.config);
        Ok(report)
    }
}

/// 带超时的浏览器可用性检查
pub(crate) async fn check_browser_within<F: SessionFactory>(factory: &F, limit: Duration) -> Result<()> {
    match tokio::time::timeout(limit, factory.probe()).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("浏览器 {:?} 内没有响应", limit)),
    }
}

// ========== 日志辅助函数 ==========

fn print_final_stats(report: &RunReport, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 本次运行统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("🔍 发现: {}", report.discovery);
    info!("✅ 已读: {}/{}", report.visited, report.planned);
    info!("🚫 失效: {}", report.invalidated);
    info!("⚠️ 放弃: {}", report.abandoned);
    info!("❌ 失败: {}", report.failed);
    info!("{}", "=".repeat(60));
    if report.unsaved {
        warn!("⚠️ 目录有未保存的修改，请检查 {} 是否可写", config.catalog_path);
    } else {
        info!("\n目录已保存至: {}", config.catalog_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedFactory, SessionScript};

    #[tokio::test(start_paused = true)]
    async fn test_startup_check_gives_up_on_unresponsive_browser() {
        let factory = ScriptedFactory::new().hang_first_opens(1);
        let started = tokio::time::Instant::now();

        let result = check_browser_within(&factory, Duration::from_secs(60)).await;

        assert!(result.is_err());
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_check_gives_up_when_shutdown_hangs() {
        let factory = ScriptedFactory::new().then(SessionScript::new().hang_on_shutdown());
        assert!(check_browser_within(&factory, Duration::from_secs(60)).await.is_err());
        assert_eq!(factory.log().opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_check_succeeds_with_healthy_browser() {
        let factory = ScriptedFactory::new();
        tokio_test::assert_ok!(check_browser_within(&factory, Duration::from_secs(60)).await);
        assert_eq!(factory.log().shutdown, 1);
    }
}
