//! 重试编排 - 编排层
//!
//! - `run_discovery`：发现流程最多尝试 `max_retries` 次，每次都用全新的浏览器会话；
//!   两次尝试之间按 `base * 3^(n-1) + 随机抖动` 等待。全部失败时目录保持原样。
//! - `run_visit`：单篇阅读只尝试一次，失败直接跳过。
//!
//! 打开会话、关闭页面、结束会话同样受 `call_timeout` 约束，浏览器卡死不会拖住整次运行。

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use chrono::NaiveDate;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::browser::{
    bounded, settle_within, BrowserSession, DriverOutcome, Extractor, PageMetrics, SessionFactory,
};
use crate::catalog::{Catalog, CatalogStore};
use crate::config::Config;
use crate::services::{DiscoveryPolicy, DurationModel};
use crate::workflow::{ConvergenceLoop, ConvergenceReport, TerminationReason, VisitCtx};

/// 单次发现尝试的失败类别
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryFailure {
    /// 超时、连接失败、浏览器启动失败等
    Transient(String),
    /// 遇到验证页面
    Blocked,
    /// 正常结束但一条都没发现（页面结构可能变了）
    Empty,
}

impl fmt::Display for DiscoveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryFailure::Transient(reason) => write!(f, "临时失败: {}", reason),
            DiscoveryFailure::Blocked => write!(f, "被拦截"),
            DiscoveryFailure::Empty => write!(f, "结果为空"),
        }
    }
}

/// 发现流程的最终结果
#[derive(Debug, Clone)]
pub enum DiscoveryOutcome {
    Synced {
        report: ConvergenceReport,
        added: usize,
        attempts: u32,
    },
    Failed {
        attempts: u32,
        last_failure: DiscoveryFailure,
    },
}

impl DiscoveryOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, DiscoveryOutcome::Synced { .. })
    }
}

/// 单篇阅读的结果
#[derive(Debug, Clone, PartialEq)]
pub enum VisitOutcome {
    /// 读完并已记录
    Read { dwell: Duration },
    /// 内容已删除，条目已标记失效
    Invalidated,
    /// 遇到验证页面，放弃本篇，条目状态不变
    Abandoned,
    /// 其他失败（超时、连接中断），跳过
    Failed(String),
}

/// 重试编排器
pub struct RetryOrchestrator<F, E> {
    factory: F,
    extractor: E,
    feed_url: String,
    warmup_url: Option<String>,
    max_retries: u32,
    retry_base_delay: Duration,
    retry_jitter_ms: u64,
    call_timeout: Duration,
    debug_dir: Option<PathBuf>,
    duration_model: DurationModel,
}

type PageOf<F> = <<F as SessionFactory>::Session as BrowserSession>::Page;

impl<F, E> RetryOrchestrator<F, E>
where
    F: SessionFactory,
    E: Extractor<<F::Session as BrowserSession>::Page>,
{
    pub fn new(factory: F, extractor: E, config: &Config) -> Self {
        Self {
            factory,
            extractor,
            feed_url: config.feed_url.clone(),
            warmup_url: config.warmup_url.clone(),
            max_retries: config.max_retries.max(1),
            retry_base_delay: Duration::from_secs(config.retry_base_delay_secs),
            retry_jitter_ms: config.retry_jitter_ms,
            call_timeout: config.driver_call_timeout(),
            debug_dir: config.debug_artifact_dir.as_ref().map(PathBuf::from),
            duration_model: DurationModel::new(config),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let factor = 3u32.saturating_pow(attempt.saturating_sub(1));
        let jitter = if self.retry_jitter_ms > 0 {
            rng.random_range(0..=self.retry_jitter_ms)
        } else {
            0
        };
        self.retry_base_delay.saturating_mul(factor) + Duration::from_millis(jitter)
    }

    // ========== 会话生命周期 ==========

    async fn open_session(&self) -> anyhow::Result<F::Session> {
        match tokio::time::timeout(self.call_timeout, self.factory.open()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("等待浏览器超时 ({:?})", self.call_timeout)),
        }
    }

    async fn close_page(&self, session: &mut F::Session, page: PageOf<F>) {
        settle_within(self.call_timeout, "关闭页面", session.close(page)).await;
    }

    async fn end_session(&self, session: F::Session) {
        settle_within(self.call_timeout, "结束浏览器会话", session.shutdown()).await;
    }

    // ========== 发现 ==========

    /// 带重试的发现流程；成功时合并进目录并记录同步日期
    pub async fn run_discovery<S, R>(
        &self,
        catalog: &mut Catalog<S>,
        policy: &DiscoveryPolicy,
        today: NaiveDate,
        rng: &mut R,
    ) -> DiscoveryOutcome
    where
        S: CatalogStore,
        R: Rng + ?Sized,
    {
        let mut last_failure = DiscoveryFailure::Empty;

        for attempt in 1..=self.max_retries {
            info!("[发现 第{}次] 🔍 开始 (最多 {} 次)", attempt, self.max_retries);

            match self.discovery_attempt(policy, attempt).await {
                Ok(report) => {
                    let added = catalog.merge(&report.items);
                    catalog.mark_synced(today);
                    info!(
                        "[发现 第{}次] ✅ 完成: 发现 {} 条，新增 {} 条，{} ({} 轮)",
                        attempt,
                        report.items.len(),
                        added,
                        report.reason,
                        report.rounds
                    );
                    return DiscoveryOutcome::Synced {
                        report,
                        added,
                        attempts: attempt,
                    };
                }
                Err(failure) => {
                    log_discovery_failure(attempt, &failure);
                    last_failure = failure;
                }
            }

            if attempt < self.max_retries {
                let delay = self.backoff_delay(attempt, rng);
                info!("[发现 第{}次] ⏳ {:.1} 秒后重试...", attempt, delay.as_secs_f64());
                sleep(delay).await;
            }
        }

        error!(
            "❌ 发现流程失败，已尝试 {} 次，最后一次: {}",
            self.max_retries, last_failure
        );
        DiscoveryOutcome::Failed {
            attempts: self.max_retries,
            last_failure,
        }
    }

    async fn discovery_attempt(
        &self,
        policy: &DiscoveryPolicy,
        attempt: u32,
    ) -> Result<ConvergenceReport, DiscoveryFailure> {
        let mut session = self
            .open_session()
            .await
            .map_err(|e| DiscoveryFailure::Transient(format!("打开浏览器会话失败: {:#}", e)))?;
        let result = self.discover_in(&mut session, policy, attempt).await;
        self.end_session(session).await;
        result
    }

    async fn discover_in(
        &self,
        session: &mut F::Session,
        policy: &DiscoveryPolicy,
        attempt: u32,
    ) -> Result<ConvergenceReport, DiscoveryFailure> {
        if let Some(warmup_url) = &self.warmup_url {
            match bounded(self.call_timeout, "预热导航", session.navigate(warmup_url)).await {
                DriverOutcome::Success(page) => self.close_page(session, page).await,
                DriverOutcome::Blocked => return Err(DiscoveryFailure::Blocked),
                DriverOutcome::NotFound => warn!("⚠️ 预热页面不存在，跳过: {}", warmup_url),
                DriverOutcome::TransientFailure(reason) => {
                    warn!("⚠️ 预热导航失败，继续: {}", reason)
                }
            }
        }

        let page = match bounded(self.call_timeout, "打开信息流", session.navigate(&self.feed_url)).await
        {
            DriverOutcome::Success(page) => page,
            DriverOutcome::Blocked => return Err(DiscoveryFailure::Blocked),
            DriverOutcome::NotFound => {
                return Err(DiscoveryFailure::Transient(format!(
                    "信息流页面不存在: {}",
                    self.feed_url
                )))
            }
            DriverOutcome::TransientFailure(reason) => {
                return Err(DiscoveryFailure::Transient(reason))
            }
        };

        let result = match ConvergenceLoop::new(*policy, self.call_timeout)
            .run(session, &page, &self.extractor)
            .await
        {
            Err(e) => Err(DiscoveryFailure::Transient(format!("{:#}", e))),
            Ok(report) if report.reason == TerminationReason::Blocked => {
                Err(DiscoveryFailure::Blocked)
            }
            Ok(report) if report.is_empty() => Err(DiscoveryFailure::Empty),
            Ok(report) => Ok(report),
        };

        if result.is_err() {
            self.save_failure_artifacts(session, &page, attempt).await;
        }
        self.close_page(session, page).await;
        result
    }

    /// 发现失败时留下页面现场，保存失败只记日志
    async fn save_failure_artifacts(
        &self,
        session: &mut F::Session,
        page: &PageOf<F>,
        attempt: u32,
    ) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let label = format!(
            "discovery-{}-attempt{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            attempt
        );
        let saving = session.save_debug_artifacts(page, dir, &label);
        match tokio::time::timeout(self.call_timeout, saving).await {
            Ok(Ok(files)) => {
                for file in files {
                    info!("[发现 第{}次] 🧾 已保存调试文件: {}", attempt, file.display());
                }
            }
            Ok(Err(e)) => warn!("[发现 第{}次] ⚠️ 保存调试文件失败: {:#}", attempt, e),
            Err(_) => warn!("[发现 第{}次] ⚠️ 保存调试文件超时", attempt),
        }
    }

    // ========== 阅读 ==========

    /// 单次阅读，不重试
    pub async fn run_visit<S, R>(
        &self,
        catalog: &mut Catalog<S>,
        ctx: &VisitCtx,
        today: NaiveDate,
        rng: &mut R,
    ) -> VisitOutcome
    where
        S: CatalogStore,
        R: Rng + ?Sized,
    {
        info!("{} 📖 打开: {} ({})", ctx, ctx.title_preview(), ctx.url);

        let mut session = match self.open_session().await {
            Ok(session) => session,
            Err(e) => {
                error!("{} ❌ 打开浏览器会话失败: {:#}", ctx, e);
                return VisitOutcome::Failed(format!("打开浏览器会话失败: {:#}", e));
            }
        };
        let outcome = self.visit_in(&mut session, catalog, ctx, today, rng).await;
        self.end_session(session).await;
        outcome
    }

    async fn visit_in<S, R>(
        &self,
        session: &mut F::Session,
        catalog: &mut Catalog<S>,
        ctx: &VisitCtx,
        today: NaiveDate,
        rng: &mut R,
    ) -> VisitOutcome
    where
        S: CatalogStore,
        R: Rng + ?Sized,
    {
        let page = match bounded(self.call_timeout, "打开文章", session.navigate(&ctx.url)).await {
            DriverOutcome::Success(page) => page,
            DriverOutcome::NotFound => {
                warn!("{} 🚫 内容已删除", ctx);
                catalog.mark_invalid(&ctx.url);
                return VisitOutcome::Invalidated;
            }
            DriverOutcome::Blocked => {
                warn!("{} ⚠️ 遇到验证页面，放弃本篇", ctx);
                return VisitOutcome::Abandoned;
            }
            DriverOutcome::TransientFailure(reason) => {
                warn!("{} ❌ 打开失败，跳过: {}", ctx, reason);
                return VisitOutcome::Failed(reason);
            }
        };

        let metrics = match bounded(self.call_timeout, "统计页面", session.measure(&page)).await {
            DriverOutcome::Success(metrics) => metrics,
            DriverOutcome::Blocked => {
                warn!("{} ⚠️ 遇到验证页面，放弃本篇", ctx);
                self.close_page(session, page).await;
                return VisitOutcome::Abandoned;
            }
            other => {
                debug!("{} 无法统计页面内容，按空页面估算: {:?}", ctx, other.map(|_| ()));
                PageMetrics::default()
            }
        };

        let dwell = self.duration_model.dwell(&metrics, rng);
        info!(
            "{} ⏱️ 正文 {} 字，图片 {} 张，停留 {:.1} 秒",
            ctx,
            metrics.text_length,
            metrics.image_count,
            dwell.as_secs_f64()
        );

        let interaction = bounded(
            dwell + self.call_timeout,
            "停留",
            session.interact(&page, dwell),
        )
        .await;
        self.close_page(session, page).await;

        match interaction {
            DriverOutcome::Success(()) => {
                if !catalog.record_visit(&ctx.url, today) {
                    warn!("{} 目录中没有该条目，未记录", ctx);
                }
                info!("{} ✅ 阅读完成", ctx);
                VisitOutcome::Read { dwell }
            }
            DriverOutcome::Blocked => {
                warn!("{} ⚠️ 停留期间出现验证页面，放弃本篇", ctx);
                VisitOutcome::Abandoned
            }
            DriverOutcome::NotFound => {
                warn!("{} ❌ 停留期间页面消失，跳过", ctx);
                VisitOutcome::Failed("停留期间页面消失".to_string())
            }
            DriverOutcome::TransientFailure(reason) => {
                warn!("{} ❌ 停留失败，跳过: {}", ctx, reason);
                VisitOutcome::Failed(reason)
            }
        }
    }
}

fn log_discovery_failure(attempt: u32, failure: &DiscoveryFailure) {
    match failure {
        DiscoveryFailure::Transient(reason) => {
            warn!("[发现 第{}次] ⚠️ 临时失败: {}", attempt, reason)
        }
        DiscoveryFailure::Blocked => {
            warn!("[发现 第{}次] 🛑 遇到验证页面，本次放弃", attempt)
        }
        DiscoveryFailure::Empty => {
            warn!(
                "[发现 第{}次] 📭 没有发现任何条目，页面结构可能已变化",
                attempt
            )
        }
    }
}
