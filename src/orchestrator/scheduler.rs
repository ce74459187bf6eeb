//! 单次运行调度 - 编排层
//!
//! 一次运行的完整流程：
//!
//! ```text
//! needs_discovery? ──是──> ModeSelector 选模式 ──> run_discovery（含重试）──> 写快照
//!        │否                                             │失败：沿用现有目录
//!        ▼                                               ▼
//! WeightedSampler 抽取今天的阅读列表 ──> 逐篇 run_visit（篇与篇之间冷却）──> flush
//! ```
//!
//! 所有环节的失败都不会中断运行，结果汇总在 `RunReport` 中。

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::{BrowserSession, Extractor, SessionFactory};
use crate::catalog::{Catalog, CatalogStore};
use crate::config::Config;
use crate::orchestrator::retry::{DiscoveryOutcome, RetryOrchestrator, VisitOutcome};
use crate::services::{DiscoveryMode, ModeSelector, SnapshotWriter, WeightedSampler};
use crate::workflow::VisitCtx;

/// 本次运行的发现结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryStatus {
    /// 今天已同步过，跳过
    #[default]
    Skipped,
    Synced {
        mode: DiscoveryMode,
        found: usize,
        added: usize,
        attempts: u32,
    },
    Failed {
        mode: DiscoveryMode,
        attempts: u32,
    },
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryStatus::Skipped => write!(f, "今日已同步，跳过"),
            DiscoveryStatus::Synced {
                mode,
                found,
                added,
                attempts,
            } => write!(
                f,
                "{}发现成功 (发现 {} 条，新增 {} 条，尝试 {} 次)",
                mode, found, added, attempts
            ),
            DiscoveryStatus::Failed { mode, attempts } => {
                write!(f, "{}发现失败 (尝试 {} 次)，沿用现有目录", mode, attempts)
            }
        }
    }
}

/// 一次运行的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub discovery: DiscoveryStatus,
    pub planned: usize,
    pub visited: usize,
    pub invalidated: usize,
    pub abandoned: usize,
    pub failed: usize,
    /// 运行结束时目录仍有未写入的修改
    pub unsaved: bool,
}

impl RunReport {
    fn count(&mut self, outcome: &VisitOutcome) {
        match outcome {
            VisitOutcome::Read { .. } => self.visited += 1,
            VisitOutcome::Invalidated => self.invalidated += 1,
            VisitOutcome::Abandoned => self.abandoned += 1,
            VisitOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// 运行调度器
pub struct RunScheduler<F, E, S: CatalogStore> {
    orchestrator: RetryOrchestrator<F, E>,
    catalog: Catalog<S>,
    selector: ModeSelector,
    sampler: WeightedSampler,
    snapshot: Option<SnapshotWriter>,
    feed_url: String,
    cooldown_min_secs: u64,
    cooldown_max_secs: u64,
}

impl<F, E, S> RunScheduler<F, E, S>
where
    F: SessionFactory,
    E: Extractor<<F::Session as BrowserSession>::Page>,
    S: CatalogStore,
{
    pub fn new(config: &Config, factory: F, extractor: E, catalog: Catalog<S>) -> Self {
        Self {
            orchestrator: RetryOrchestrator::new(factory, extractor, config),
            catalog,
            selector: ModeSelector::new(config),
            sampler: WeightedSampler::new(config),
            snapshot: config
                .snapshot_path
                .as_ref()
                .map(|path| SnapshotWriter::new(path.as_str())),
            feed_url: config.feed_url.clone(),
            cooldown_min_secs: config.visit_cooldown_min_secs,
            cooldown_max_secs: config.visit_cooldown_max_secs.max(config.visit_cooldown_min_secs),
        }
    }

    pub fn catalog(&self) -> &Catalog<S> {
        &self.catalog
    }

    pub fn orchestrator(&self) -> &RetryOrchestrator<F, E> {
        &self.orchestrator
    }

    /// 执行一次完整运行
    pub async fn run_once<R: Rng + ?Sized>(&mut self, today: NaiveDate, rng: &mut R) -> RunReport {
        let mut report = RunReport {
            discovery: self.discover_if_needed(today, rng).await,
            ..Default::default()
        };

        let plan = self.sampler.draw(&self.catalog, today, rng);
        report.planned = plan.len();
        if plan.is_empty() {
            info!("📭 今天没有可读的条目 (目录共 {} 条)", self.catalog.len());
        } else {
            info!("📋 今天计划阅读 {} 篇", plan.len());
        }

        let total = plan.len();
        for (index, item) in plan.iter().enumerate() {
            let ctx = VisitCtx::new(index + 1, total, item);
            let outcome = self
                .orchestrator
                .run_visit(&mut self.catalog, &ctx, today, rng)
                .await;
            report.count(&outcome);

            if index + 1 < total {
                let cooldown = self.cooldown(rng);
                info!("{} 😴 冷却 {} 秒", ctx, cooldown.as_secs());
                sleep(cooldown).await;
            }
        }

        if let Err(e) = self.catalog.flush() {
            error!("❌ 目录最终写入失败: {}", e);
        }
        report.unsaved = self.catalog.is_dirty();
        report
    }

    async fn discover_if_needed<R: Rng + ?Sized>(
        &mut self,
        today: NaiveDate,
        rng: &mut R,
    ) -> DiscoveryStatus {
        if !self.catalog.needs_discovery(today) {
            info!(
                "✓ 目录今天已同步 ({} 条)，跳过发现",
                self.catalog.len()
            );
            return DiscoveryStatus::Skipped;
        }

        let (mode, policy) = self.selector.select(self.catalog.len());
        info!(
            "🔍 开始{}发现 (目录现有 {} 条，最多 {} 轮)",
            mode,
            self.catalog.len(),
            policy.max_rounds
        );

        match self
            .orchestrator
            .run_discovery(&mut self.catalog, &policy, today, rng)
            .await
        {
            DiscoveryOutcome::Synced {
                report,
                added,
                attempts,
            } => {
                if let Some(writer) = &self.snapshot {
                    if let Err(e) = writer.write(&self.feed_url, &report.items) {
                        warn!("⚠️ 写入发现快照失败: {:#}", e);
                    }
                }
                DiscoveryStatus::Synced {
                    mode,
                    found: report.items.len(),
                    added,
                    attempts,
                }
            }
            DiscoveryOutcome::Failed { attempts, .. } => {
                warn!("⚠️ 本次跳过发现，使用现有目录 ({} 条)", self.catalog.len());
                DiscoveryStatus::Failed { mode, attempts }
            }
        }
    }

    fn cooldown<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_secs(rng.random_range(self.cooldown_min_secs..=self.cooldown_max_secs))
    }
}
