//! 发现收敛循环 - 流程层
//!
//! 每一轮：下滑 → 检查风控 → 提取当前完整快照 → 统计新增 → 更新"无增长"计数。
//! 每轮结束后按顺序检查终止条件，先满足者生效：
//! 1. 连续无增长轮数 >= plateau_limit → 已到底
//! 2. 累计条目数 >= early_stop_count → 数量已够（仅增量模式）
//! 3. 轮数 >= max_rounds → 轮数用尽
//!
//! 任意一轮检测到风控页立即以"被拦截"结束。

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::browser::{bounded, BrowserSession, DriverOutcome, Extractor};
use crate::models::item::is_placeholder;
use crate::models::DiscoveredItem;
use crate::services::DiscoveryPolicy;

/// 终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Exhausted,
    QuotaReached,
    BudgetExhausted,
    Blocked,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Exhausted => write!(f, "已到底"),
            TerminationReason::QuotaReached => write!(f, "数量已够"),
            TerminationReason::BudgetExhausted => write!(f, "轮数用尽"),
            TerminationReason::Blocked => write!(f, "被拦截"),
        }
    }
}

/// 一次收敛循环的结果
#[derive(Debug, Clone)]
pub struct ConvergenceReport {
    /// 按首次出现顺序排列，url 唯一
    pub items: Vec<DiscoveredItem>,
    pub reason: TerminationReason,
    pub rounds: usize,
}

impl ConvergenceReport {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 已见条目集合
#[derive(Default)]
struct SeenSet {
    items: Vec<DiscoveredItem>,
    index: HashMap<String, usize>,
}

impl SeenSet {
    /// 并入一次快照，返回新增数量
    fn absorb(&mut self, snapshot: Vec<DiscoveredItem>) -> usize {
        let mut new_count = 0;
        for raw in snapshot {
            let Some(item) = raw.canonicalized() else {
                continue;
            };
            match self.index.get(&item.url) {
                Some(&pos) => {
                    let known = &mut self.items[pos];
                    if is_placeholder(&known.title) && !is_placeholder(&item.title) {
                        known.title = item.title;
                    }
                }
                None => {
                    self.index.insert(item.url.clone(), self.items.len());
                    self.items.push(item);
                    new_count += 1;
                }
            }
        }
        new_count
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// 发现收敛循环
#[derive(Debug, Clone)]
pub struct ConvergenceLoop {
    policy: DiscoveryPolicy,
    call_timeout: Duration,
}

impl ConvergenceLoop {
    pub fn new(policy: DiscoveryPolicy, call_timeout: Duration) -> Self {
        Self {
            policy,
            call_timeout,
        }
    }

    /// 在已打开的信息流页面上执行循环
    ///
    /// 驱动调用失败（超时、连接中断等）以 `Err` 返回，由调用方决定是否重试。
    pub async fn run<S, E>(
        &self,
        session: &mut S,
        page: &S::Page,
        extractor: &E,
    ) -> Result<ConvergenceReport>
    where
        S: BrowserSession,
        E: Extractor<S::Page> + ?Sized,
    {
        let mut seen = SeenSet::default();
        let mut no_growth_streak = 0;

        for round in 1..=self.policy.max_rounds {
            match bounded(self.call_timeout, "下滑", session.reveal(page)).await {
                DriverOutcome::Success(()) => {}
                DriverOutcome::Blocked => return Ok(blocked(seen, round)),
                DriverOutcome::NotFound => bail!("第 {} 轮下滑时页面已不存在", round),
                DriverOutcome::TransientFailure(reason) => bail!("第 {} 轮下滑失败: {}", round, reason),
            }

            match bounded(self.call_timeout, "风控检测", session.detect_anomaly(page)).await {
                DriverOutcome::Success(report) if report.blocked => {
                    return Ok(blocked(seen, round))
                }
                DriverOutcome::Success(_) => {}
                DriverOutcome::Blocked => return Ok(blocked(seen, round)),
                DriverOutcome::NotFound => bail!("第 {} 轮检测时页面已不存在", round),
                DriverOutcome::TransientFailure(reason) => bail!("第 {} 轮检测失败: {}", round, reason),
            }

            let snapshot = match bounded(self.call_timeout, "提取", extractor.extract(page)).await {
                DriverOutcome::Success(items) => items,
                DriverOutcome::Blocked => return Ok(blocked(seen, round)),
                DriverOutcome::NotFound => bail!("第 {} 轮提取时页面已不存在", round),
                DriverOutcome::TransientFailure(reason) => bail!("第 {} 轮提取失败: {}", round, reason),
            };

            let snapshot_size = snapshot.len();
            let new_count = seen.absorb(snapshot);
            if new_count > 0 {
                no_growth_streak = 0;
            } else {
                no_growth_streak += 1;
            }

            info!(
                "[下滑 第{}轮] 快照 {} 条，新增 {} 条，累计 {} 条",
                round,
                snapshot_size,
                new_count,
                seen.len()
            );
            debug!("连续无增长 {} 轮", no_growth_streak);

            if let Some(reason) = self.termination(round, no_growth_streak, seen.len()) {
                info!("[下滑] 结束: {} (共 {} 轮)", reason, round);
                return Ok(ConvergenceReport {
                    items: seen.items,
                    reason,
                    rounds: round,
                });
            }
        }

        // 只有 max_rounds == 0 时才会走到这里
        Ok(ConvergenceReport {
            items: seen.items,
            reason: TerminationReason::BudgetExhausted,
            rounds: 0,
        })
    }

    fn termination(
        &self,
        round: usize,
        no_growth_streak: usize,
        seen: usize,
    ) -> Option<TerminationReason> {
        if no_growth_streak >= self.policy.plateau_limit {
            Some(TerminationReason::Exhausted)
        } else if self.policy.early_stop_count.is_some_and(|quota| seen >= quota) {
            Some(TerminationReason::QuotaReached)
        } else if round >= self.policy.max_rounds {
            Some(TerminationReason::BudgetExhausted)
        } else {
            None
        }
    }
}

fn blocked(seen: SeenSet, round: usize) -> ConvergenceReport {
    warn!("[下滑 第{}轮] ⚠️ 检测到验证页面，停止发现", round);
    ConvergenceReport {
        items: seen.items,
        reason: TerminationReason::Blocked,
        rounds: round,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{feed_items, ScriptedExtractor, ScriptedSession};

    fn policy(max_rounds: usize, plateau_limit: usize, early_stop: Option<usize>) -> DiscoveryPolicy {
        DiscoveryPolicy {
            max_rounds,
            plateau_limit,
            early_stop_count: early_stop,
        }
    }

    async fn run_with(
        policy: DiscoveryPolicy,
        session: &mut ScriptedSession,
        extractor: &ScriptedExtractor,
    ) -> Result<ConvergenceReport> {
        let page = match session.navigate("https://feed.example/").await {
            DriverOutcome::Success(page) => page,
            _ => panic!("scripted navigate failed"),
        };
        ConvergenceLoop::new(policy, Duration::from_secs(5))
            .run(session, &page, extractor)
            .await
    }

    #[tokio::test]
    async fn test_plateau_after_growth() {
        // 每轮新增 5, 3, 0, 0, 0
        let extractor = ScriptedExtractor::growing(&[5, 3, 0, 0, 0]);
        let mut session = ScriptedSession::default();

        let report = run_with(policy(20, 3, None), &mut session, &extractor)
            .await
            .unwrap();

        assert_eq!(report.reason, TerminationReason::Exhausted);
        assert_eq!(report.rounds, 5);
        assert_eq!(report.items.len(), 8);
        assert_eq!(session.reveals(), 5);
    }

    #[tokio::test]
    async fn test_quota_reached() {
        let extractor = ScriptedExtractor::growing(&[10, 10, 10, 10]);
        let mut session = ScriptedSession::default();

        let report = run_with(policy(6, 2, Some(25)), &mut session, &extractor)
            .await
            .unwrap();

        assert_eq!(report.reason, TerminationReason::QuotaReached);
        assert_eq!(report.rounds, 3);
        assert_eq!(report.items.len(), 30);
    }

    #[tokio::test]
    async fn test_budget_exhausted_with_endless_growth() {
        let extractor = ScriptedExtractor::growing(&[1; 100]);
        let mut session = ScriptedSession::default();

        let report = run_with(policy(7, 3, None), &mut session, &extractor)
            .await
            .unwrap();

        assert_eq!(report.reason, TerminationReason::BudgetExhausted);
        assert_eq!(report.rounds, 7);
        assert_eq!(report.items.len(), 7);
    }

    #[tokio::test]
    async fn test_plateau_wins_over_budget_on_same_round() {
        let extractor = ScriptedExtractor::growing(&[2, 0, 0]);
        let mut session = ScriptedSession::default();

        let report = run_with(policy(3, 2, None), &mut session, &extractor)
            .await
            .unwrap();
        assert_eq!(report.reason, TerminationReason::Exhausted);
    }

    #[tokio::test]
    async fn test_terminates_when_extractor_never_returns_anything() {
        let extractor = ScriptedExtractor::growing(&[]);
        let mut session = ScriptedSession::default();

        let report = run_with(policy(50, 4, None), &mut session, &extractor)
            .await
            .unwrap();
        assert_eq!(report.reason, TerminationReason::Exhausted);
        assert!(report.is_empty());
        assert_eq!(report.rounds, 4);
    }

    #[tokio::test]
    async fn test_blocked_aborts_immediately() {
        let extractor = ScriptedExtractor::growing(&[5, 5, 5, 5]);
        let mut session = ScriptedSession::default().block_at_round(2);

        let report = run_with(policy(10, 3, None), &mut session, &extractor)
            .await
            .unwrap();
        assert_eq!(report.reason, TerminationReason::Blocked);
        assert_eq!(report.rounds, 2);
        assert_eq!(report.items.len(), 5);
    }

    #[tokio::test]
    async fn test_transient_reveal_failure_is_error() {
        let extractor = ScriptedExtractor::growing(&[5, 5]);
        let mut session = ScriptedSession::default().fail_reveal_at_round(2);

        let result = run_with(policy(10, 3, None), &mut session, &extractor).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_urls_in_snapshot_count_once() {
        let mut items = feed_items(0..3);
        items.extend(feed_items(0..3));
        let extractor = ScriptedExtractor::from_snapshots(vec![items.clone(), items]);
        let mut session = ScriptedSession::default();

        let report = run_with(policy(10, 1, None), &mut session, &extractor)
            .await
            .unwrap();
        assert_eq!(report.items.len(), 3);
        assert_eq!(report.rounds, 2);
    }
}
