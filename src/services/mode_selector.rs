//! 发现策略选择
//!
//! 目录很小（冷启动或数据稀少）时做全量发现，尽量把信息流翻到底；
//! 目录足够大时只做增量刷新，看到足够多的新内容就停。

use serde::Deserialize;

use crate::config::Config;

/// 发现模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    Full,
    Incremental,
}

impl std::fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryMode::Full => write!(f, "全量"),
            DiscoveryMode::Incremental => write!(f, "增量"),
        }
    }
}

/// 一次发现的收敛参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DiscoveryPolicy {
    /// 最多下滑轮数
    pub max_rounds: usize,
    /// 连续多少轮没有新条目就认为已到底
    pub plateau_limit: usize,
    /// 累计看到多少条就提前停止，None 表示不提前停止
    #[serde(default)]
    pub early_stop_count: Option<usize>,
}

/// 发现模式选择器
#[derive(Debug, Clone)]
pub struct ModeSelector {
    full_sync_threshold: usize,
    full: DiscoveryPolicy,
    incremental: DiscoveryPolicy,
}

impl ModeSelector {
    pub fn new(config: &Config) -> Self {
        Self {
            full_sync_threshold: config.full_sync_threshold,
            full: DiscoveryPolicy {
                early_stop_count: None,
                ..config.full_policy
            },
            incremental: config.incremental_policy,
        }
    }

    /// 根据目录条目数选择模式和对应参数
    pub fn select(&self, item_count: usize) -> (DiscoveryMode, DiscoveryPolicy) {
        if item_count < self.full_sync_threshold {
            (DiscoveryMode::Full, self.full)
        } else {
            (DiscoveryMode::Incremental, self.incremental)
        }
    }
}
