//! 加权无放回抽样
//!
//! 从目录中挑出今天要阅读的条目：
//! 1. 候选 = 有效 且 今天没读过
//! 2. 按阅读次数落档取权重（读得越少权重越高，最低档仍为正数）
//! 3. 随机决定本次数量 k ∈ [min, max]，不超过候选数
//! 4. 每次按当前权重抽一个并移出候选池，重复 k 次

use chrono::NaiveDate;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use crate::catalog::{Catalog, CatalogStore};
use crate::config::Config;

/// 权重档位：阅读次数 >= min_reads 时使用 weight
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WeightTier {
    pub min_reads: u32,
    pub weight: f64,
}

impl WeightTier {
    pub fn new(min_reads: u32, weight: f64) -> Self {
        Self { min_reads, weight }
    }
}

/// 被抽中的条目
#[derive(Debug, Clone, PartialEq)]
pub struct SampledItem {
    pub url: String,
    pub title: String,
    pub read_count: u32,
    pub weight: f64,
}

/// 加权抽样器
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    tiers: Vec<WeightTier>,
    min_per_run: usize,
    max_per_run: usize,
}

impl WeightedSampler {
    pub fn new(config: &Config) -> Self {
        Self::with_tiers(
            config.weight_tiers.clone(),
            config.min_per_run,
            config.max_per_run,
        )
    }

    pub fn with_tiers(mut tiers: Vec<WeightTier>, min_per_run: usize, max_per_run: usize) -> Self {
        tiers.sort_by_key(|t| t.min_reads);
        Self {
            tiers,
            min_per_run,
            max_per_run: max_per_run.max(min_per_run),
        }
    }

    /// 阅读次数对应的权重
    pub fn weight_for(&self, read_count: u32) -> f64 {
        self.tiers
            .iter()
            .rev()
            .find(|t| read_count >= t.min_reads)
            .or_else(|| self.tiers.first())
            .map(|t| t.weight)
            .unwrap_or(1.0)
    }

    /// 今天可以抽取的候选
    pub fn candidates<S: CatalogStore>(
        &self,
        catalog: &Catalog<S>,
        today: NaiveDate,
    ) -> Vec<SampledItem> {
        catalog
            .items()
            .filter(|(_, item)| item.is_active() && !item.read_on(today))
            .map(|(url, item)| SampledItem {
                url: url.clone(),
                title: item.title.clone(),
                read_count: item.read_count,
                weight: self.weight_for(item.read_count),
            })
            .collect()
    }

    /// 抽取今天的阅读列表，顺序即阅读顺序
    pub fn draw<S: CatalogStore, R: Rng + ?Sized>(
        &self,
        catalog: &Catalog<S>,
        today: NaiveDate,
        rng: &mut R,
    ) -> Vec<SampledItem> {
        let mut pool = self.candidates(catalog, today);
        if pool.is_empty() {
            return Vec::new();
        }

        let target = rng.random_range(self.min_per_run..=self.max_per_run);
        let k = target.min(pool.len());
        debug!(
            "候选 {} 个，本次目标 {} 个，实际抽取 {} 个",
            pool.len(),
            target,
            k
        );

        let mut picked = Vec::with_capacity(k);
        for _ in 0..k {
            let index = pick_weighted(&pool, rng);
            picked.push(pool.swap_remove(index));
        }
        picked
    }
}

/// 按权重选出一个下标，pool 不能为空
fn pick_weighted<R: Rng + ?Sized>(pool: &[SampledItem], rng: &mut R) -> usize {
    let total: f64 = pool.iter().map(|c| c.weight).sum();
    let mut point = rng.random::<f64>() * total;
    for (index, candidate) in pool.iter().enumerate() {
        if point < candidate.weight {
            return index;
        }
        point -= candidate.weight;
    }
    // 浮点累加误差落到末尾
    pool.len() - 1
}
