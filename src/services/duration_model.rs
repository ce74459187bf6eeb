//! 停留时长模型
//!
//! base = 字数 / 阅读速度 + 图片数 * 单图时长
//! base 低于下限时（例如纯视频页）改用随机的保底时长，
//! 再乘以有界正态噪声、加上一段随机"发呆"时间，最后截断到 [min, max]。

use std::time::Duration;

use rand::Rng;

use crate::browser::PageMetrics;
use crate::config::Config;

#[derive(Debug, Clone)]
pub struct DurationModel {
    reading_rate: f64,
    per_image: f64,
    floor: f64,
    floor_random: (f64, f64),
    noise_std: f64,
    noise_bound: f64,
    idle: (f64, f64),
    min_dwell: f64,
    max_dwell: f64,
}

impl DurationModel {
    pub fn new(config: &Config) -> Self {
        Self {
            reading_rate: config.reading_rate_chars_per_sec,
            per_image: config.per_image_secs,
            floor: config.floor_secs,
            floor_random: (config.floor_random_min_secs, config.floor_random_max_secs),
            noise_std: config.noise_std,
            noise_bound: config.noise_bound,
            idle: (config.idle_min_secs, config.idle_max_secs),
            min_dwell: config.min_dwell_secs,
            max_dwell: config.max_dwell_secs,
        }
    }

    /// 不含随机成分的基础时长（秒）
    pub fn base_secs(&self, metrics: &PageMetrics) -> f64 {
        metrics.text_length as f64 / self.reading_rate + metrics.image_count as f64 * self.per_image
    }

    /// 计算一次阅读的停留时长
    pub fn dwell<R: Rng + ?Sized>(&self, metrics: &PageMetrics, rng: &mut R) -> Duration {
        let mut secs = self.base_secs(metrics);
        if !secs.is_finite() || secs < self.floor {
            secs = uniform(rng, self.floor_random);
        }

        let noise = (1.0 + self.noise_std * standard_normal(rng))
            .max(1.0 - self.noise_bound)
            .min(1.0 + self.noise_bound);
        secs = secs * noise + uniform(rng, self.idle);

        // max/min 不会因为 NaN 或上下限颠倒而 panic
        to_duration(secs.max(self.min_dwell).min(self.max_dwell))
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (to_duration(self.min_dwell), to_duration(self.max_dwell))
    }
}

/// 负数 / NaN 记为 0，溢出记为 Duration::MAX
fn to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, (low, high): (f64, f64)) -> f64 {
    if low.is_finite() && high.is_finite() && high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}

/// Box-Muller 变换
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // (0, 1]，避免 ln(0)
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn metrics(text_length: usize, image_count: usize) -> PageMetrics {
        PageMetrics {
            text_length,
            image_count,
        }
    }

    #[test]
    fn test_base_secs() {
        let model = DurationModel::new(&Config {
            reading_rate_chars_per_sec: 10.0,
            per_image_secs: 2.0,
            ..Config::default()
        });
        assert_eq!(model.base_secs(&metrics(300, 5)), 40.0);
    }

    #[test]
    fn test_dwell_always_within_bounds() {
        let model = DurationModel::new(&Config::default());
        let (min, max) = model.bounds();
        let mut rng = StdRng::seed_from_u64(9);
        for (text, images) in [(0, 0), (1, 0), (0, 40), (800, 3), (5_000_000, 10_000)] {
            for _ in 0..500 {
                let d = model.dwell(&metrics(text, images), &mut rng);
                assert!(d >= min && d <= max, "{:?} 超出 [{:?}, {:?}]", d, min, max);
            }
        }
    }

    #[test]
    fn test_empty_page_uses_random_floor() {
        let config = Config {
            noise_std: 0.0,
            idle_min_secs: 0.0,
            idle_max_secs: 0.0,
            floor_random_min_secs: 20.0,
            floor_random_max_secs: 45.0,
            min_dwell_secs: 0.0,
            max_dwell_secs: 1000.0,
            ..Config::default()
        };
        let model = DurationModel::new(&config);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let secs = model.dwell(&metrics(0, 0), &mut rng).as_secs_f64();
            assert!((20.0..=45.0).contains(&secs));
        }
    }

    #[test]
    fn test_longer_pages_dwell_longer_on_average() {
        let model = DurationModel::new(&Config::default());
        let mut rng = StdRng::seed_from_u64(5);
        let avg = |m: PageMetrics, rng: &mut StdRng| {
            (0..300).map(|_| model.dwell(&m, rng).as_secs_f64()).sum::<f64>() / 300.0
        };
        let short = avg(metrics(300, 0), &mut rng);
        let long = avg(metrics(1500, 4), &mut rng);
        assert!(long > short);
    }

    #[test]
    fn test_non_finite_settings_do_not_panic() {
        let mut rng = StdRng::seed_from_u64(2);
        for config in [
            Config {
                noise_std: f64::NAN,
                ..Config::default()
            },
            Config {
                max_dwell_secs: f64::INFINITY,
                ..Config::default()
            },
            Config {
                idle_max_secs: f64::INFINITY,
                noise_bound: f64::NAN,
                ..Config::default()
            },
        ] {
            let model = DurationModel::new(&config);
            let _ = model.bounds();
            for _ in 0..50 {
                let _ = model.dwell(&metrics(800, 2), &mut rng);
            }
        }
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let model = DurationModel::new(&Config::default());
        let a = model.dwell(&metrics(900, 2), &mut StdRng::seed_from_u64(11));
        let b = model.dwell(&metrics(900, 2), &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }
}
