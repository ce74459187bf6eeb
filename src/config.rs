use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::services::mode_selector::DiscoveryPolicy;
use crate::services::sampler::WeightTier;

/// 默认配置文件路径（存在时才加载）
pub const DEFAULT_CONFIG_FILE: &str = "feed_sampler.toml";

/// 浏览器获取方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserMode {
    /// 每个会话启动一个独立的无头浏览器（临时用户目录）
    Launch,
    /// 连接已在运行的浏览器调试端口，每个会话新开一个标签页
    Connect,
}

impl FromStr for BrowserMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "launch" => Ok(BrowserMode::Launch),
            "connect" => Ok(BrowserMode::Connect),
            other => Err(format!("未知的浏览器模式: {}", other)),
        }
    }
}

/// 程序配置
///
/// 构建顺序：默认值 → TOML 文件 → 环境变量。构建完成后不可变，按引用传给各组件。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 目标 ---
    /// 信息流主页地址
    pub feed_url: String,
    /// 打开信息流前先访问的页面（获取初始 cookie），为空则跳过
    pub warmup_url: Option<String>,

    // --- 浏览器 ---
    pub browser_mode: BrowserMode,
    /// 浏览器调试端口（connect 模式）
    pub browser_debug_port: u16,
    /// 浏览器可执行文件路径（launch 模式，为空则自动查找）
    pub chrome_executable: Option<String>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// 导航完成后等待页面脚本渲染的时间
    pub page_settle_ms: u64,
    /// 单次浏览器调用的超时时间
    pub driver_call_timeout_secs: u64,
    /// 每次下滑后的等待时间
    pub reveal_wait_ms: u64,
    /// 停留期间每次滚动的间隔
    pub interact_step_ms: u64,

    // --- 页面特征 ---
    /// 出现即视为被风控拦截（验证码、安全验证等）
    pub blocked_markers: Vec<String>,
    /// 出现即视为内容已删除
    pub not_found_markers: Vec<String>,

    // --- 链接提取 ---
    pub link_selector: String,
    pub item_path_pattern: String,

    // --- 存储 ---
    pub catalog_path: String,
    /// 每次发现完成后写出的快照文件，为空则不写
    pub snapshot_path: Option<String>,
    /// 发现失败时保存页面 DOM 和截图的目录，为空则不保存
    pub debug_artifact_dir: Option<String>,

    // --- 发现策略 ---
    /// 目录条目数低于该值时执行全量发现
    pub full_sync_threshold: usize,
    pub full_policy: DiscoveryPolicy,
    pub incremental_policy: DiscoveryPolicy,

    // --- 抽样 ---
    pub min_per_run: usize,
    pub max_per_run: usize,
    /// 按阅读次数划分的权重档位，按 min_reads 升序
    pub weight_tiers: Vec<WeightTier>,

    // --- 重试与冷却 ---
    pub max_retries: u32,
    pub retry_base_delay_secs: u64,
    pub retry_jitter_ms: u64,
    pub visit_cooldown_min_secs: u64,
    pub visit_cooldown_max_secs: u64,

    // --- 停留时长模型 ---
    pub reading_rate_chars_per_sec: f64,
    pub per_image_secs: f64,
    pub floor_secs: f64,
    pub floor_random_min_secs: f64,
    pub floor_random_max_secs: f64,
    pub noise_std: f64,
    pub noise_bound: f64,
    pub idle_min_secs: f64,
    pub idle_max_secs: f64,
    pub min_dwell_secs: f64,
    pub max_dwell_secs: f64,

    /// 固定随机种子，设置后整次运行可复现
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: "https://www.toutiao.com/c/user/token/".to_string(),
            warmup_url: Some("https://www.toutiao.com/".to_string()),
            browser_mode: BrowserMode::Launch,
            browser_debug_port: 9222,
            chrome_executable: None,
            headless: true,
            window_width: 1280,
            window_height: 720,
            page_settle_ms: 3000,
            driver_call_timeout_secs: 60,
            reveal_wait_ms: 4000,
            interact_step_ms: 1500,
            blocked_markers: vec![
                "安全验证".to_string(),
                "验证码".to_string(),
                "请完成验证".to_string(),
                "captcha".to_string(),
            ],
            not_found_markers: vec![
                "文章不存在".to_string(),
                "内容已删除".to_string(),
                "该内容已被删除".to_string(),
                "页面不存在".to_string(),
                "404 Not Found".to_string(),
            ],
            link_selector: "p.content > a[href^='/']".to_string(),
            item_path_pattern: r"^/[a-zA-Z]/\d+/?$".to_string(),
            catalog_path: "data/catalog.json".to_string(),
            snapshot_path: Some("data/discovery_snapshot.json".to_string()),
            debug_artifact_dir: Some("data/debug".to_string()),
            full_sync_threshold: 50,
            full_policy: DiscoveryPolicy {
                max_rounds: 40,
                plateau_limit: 4,
                early_stop_count: None,
            },
            incremental_policy: DiscoveryPolicy {
                max_rounds: 6,
                plateau_limit: 2,
                early_stop_count: Some(30),
            },
            min_per_run: 3,
            max_per_run: 8,
            weight_tiers: vec![
                WeightTier::new(0, 8.0),
                WeightTier::new(1, 4.0),
                WeightTier::new(10, 2.0),
                WeightTier::new(50, 1.0),
            ],
            max_retries: 3,
            retry_base_delay_secs: 5,
            retry_jitter_ms: 3000,
            visit_cooldown_min_secs: 5,
            visit_cooldown_max_secs: 20,
            reading_rate_chars_per_sec: 12.0,
            per_image_secs: 2.5,
            floor_secs: 10.0,
            floor_random_min_secs: 20.0,
            floor_random_max_secs: 45.0,
            noise_std: 0.15,
            noise_bound: 0.35,
            idle_min_secs: 2.0,
            idle_max_secs: 8.0,
            min_dwell_secs: 15.0,
            max_dwell_secs: 240.0,
            rng_seed: None,
        }
    }
}

impl Config {
    /// 加载完整配置：默认值 → 配置文件（若存在）→ 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("FEED_SAMPLER_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let base = if Path::new(&path).exists() {
            info!("📄 加载配置文件: {}", path);
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };

        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 只用默认值 + 环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，未出现的字段取默认值
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 用环境变量覆盖当前值，解析失败时保留原值
    pub fn with_env_overrides(self) -> Self {
        let base = self;
        Self {
            feed_url: env_string("FEED_URL").unwrap_or(base.feed_url),
            warmup_url: match env_string("WARMUP_URL") {
                Some(v) if v.is_empty() => None,
                Some(v) => Some(v),
                None => base.warmup_url,
            },
            browser_mode: env_parse("BROWSER_MODE", base.browser_mode),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", base.browser_debug_port),
            chrome_executable: env_string("CHROME_EXECUTABLE").or(base.chrome_executable),
            headless: env_parse("HEADLESS", base.headless),
            window_width: env_parse("WINDOW_WIDTH", base.window_width),
            window_height: env_parse("WINDOW_HEIGHT", base.window_height),
            page_settle_ms: env_parse("PAGE_SETTLE_MS", base.page_settle_ms),
            driver_call_timeout_secs: env_parse(
                "DRIVER_CALL_TIMEOUT_SECS",
                base.driver_call_timeout_secs,
            ),
            reveal_wait_ms: env_parse("REVEAL_WAIT_MS", base.reveal_wait_ms),
            interact_step_ms: env_parse("INTERACT_STEP_MS", base.interact_step_ms),
            catalog_path: env_string("CATALOG_PATH").unwrap_or(base.catalog_path),
            snapshot_path: match env_string("SNAPSHOT_PATH") {
                Some(v) if v.is_empty() => None,
                Some(v) => Some(v),
                None => base.snapshot_path,
            },
            debug_artifact_dir: match env_string("DEBUG_ARTIFACT_DIR") {
                Some(v) if v.is_empty() => None,
                Some(v) => Some(v),
                None => base.debug_artifact_dir,
            },
            full_sync_threshold: env_parse("FULL_SYNC_THRESHOLD", base.full_sync_threshold),
            min_per_run: env_parse("MIN_PER_RUN", base.min_per_run),
            max_per_run: env_parse("MAX_PER_RUN", base.max_per_run),
            max_retries: env_parse("MAX_RETRIES", base.max_retries),
            retry_base_delay_secs: env_parse("RETRY_BASE_DELAY_SECS", base.retry_base_delay_secs),
            visit_cooldown_min_secs: env_parse(
                "VISIT_COOLDOWN_MIN_SECS",
                base.visit_cooldown_min_secs,
            ),
            visit_cooldown_max_secs: env_parse(
                "VISIT_COOLDOWN_MAX_SECS",
                base.visit_cooldown_max_secs,
            ),
            min_dwell_secs: env_parse("MIN_DWELL_SECS", base.min_dwell_secs),
            max_dwell_secs: env_parse("MAX_DWELL_SECS", base.max_dwell_secs),
            rng_seed: env_string("RNG_SEED")
                .and_then(|v| v.parse().ok())
                .or(base.rng_seed),
            ..base
        }
    }

    /// 校验配置的一致性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_per_run > self.max_per_run {
            return Err(ConfigError::invalid(
                "min_per_run",
                format!("{} 大于 max_per_run {}", self.min_per_run, self.max_per_run),
            ));
        }
        if self.weight_tiers.is_empty() {
            return Err(ConfigError::invalid("weight_tiers", "至少需要一个档位"));
        }
        if self.weight_tiers.iter().any(|t| !(t.weight > 0.0) || !t.weight.is_finite()) {
            return Err(ConfigError::invalid("weight_tiers", "权重必须为正数"));
        }
        if self.weight_tiers[0].min_reads != 0 {
            return Err(ConfigError::invalid(
                "weight_tiers",
                "第一个档位必须从 0 次阅读开始",
            ));
        }
        if self
            .weight_tiers
            .windows(2)
            .any(|w| w[0].min_reads >= w[1].min_reads)
        {
            return Err(ConfigError::invalid("weight_tiers", "min_reads 必须严格递增"));
        }
        // NaN / inf 会让停留时长的计算失去意义
        for (field, value) in [
            ("reading_rate_chars_per_sec", self.reading_rate_chars_per_sec),
            ("per_image_secs", self.per_image_secs),
            ("floor_secs", self.floor_secs),
            ("floor_random_min_secs", self.floor_random_min_secs),
            ("floor_random_max_secs", self.floor_random_max_secs),
            ("noise_std", self.noise_std),
            ("noise_bound", self.noise_bound),
            ("idle_min_secs", self.idle_min_secs),
            ("idle_max_secs", self.idle_max_secs),
            ("min_dwell_secs", self.min_dwell_secs),
            ("max_dwell_secs", self.max_dwell_secs),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::invalid(field, format!("{} 不是有限数值", value)));
            }
        }
        if !(self.reading_rate_chars_per_sec > 0.0) {
            return Err(ConfigError::invalid(
                "reading_rate_chars_per_sec",
                "阅读速度必须为正数",
            ));
        }
        if !(self.min_dwell_secs >= 0.0) || self.min_dwell_secs > self.max_dwell_secs {
            return Err(ConfigError::invalid(
                "min_dwell_secs",
                format!(
                    "停留区间 [{}, {}] 不合法",
                    self.min_dwell_secs, self.max_dwell_secs
                ),
            ));
        }
        if self.floor_random_min_secs > self.floor_random_max_secs {
            return Err(ConfigError::invalid("floor_random_min_secs", "区间上下限颠倒"));
        }
        if self.idle_min_secs > self.idle_max_secs {
            return Err(ConfigError::invalid("idle_min_secs", "区间上下限颠倒"));
        }
        if self.noise_std < 0.0 || !(0.0..1.0).contains(&self.noise_bound) {
            return Err(ConfigError::invalid("noise_bound", "噪声参数不合法"));
        }
        if self.visit_cooldown_min_secs > self.visit_cooldown_max_secs {
            return Err(ConfigError::invalid(
                "visit_cooldown_min_secs",
                "区间上下限颠倒",
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "至少尝试一次"));
        }
        for (field, policy) in [
            ("full_policy", &self.full_policy),
            ("incremental_policy", &self.incremental_policy),
        ] {
            if policy.max_rounds == 0 || policy.plateau_limit == 0 {
                return Err(ConfigError::invalid(
                    field,
                    "max_rounds 与 plateau_limit 必须大于 0",
                ));
            }
        }
        regex::Regex::new(&self.item_path_pattern)
            .map_err(|e| ConfigError::invalid("item_path_pattern", e.to_string()))?;
        Ok(())
    }

    pub fn driver_call_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_call_timeout_secs)
    }

    pub fn reveal_wait(&self) -> Duration {
        Duration::from_millis(self.reveal_wait_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn interact_step(&self) -> Duration {
        Duration::from_millis(self.interact_step_ms)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_parse<T: FromStr>(name: &str, fallback: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("环境变量 {} 的值 '{}' 无法解析，使用原值", name, raw);
            fallback
        }),
        Err(_) => fallback,
    }
}
