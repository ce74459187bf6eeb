//! 测试用的脚本化驱动
//!
//! - `ScriptedFactory`（SessionFactory）：每次 open() 取出一个 SessionScript
//! - `ScriptedSession`（BrowserSession）：按 url 返回导航结果，可指定第几轮被拦截 / 失败，
//!   所有操作记录到共享的 `SessionLog`
//! - `ScriptedExtractor`（Extractor）：按页面和调用次数返回固定快照
//!
//! 收尾调用（close / shutdown / open）也可以脚本成永不返回，用来验证超时兜底。
//!
//! 不需要真实浏览器；停留等待配合 tokio 暂停时钟即可瞬间完成。

use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::browser::{
    AnomalyReport, BrowserSession, DriverOutcome, Extractor, PageMetrics, SessionFactory,
};
use crate::models::DiscoveredItem;

/// 脚本化条目使用的域名
pub const FEED_HOST: &str = "https://feed.example";

/// 生成规范化的条目：`https://feed.example/w/{i}/`
pub fn feed_items(range: Range<usize>) -> Vec<DiscoveredItem> {
    range
        .map(|i| DiscoveredItem::new(format!("{}/w/{}/", FEED_HOST, i), format!("第{}篇", i)))
        .collect()
}

// ---------------------------------------------------------------------------
// 导航脚本
// ---------------------------------------------------------------------------

/// `navigate(url)` 的脚本结果
#[derive(Debug, Clone, PartialEq)]
pub enum NavScript {
    Ok,
    NotFound,
    Blocked,
    Transient,
    /// 永不返回，只能靠超时退出
    Hang,
}

/// 单个会话的行为
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    nav: HashMap<String, NavScript>,
    block_at_round: Option<usize>,
    fail_reveal_at_round: Option<usize>,
    interact_blocked: bool,
    close_hangs: bool,
    shutdown_hangs: bool,
    metrics: PageMetrics,
}

impl SessionScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_navigate(mut self, url: &str, script: NavScript) -> Self {
        self.nav.insert(url.to_string(), script);
        self
    }

    pub fn block_at_round(mut self, round: usize) -> Self {
        self.block_at_round = Some(round);
        self
    }

    pub fn fail_reveal_at_round(mut self, round: usize) -> Self {
        self.fail_reveal_at_round = Some(round);
        self
    }

    pub fn block_during_interact(mut self) -> Self {
        self.interact_blocked = true;
        self
    }

    /// close(page) 永不返回
    pub fn hang_on_close(mut self) -> Self {
        self.close_hangs = true;
        self
    }

    /// shutdown() 永不返回
    pub fn hang_on_shutdown(mut self) -> Self {
        self.shutdown_hangs = true;
        self
    }

    pub fn with_metrics(mut self, text_length: usize, image_count: usize) -> Self {
        self.metrics = PageMetrics {
            text_length,
            image_count,
        };
        self
    }
}

// ---------------------------------------------------------------------------
// 操作记录
// ---------------------------------------------------------------------------

/// 所有脚本会话的操作记录
#[derive(Debug, Default, Clone)]
pub struct SessionLog {
    pub opened: usize,
    pub shutdown: usize,
    pub navigations: Vec<String>,
    pub interactions: Vec<(String, Duration)>,
    pub pages_open: usize,
    /// save_debug_artifacts 收到的 label
    pub debug_dumps: Vec<String>,
}

type SharedLog = Arc<Mutex<SessionLog>>;

async fn hang() {
    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
}

fn with_log<T>(log: &SharedLog, f: impl FnOnce(&mut SessionLog) -> T) -> T {
    let mut guard = log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

// ---------------------------------------------------------------------------
// ScriptedSession
// ---------------------------------------------------------------------------

/// 页面句柄：唯一 id + 打开时的 url
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedPage {
    pub id: usize,
    pub url: String,
}

pub struct ScriptedSession {
    script: SessionScript,
    log: SharedLog,
    session_id: usize,
    next_page: usize,
    reveals: usize,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::from_script(SessionScript::default(), SharedLog::default(), 0)
    }
}

impl ScriptedSession {
    fn from_script(script: SessionScript, log: SharedLog, session_id: usize) -> Self {
        Self {
            script,
            log,
            session_id,
            next_page: 0,
            reveals: 0,
        }
    }

    pub fn block_at_round(mut self, round: usize) -> Self {
        self.script.block_at_round = Some(round);
        self
    }

    pub fn fail_reveal_at_round(mut self, round: usize) -> Self {
        self.script.fail_reveal_at_round = Some(round);
        self
    }

    pub fn reveals(&self) -> usize {
        self.reveals
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    type Page = ScriptedPage;

    async fn navigate(&mut self, url: &str) -> DriverOutcome<ScriptedPage> {
        with_log(&self.log, |log| log.navigations.push(url.to_string()));
        match self.script.nav.get(url).cloned().unwrap_or(NavScript::Ok) {
            NavScript::Ok => {
                self.next_page += 1;
                with_log(&self.log, |log| log.pages_open += 1);
                DriverOutcome::Success(ScriptedPage {
                    id: self.session_id * 1000 + self.next_page,
                    url: url.to_string(),
                })
            }
            NavScript::NotFound => DriverOutcome::NotFound,
            NavScript::Blocked => DriverOutcome::Blocked,
            NavScript::Transient => DriverOutcome::TransientFailure("connection reset".to_string()),
            NavScript::Hang => {
                hang().await;
                DriverOutcome::TransientFailure("hung".to_string())
            }
        }
    }

    async fn reveal(&mut self, _page: &ScriptedPage) -> DriverOutcome<()> {
        self.reveals += 1;
        if self.script.fail_reveal_at_round == Some(self.reveals) {
            return DriverOutcome::TransientFailure("scroll failed".to_string());
        }
        DriverOutcome::Success(())
    }

    async fn detect_anomaly(&mut self, _page: &ScriptedPage) -> DriverOutcome<AnomalyReport> {
        DriverOutcome::Success(AnomalyReport {
            blocked: self.script.block_at_round == Some(self.reveals),
        })
    }

    async fn measure(&mut self, _page: &ScriptedPage) -> DriverOutcome<PageMetrics> {
        DriverOutcome::Success(self.script.metrics)
    }

    async fn interact(&mut self, page: &ScriptedPage, budget: Duration) -> DriverOutcome<()> {
        if self.script.interact_blocked {
            return DriverOutcome::Blocked;
        }
        tokio::time::sleep(budget).await;
        with_log(&self.log, |log| log.interactions.push((page.url.clone(), budget)));
        DriverOutcome::Success(())
    }

    async fn close(&mut self, _page: ScriptedPage) {
        if self.script.close_hangs {
            hang().await;
        }
        with_log(&self.log, |log| log.pages_open = log.pages_open.saturating_sub(1));
    }

    async fn save_debug_artifacts(
        &mut self,
        _page: &ScriptedPage,
        dir: &Path,
        label: &str,
    ) -> Result<Vec<PathBuf>> {
        with_log(&self.log, |log| log.debug_dumps.push(label.to_string()));
        Ok(vec![dir.join(format!("{}.html", label))])
    }

    async fn shutdown(self) {
        if self.script.shutdown_hangs {
            hang().await;
        }
        with_log(&self.log, |log| log.shutdown += 1);
    }
}

// ---------------------------------------------------------------------------
// ScriptedFactory
// ---------------------------------------------------------------------------

/// 每次 `open()` 取出队列中的下一个脚本，队列空了就用 fallback。
/// `fail_first_opens(n)` 让前 n 次 open 直接失败，`hang_first_opens(n)` 让它们永不返回。
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: Mutex<VecDeque<SessionScript>>,
    fallback: SessionScript,
    fail_opens: Mutex<usize>,
    hang_opens: Mutex<usize>,
    log: SharedLog,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为下一个会话排入脚本
    pub fn then(self, script: SessionScript) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(script);
        }
        self
    }

    /// 队列为空时使用的脚本
    pub fn otherwise(mut self, script: SessionScript) -> Self {
        self.fallback = script;
        self
    }

    pub fn fail_first_opens(self, count: usize) -> Self {
        if let Ok(mut fails) = self.fail_opens.lock() {
            *fails = count;
        }
        self
    }

    pub fn hang_first_opens(self, count: usize) -> Self {
        if let Ok(mut hangs) = self.hang_opens.lock() {
            *hangs = count;
        }
        self
    }

    pub fn log(&self) -> SessionLog {
        with_log(&self.log, |log| log.clone())
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    async fn open(&self) -> Result<ScriptedSession> {
        {
            let mut fails = self.fail_opens.lock().unwrap_or_else(|p| p.into_inner());
            if *fails > 0 {
                *fails -= 1;
                bail!("no browser available");
            }
        }
        let should_hang = {
            let mut hangs = self.hang_opens.lock().unwrap_or_else(|p| p.into_inner());
            let hang_now = *hangs > 0;
            if hang_now {
                *hangs -= 1;
            }
            hang_now
        };
        if should_hang {
            hang().await;
            bail!("browser never answered");
        }
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        let session_id = with_log(&self.log, |log| {
            log.opened += 1;
            log.opened
        });
        Ok(ScriptedSession::from_script(script, self.log.clone(), session_id))
    }
}

// ---------------------------------------------------------------------------
// ScriptedExtractor
// ---------------------------------------------------------------------------

/// 同一页面第 n 次调用返回 `snapshots[n]`，用完后重复最后一个；新页面从头开始。
pub struct ScriptedExtractor {
    snapshots: Vec<Vec<DiscoveredItem>>,
    cursor: Mutex<HashMap<usize, usize>>,
}

impl ScriptedExtractor {
    pub fn from_snapshots(snapshots: Vec<Vec<DiscoveredItem>>) -> Self {
        Self {
            snapshots,
            cursor: Mutex::new(HashMap::new()),
        }
    }

    /// 累积型信息流：第 r 轮可见前 sum(growth[..=r]) 条
    pub fn growing(growth: &[usize]) -> Self {
        let mut total = 0;
        let snapshots = growth
            .iter()
            .map(|g| {
                total += g;
                feed_items(0..total)
            })
            .collect();
        Self::from_snapshots(snapshots)
    }

    fn next_for(&self, page_id: usize) -> Vec<DiscoveredItem> {
        let mut cursor = self.cursor.lock().unwrap_or_else(|p| p.into_inner());
        let call = cursor.entry(page_id).or_insert(0);
        let snapshot = match self.snapshots.len() {
            0 => Vec::new(),
            len => self.snapshots[(*call).min(len - 1)].clone(),
        };
        *call += 1;
        snapshot
    }
}

#[async_trait]
impl Extractor<ScriptedPage> for ScriptedExtractor {
    async fn extract(&self, page: &ScriptedPage) -> DriverOutcome<Vec<DiscoveredItem>> {
        DriverOutcome::Success(self.next_for(page.id))
    }
}
