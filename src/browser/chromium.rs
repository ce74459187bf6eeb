//! 基于 chromiumoxide 的浏览器驱动
//!
//! launch 模式下每个会话是一个独立的浏览器进程 + 临时用户目录；
//! connect 模式下每个会话只是已有浏览器里的新标签页，结束时不关闭浏览器。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Browser;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::connection::connect_to_browser;
use super::driver::{AnomalyReport, BrowserSession, DriverOutcome, PageMetrics, SessionFactory};
use super::headless::launch_browser;
use crate::config::{BrowserMode, Config};
use crate::infrastructure::JsExecutor;

/// 读取页面标题和正文开头，用于识别风控页 / 已删除页
const PROBE_JS: &str = r#"
(() => {
    const body = document.body ? document.body.innerText : '';
    return { title: document.title || '', text: body.slice(0, 3000) };
})()
"#;

const METRICS_JS: &str = r#"
(() => {
    const body = document.body ? document.body.innerText : '';
    return {
        textLength: body.replace(/\s+/g, '').length,
        imageCount: document.images ? document.images.length : 0
    };
})()
"#;

const REVEAL_JS: &str = r#"
(() => {
    window.scrollTo(0, document.body ? document.body.scrollHeight : 0);
    return true;
})()
"#;

const STEP_SCROLL_JS: &str = r#"
(() => {
    window.scrollBy(0, Math.floor(window.innerHeight * 0.6));
    return true;
})()
"#;

#[derive(Debug, Deserialize)]
struct PageProbe {
    title: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetrics {
    text_length: usize,
    image_count: usize,
}

/// 页面状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Normal,
    Blocked,
    NotFound,
}

/// 页面特征词（风控 / 已删除）
#[derive(Debug, Clone)]
pub struct PageMarkers {
    blocked: Option<Regex>,
    not_found: Option<Regex>,
}

impl PageMarkers {
    pub fn new(blocked: &[String], not_found: &[String]) -> Self {
        Self {
            blocked: build_marker_regex(blocked),
            not_found: build_marker_regex(not_found),
        }
    }

    /// 风控优先于"已删除"
    pub fn classify(&self, title: &str, text: &str) -> PageState {
        let hit = |re: &Option<Regex>| {
            re.as_ref()
                .map(|re| re.is_match(title) || re.is_match(text))
                .unwrap_or(false)
        };
        if hit(&self.blocked) {
            PageState::Blocked
        } else if hit(&self.not_found) {
            PageState::NotFound
        } else {
            PageState::Normal
        }
    }
}

fn build_marker_regex(markers: &[String]) -> Option<Regex> {
    let parts: Vec<String> = markers
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(regex::escape)
        .collect();
    if parts.is_empty() {
        return None;
    }
    RegexBuilder::new(&parts.join("|"))
        .case_insensitive(true)
        .build()
        .ok()
}

#[derive(Debug, Clone)]
struct SessionTiming {
    settle: Duration,
    reveal_wait: Duration,
    interact_step: Duration,
    /// 关闭浏览器的等待上限
    shutdown_limit: Duration,
}

/// chromiumoxide 会话工厂
pub struct ChromiumSessionFactory {
    config: Config,
    markers: Arc<PageMarkers>,
}

impl ChromiumSessionFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            markers: Arc::new(PageMarkers::new(
                &config.blocked_markers,
                &config.not_found_markers,
            )),
        }
    }

    fn timing(&self) -> SessionTiming {
        SessionTiming {
            settle: self.config.page_settle(),
            reveal_wait: self.config.reveal_wait(),
            interact_step: self.config.interact_step(),
            shutdown_limit: self.config.driver_call_timeout(),
        }
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    type Session = ChromiumSession;

    async fn open(&self) -> anyhow::Result<ChromiumSession> {
        let session = match self.config.browser_mode {
            BrowserMode::Launch => {
                let profile = tempfile::Builder::new().prefix("feed-sampler-").tempdir()?;
                let (browser, handler) = launch_browser(&self.config, profile.path()).await?;
                ChromiumSession {
                    browser,
                    handler,
                    owns_browser: true,
                    _profile: Some(profile),
                    markers: self.markers.clone(),
                    timing: self.timing(),
                }
            }
            BrowserMode::Connect => {
                let (browser, handler) = connect_to_browser(self.config.browser_debug_port).await?;
                ChromiumSession {
                    browser,
                    handler,
                    owns_browser: false,
                    _profile: None,
                    markers: self.markers.clone(),
                    timing: self.timing(),
                }
            }
        };
        Ok(session)
    }
}

/// chromiumoxide 会话
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    owns_browser: bool,
    // 会话结束前必须保留，drop 时删除临时用户目录
    _profile: Option<TempDir>,
    markers: Arc<PageMarkers>,
    timing: SessionTiming,
}

impl ChromiumSession {
    async fn probe_state(&self, page: &JsExecutor) -> anyhow::Result<PageState> {
        let probe: PageProbe = page.eval_as(PROBE_JS).await?;
        Ok(self.markers.classify(&probe.title, &probe.text))
    }

    async fn close_quietly(page: JsExecutor) {
        if let Err(e) = page.into_page().close().await {
            debug!("关闭页面失败: {}", e);
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Page = JsExecutor;

    async fn navigate(&mut self, url: &str) -> DriverOutcome<JsExecutor> {
        let page = match self.browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => return DriverOutcome::TransientFailure(format!("创建页面失败: {}", e)),
        };

        let navigation = page.goto(url).await.map(|_| ());
        if let Err(e) = navigation {
            let _ = page.close().await;
            return DriverOutcome::TransientFailure(format!("导航到 {} 失败: {}", url, e));
        }

        // 给页面脚本一些渲染时间
        sleep(self.timing.settle).await;
        let executor = JsExecutor::new(page);

        match self.probe_state(&executor).await {
            Ok(PageState::Normal) => DriverOutcome::Success(executor),
            Ok(PageState::Blocked) => {
                warn!("⚠️ 页面出现验证: {}", url);
                Self::close_quietly(executor).await;
                DriverOutcome::Blocked
            }
            Ok(PageState::NotFound) => {
                Self::close_quietly(executor).await;
                DriverOutcome::NotFound
            }
            Err(e) => {
                Self::close_quietly(executor).await;
                DriverOutcome::TransientFailure(format!("读取页面失败: {}", e))
            }
        }
    }

    async fn reveal(&mut self, page: &JsExecutor) -> DriverOutcome<()> {
        if let Err(e) = page.exec(REVEAL_JS).await {
            return DriverOutcome::TransientFailure(format!("下滑失败: {}", e));
        }
        sleep(self.timing.reveal_wait).await;
        DriverOutcome::Success(())
    }

    async fn detect_anomaly(&mut self, page: &JsExecutor) -> DriverOutcome<AnomalyReport> {
        match self.probe_state(page).await {
            Ok(state) => DriverOutcome::Success(AnomalyReport {
                blocked: state == PageState::Blocked,
            }),
            Err(e) => DriverOutcome::TransientFailure(format!("检测页面失败: {}", e)),
        }
    }

    async fn measure(&mut self, page: &JsExecutor) -> DriverOutcome<PageMetrics> {
        match page.eval_as::<RawMetrics>(METRICS_JS).await {
            Ok(raw) => DriverOutcome::Success(PageMetrics {
                text_length: raw.text_length,
                image_count: raw.image_count,
            }),
            Err(e) => DriverOutcome::TransientFailure(format!("统计页面内容失败: {}", e)),
        }
    }

    async fn interact(&mut self, page: &JsExecutor, budget: Duration) -> DriverOutcome<()> {
        let deadline = Instant::now() + budget;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return DriverOutcome::Success(());
            }
            if let Err(e) = page.exec(STEP_SCROLL_JS).await {
                return DriverOutcome::TransientFailure(format!("滚动失败: {}", e));
            }
            sleep(self.timing.interact_step.min(deadline - now)).await;
        }
    }

    async fn close(&mut self, page: JsExecutor) {
        Self::close_quietly(page).await;
    }

    async fn save_debug_artifacts(
        &mut self,
        page: &JsExecutor,
        dir: &Path,
        label: &str,
    ) -> anyhow::Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("创建调试目录失败: {}", dir.display()))?;

        let mut saved = Vec::new();

        let html_path = dir.join(format!("{}.html", label));
        let html = page.page().content().await.context("读取页面 DOM 失败")?;
        tokio::fs::write(&html_path, html)
            .await
            .with_context(|| format!("写入 {} 失败", html_path.display()))?;
        saved.push(html_path);

        // 截图失败不影响已保存的 DOM
        let params = ScreenshotParams::builder().full_page(true).build();
        match page.page().screenshot(params).await {
            Ok(png) => {
                let png_path = dir.join(format!("{}.png", label));
                match tokio::fs::write(&png_path, png).await {
                    Ok(()) => saved.push(png_path),
                    Err(e) => warn!("⚠️ 写入截图失败 {}: {}", png_path.display(), e),
                }
            }
            Err(e) => warn!("⚠️ 页面截图失败: {}", e),
        }

        Ok(saved)
    }

    async fn shutdown(mut self) {
        if self.owns_browser {
            let limit = self.timing.shutdown_limit;
            let closing = async {
                if let Err(e) = self.browser.close().await {
                    debug!("关闭浏览器失败: {}", e);
                }
                let _ = self.browser.wait().await;
            };
            if tokio::time::timeout(limit, closing).await.is_err() {
                warn!("⚠️ 浏览器 {:?} 内未退出，直接丢弃", limit);
            }
        }
        self.handler.abort();
    }
}

// 超时被丢弃的 shutdown 也要停掉事件循环
impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> PageMarkers {
        let config = Config::default();
        PageMarkers::new(&config.blocked_markers, &config.not_found_markers)
    }

    #[test]
    fn test_classify_blocked() {
        assert_eq!(
            markers().classify("安全验证", "请拖动滑块完成验证"),
            PageState::Blocked
        );
        assert_eq!(markers().classify("", "Please solve the CAPTCHA"), PageState::Blocked);
    }

    #[test]
    fn test_classify_not_found() {
        assert_eq!(
            markers().classify("今日头条", "抱歉，该内容已被删除"),
            PageState::NotFound
        );
    }

    #[test]
    fn test_classify_normal() {
        assert_eq!(
            markers().classify("一篇文章", "正文内容，没有任何异常"),
            PageState::Normal
        );
    }

    #[test]
    fn test_scroll_scripts_produce_a_value() {
        for script in [REVEAL_JS, STEP_SCROLL_JS] {
            assert!(script.contains("return true;"));
            assert!(script.trim_end().ends_with("})()"));
        }
    }

    #[test]
    fn test_empty_markers_never_match() {
        let markers = PageMarkers::new(&[], &["  ".to_string()]);
        assert_eq!(markers.classify("安全验证", "已删除"), PageState::Normal);
    }

    #[tokio::test]
    #[ignore] // 需要本机安装 Chrome：cargo test -- --ignored
    async fn test_launch_and_navigate() {
        let factory = ChromiumSessionFactory::new(&Config::default());
        let mut session = factory.open().await.expect("启动浏览器失败");
        let outcome = session.navigate("https://example.com/").await;
        match outcome {
            DriverOutcome::Success(page) => {
                assert!(session.measure(&page).await.is_success());
                session.close(page).await;
            }
            other => panic!("导航失败: {:?}", other.map(|_| ())),
        }
        session.shutdown().await;
    }
}
