//! 浏览器驱动接口
//!
//! 调度核心只通过这里的 trait 使用浏览器，真实实现见 `chromium`，
//! 测试实现见 `crate::testing`。

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::models::DiscoveredItem;

/// 一次驱动调用的结构化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome<T> {
    Success(T),
    /// 内容已删除 / 不存在
    NotFound,
    /// 出现验证码等风控页面
    Blocked,
    /// 超时、连接失败等可重试的失败
    TransientFailure(String),
}

impl<T> DriverOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DriverOutcome<U> {
        match self {
            DriverOutcome::Success(v) => DriverOutcome::Success(f(v)),
            DriverOutcome::NotFound => DriverOutcome::NotFound,
            DriverOutcome::Blocked => DriverOutcome::Blocked,
            DriverOutcome::TransientFailure(reason) => DriverOutcome::TransientFailure(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DriverOutcome::Success(_))
    }
}

/// 页面异常检测结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyReport {
    pub blocked: bool,
}

/// 页面内容规模，用于估算停留时长
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMetrics {
    pub text_length: usize,
    pub image_count: usize,
}

/// 一个浏览器会话（不与其他会话共享任何状态）
#[async_trait]
pub trait BrowserSession: Send {
    /// 页面句柄
    type Page: Send + Sync;

    async fn navigate(&mut self, url: &str) -> DriverOutcome<Self::Page>;

    /// 让页面多露出一些内容（下滑）
    async fn reveal(&mut self, page: &Self::Page) -> DriverOutcome<()>;

    async fn detect_anomaly(&mut self, page: &Self::Page) -> DriverOutcome<AnomalyReport>;

    async fn measure(&mut self, page: &Self::Page) -> DriverOutcome<PageMetrics>;

    /// 在页面上停留/滚动，直到用完 budget
    async fn interact(&mut self, page: &Self::Page, budget: Duration) -> DriverOutcome<()>;

    async fn close(&mut self, page: Self::Page);

    /// 把当前页面的 DOM / 截图保存到 `dir`，文件名以 `label` 开头，返回写出的文件
    async fn save_debug_artifacts(
        &mut self,
        _page: &Self::Page,
        _dir: &Path,
        _label: &str,
    ) -> anyhow::Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// 结束整个会话
    async fn shutdown(self)
    where
        Self: Sized;
}

/// 会话工厂：每次调用都得到一个全新的会话
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: BrowserSession;

    async fn open(&self) -> anyhow::Result<Self::Session>;

    /// 启动时检查能否拿到浏览器
    async fn probe(&self) -> anyhow::Result<()> {
        let session = self.open().await?;
        session.shutdown().await;
        Ok(())
    }
}

/// 提取器：返回当前页面上可见条目的完整快照，无副作用
#[async_trait]
pub trait Extractor<P: Send + Sync>: Send + Sync {
    async fn extract(&self, page: &P) -> DriverOutcome<Vec<DiscoveredItem>>;
}

/// 给一次驱动调用加上超时，超时视为可重试失败
pub async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> DriverOutcome<T>
where
    F: Future<Output = DriverOutcome<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(outcome) => outcome,
        Err(_) => DriverOutcome::TransientFailure(format!("{} 超时 ({:?})", what, limit)),
    }
}

/// 给收尾调用（关闭页面、结束会话）加上超时；超时只记日志，返回 false
pub async fn settle_within<F>(limit: Duration, what: &str, call: F) -> bool
where
    F: Future<Output = ()>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(()) => true,
        Err(_) => {
            warn!("⚠️ {} 超时 ({:?})，不再等待", what, limit);
            false
        }
    }
}
