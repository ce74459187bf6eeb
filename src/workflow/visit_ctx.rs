//! 单次阅读的上下文
//!
//! 封装"这是本次运行的第几篇、哪一篇"，只用于日志

use std::fmt::Display;

use crate::services::SampledItem;

#[derive(Debug, Clone)]
pub struct VisitCtx {
    /// 本次运行中的序号（从 1 开始）
    pub position: usize,
    pub total: usize,
    pub url: String,
    pub title: String,
}

impl VisitCtx {
    pub fn new(position: usize, total: usize, item: &SampledItem) -> Self {
        Self {
            position,
            total,
            url: item.url.clone(),
            title: item.title.clone(),
        }
    }

    /// 标题预览（过长时截断）
    pub fn title_preview(&self) -> String {
        crate::utils::logging::truncate_text(&self.title, 30)
    }
}

impl Display for VisitCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[文章 {}/{}]", self.position, self.total)
    }
}
