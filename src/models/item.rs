//! 目录条目模型

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

/// 标题未知时使用的占位值
pub const PLACEHOLDER_TITLE: &str = "(无标题)";

/// 条目状态，只允许 Active → Invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Invalid,
}

/// 目录中的一篇内容
///
/// url 作为目录的键保存在外层映射里，这里只放可变字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub title: String,
    pub status: ItemStatus,
    pub last_read_date: Option<NaiveDate>,
    pub read_count: u32,
}

impl Item {
    /// 首次发现时创建
    pub fn discovered(title: &str) -> Self {
        Self {
            title: normalize_title(title),
            status: ItemStatus::Active,
            last_read_date: None,
            read_count: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    pub fn has_placeholder_title(&self) -> bool {
        is_placeholder(&self.title)
    }

    pub fn read_on(&self, day: NaiveDate) -> bool {
        self.last_read_date == Some(day)
    }
}

/// 发现阶段由提取器返回的 (url, title)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub url: String,
    pub title: String,
}

impl DiscoveredItem {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }

    /// 返回规范化后的条目，url 无法解析时返回 None
    pub fn canonicalized(&self) -> Option<Self> {
        Some(Self {
            url: canonical_url(&self.url)?,
            title: normalize_title(&self.title),
        })
    }
}

/// 规范化 url：只保留 scheme + host + path，去掉 query 和 fragment
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);
    let _ = url.set_username("");
    let _ = url.set_password(None);
    Some(url.to_string())
}

pub(crate) fn is_placeholder(title: &str) -> bool {
    title.trim().is_empty() || title == PLACEHOLDER_TITLE
}

fn normalize_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}
