//! 链接提取服务 - 业务能力层
//!
//! 从已渲染的信息流页面中取出 (url, 标题) 列表。只读页面，不做任何操作。

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;
use url::Url;

use crate::browser::{DriverOutcome, Extractor};
use crate::config::Config;
use crate::infrastructure::JsExecutor;
use crate::models::DiscoveredItem;

#[derive(Debug, Deserialize)]
struct RawLink {
    href: String,
    text: String,
}

/// 基于 CSS 选择器 + 路径规则的提取器
#[derive(Debug, Clone)]
pub struct DomLinkExtractor {
    selector: String,
    path_pattern: Regex,
}

impl DomLinkExtractor {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            selector: config.link_selector.clone(),
            path_pattern: Regex::new(&config.item_path_pattern)?,
        })
    }

    fn script(&self) -> anyhow::Result<String> {
        Ok(format!(
            r#"
            (() => {{
                const anchors = Array.from(document.querySelectorAll({}));
                return anchors
                    .map(a => {{
                        try {{
                            return {{
                                href: new URL(a.getAttribute("href") || "", window.location.origin).href,
                                text: (a.textContent || "").trim()
                            }};
                        }} catch (e) {{
                            return null;
                        }}
                    }})
                    .filter(link => link !== null);
            }})()
            "#,
            serde_json::to_string(&self.selector)?
        ))
    }

    /// 页面返回的原始链接；无法解析的条目（null）直接丢弃
    fn links_from_json(value: JsonValue) -> anyhow::Result<Vec<(String, String)>> {
        let raw: Vec<Option<RawLink>> = serde_json::from_value(value)?;
        Ok(raw.into_iter().flatten().map(|l| (l.href, l.text)).collect())
    }

    /// 只保留路径符合规则的链接，按 url 去重，保持页面顺序
    pub fn filter_links(&self, raw: Vec<(String, String)>) -> Vec<DiscoveredItem> {
        let mut seen = std::collections::HashSet::new();
        let mut items = Vec::new();

        for (href, text) in raw {
            let Ok(url) = Url::parse(&href) else {
                continue;
            };
            if !self.path_pattern.is_match(url.path()) {
                continue;
            }
            let Some(item) = DiscoveredItem::new(href, text).canonicalized() else {
                continue;
            };
            if seen.insert(item.url.clone()) {
                items.push(item);
            }
        }
        items
    }
}

#[async_trait]
impl Extractor<JsExecutor> for DomLinkExtractor {
    async fn extract(&self, page: &JsExecutor) -> DriverOutcome<Vec<DiscoveredItem>> {
        let script = match self.script() {
            Ok(script) => script,
            Err(e) => return DriverOutcome::TransientFailure(format!("构建提取脚本失败: {}", e)),
        };

        let links = match page.eval(script).await.and_then(Self::links_from_json) {
            Ok(links) => links,
            Err(e) => return DriverOutcome::TransientFailure(format!("提取链接失败: {}", e)),
        };
        let total = links.len();
        let items = self.filter_links(links);
        debug!("页面链接 {} 个，符合规则 {} 个", total, items.len());
        DriverOutcome::Success(items)
    }
}
