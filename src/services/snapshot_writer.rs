//! 发现快照写入服务 - 业务能力层
//!
//! 每次发现成功后，把本次看到的全部链接写成一个独立的 JSON 文件，
//! 方便排查页面结构变化。与目录文件无关，写失败不影响运行。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::debug;

use crate::models::DiscoveredItem;

#[derive(Debug, Serialize)]
struct SnapshotLink<'a> {
    href: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    source_url: &'a str,
    scraped_at: String,
    count: usize,
    links: Vec<SnapshotLink<'a>>,
}

/// 快照写入服务
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 覆盖写入本次发现的快照
    pub fn write(&self, source_url: &str, items: &[DiscoveredItem]) -> Result<()> {
        let snapshot = Snapshot {
            source_url,
            scraped_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            count: items.len(),
            links: items
                .iter()
                .map(|item| SnapshotLink {
                    href: &item.url,
                    text: &item.title,
                })
                .collect(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("无法创建目录: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("无法写入快照: {}", self.path.display()))?;

        debug!("快照已写入 {} ({} 条)", self.path.display(), items.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().join("data").join("snapshot.json"));
        writer
            .write(
                "https://www.toutiao.com/c/user/token/x/",
                &[DiscoveredItem::new("https://www.toutiao.com/w/1/", "一")],
            )
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(writer.path()).unwrap()).unwrap();
        assert_eq!(raw["source_url"], "https://www.toutiao.com/c/user/token/x/");
        assert_eq!(raw["count"], 1);
        assert_eq!(raw["links"][0]["href"], "https://www.toutiao.com/w/1/");
        assert_eq!(raw["links"][0]["text"], "一");
        assert!(raw["scraped_at"].as_str().unwrap().ends_with('Z'));
    }
}
