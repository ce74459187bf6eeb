//! 目录（聚合根）
//!
//! 保存所有发现过的条目及其阅读状态。每个修改操作在返回前同步写入完整目录；
//! 写入失败只记录日志并把目录标记为"未保存"，后续任何修改（以及运行结束时的
//! `flush`）都会重新尝试整份写入。

pub mod store;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::CatalogError;
use crate::models::item::is_placeholder;
use crate::models::{DiscoveredItem, Item, ItemStatus};

pub use store::{CatalogStore, JsonFileStore, MemoryStore};

/// 持久化的目录内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogState {
    pub last_sync_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: BTreeMap<String, Item>,
}

/// 目录
pub struct Catalog<S: CatalogStore> {
    state: CatalogState,
    store: S,
    dirty: bool,
}

impl<S: CatalogStore> Catalog<S> {
    /// 从存储加载目录
    pub fn open(store: S) -> Self {
        let state = store.load();
        Self {
            state,
            store,
            dirty: false,
        }
    }

    pub fn state(&self) -> &CatalogState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.state.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.items.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&Item> {
        self.state.items.get(url)
    }

    /// 按 url 升序遍历
    pub fn items(&self) -> impl Iterator<Item = (&String, &Item)> {
        self.state.items.iter()
    }

    pub fn last_sync_date(&self) -> Option<NaiveDate> {
        self.state.last_sync_date
    }

    /// 是否有未成功写入的修改
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 今天是否需要执行发现
    pub fn needs_discovery(&self, today: NaiveDate) -> bool {
        self.state.last_sync_date != Some(today) || self.state.items.is_empty()
    }

    /// 合并一次发现的结果，返回新增条目数
    ///
    /// 已有条目只在"当前是占位标题、新标题不是占位"时更新标题，其余字段不动。
    pub fn merge(&mut self, discovered: &[DiscoveredItem]) -> usize {
        let mut added = 0;
        let mut upgraded = 0;

        for raw in discovered {
            let Some(found) = raw.canonicalized() else {
                debug!("忽略无法解析的链接: {}", raw.url);
                continue;
            };

            match self.state.items.get_mut(&found.url) {
                None => {
                    self.state
                        .items
                        .insert(found.url, Item::discovered(&found.title));
                    added += 1;
                }
                Some(existing) => {
                    if existing.has_placeholder_title() && !is_placeholder(&found.title) {
                        existing.title = found.title;
                        upgraded += 1;
                    }
                }
            }
        }

        if added > 0 || upgraded > 0 {
            debug!("合并完成: 新增 {}, 补全标题 {}", added, upgraded);
            self.persist();
        }
        added
    }

    /// 记录发现完成的日期
    pub fn mark_synced(&mut self, today: NaiveDate) {
        self.state.last_sync_date = Some(today);
        self.persist();
    }

    /// 标记条目失效，返回是否发生了变化
    pub fn mark_invalid(&mut self, url: &str) -> bool {
        match self.state.items.get_mut(url) {
            Some(item) if item.status == ItemStatus::Active => {
                item.status = ItemStatus::Invalid;
                info!("🚫 条目已标记为失效: {}", url);
                self.persist();
                true
            }
            _ => false,
        }
    }

    /// 记录一次阅读，返回是否发生了变化
    pub fn record_visit(&mut self, url: &str, today: NaiveDate) -> bool {
        match self.state.items.get_mut(url) {
            Some(item) => {
                item.last_read_date = Some(today);
                item.read_count = item.read_count.saturating_add(1);
                self.persist();
                true
            }
            None => false,
        }
    }

    /// 重新尝试写入（若有未保存的修改）
    pub fn flush(&mut self) -> Result<(), CatalogError> {
        if !self.dirty {
            return Ok(());
        }
        self.store.save(&self.state)?;
        self.dirty = false;
        Ok(())
    }

    fn persist(&mut self) {
        match self.store.save(&self.state) {
            Ok(()) => self.dirty = false,
            Err(e) => {
                error!("❌ 目录写入失败，本次修改暂存于内存: {}", e);
                self.dirty = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PLACEHOLDER_TITLE;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn found(url: &str, title: &str) -> DiscoveredItem {
        DiscoveredItem::new(url, title)
    }

    fn catalog() -> (Catalog<MemoryStore>, MemoryStore) {
        let store = MemoryStore::new();
        (Catalog::open(store.clone()), store)
    }

    #[test]
    fn test_empty_catalog_needs_discovery() {
        let (catalog, _) = catalog();
        assert!(catalog.needs_discovery(day(1)));
    }

    #[test]
    fn test_synced_today_skips_discovery() {
        let (mut catalog, _) = catalog();
        catalog.merge(&[found("https://a.com/w/1/", "一")]);
        catalog.mark_synced(day(1));

        assert!(!catalog.needs_discovery(day(1)));
        assert!(catalog.needs_discovery(day(2)));
    }

    #[test]
    fn test_synced_but_empty_still_needs_discovery() {
        let (mut catalog, _) = catalog();
        catalog.mark_synced(day(1));
        assert!(catalog.needs_discovery(day(1)));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (mut catalog, store) = catalog();
        let batch = vec![
            found("https://a.com/w/1/", "一"),
            found("https://a.com/w/2/?from=feed", "二"),
        ];

        assert_eq!(catalog.merge(&batch), 2);
        let after_first = catalog.state().clone();
        let saves = store.save_count();

        assert_eq!(catalog.merge(&batch), 0);
        assert_eq!(catalog.state(), &after_first);
        assert_eq!(store.save_count(), saves);
    }

    #[test]
    fn test_merge_canonicalizes_and_dedups_within_batch() {
        let (mut catalog, _) = catalog();
        let added = catalog.merge(&[
            found("https://a.com/w/1/?x=1", "一"),
            found("https://a.com/w/1/#top", "一"),
            found("not a url", "坏"),
        ]);
        assert_eq!(added, 1);
        assert!(catalog.get("https://a.com/w/1/").is_some());
    }

    #[test]
    fn test_placeholder_title_is_upgraded() {
        let (mut catalog, _) = catalog();
        catalog.merge(&[found("https://a.com/w/1/", "")]);
        assert_eq!(catalog.get("https://a.com/w/1/").unwrap().title, PLACEHOLDER_TITLE);

        assert_eq!(catalog.merge(&[found("https://a.com/w/1/", "真实标题")]), 0);
        assert_eq!(catalog.get("https://a.com/w/1/").unwrap().title, "真实标题");
    }

    #[test]
    fn test_real_title_is_never_overwritten() {
        let (mut catalog, _) = catalog();
        catalog.merge(&[found("https://a.com/w/1/", "原标题")]);
        catalog.merge(&[found("https://a.com/w/1/", "新标题")]);
        catalog.merge(&[found("https://a.com/w/1/", "")]);
        assert_eq!(catalog.get("https://a.com/w/1/").unwrap().title, "原标题");
    }

    #[test]
    fn test_merge_never_touches_reading_state() {
        let (mut catalog, _) = catalog();
        catalog.merge(&[found("https://a.com/w/1/", "一")]);
        catalog.record_visit("https://a.com/w/1/", day(1));
        catalog.mark_invalid("https://a.com/w/1/");

        catalog.merge(&[found("https://a.com/w/1/", "一")]);
        let item = catalog.get("https://a.com/w/1/").unwrap();
        assert_eq!(item.status, ItemStatus::Invalid);
        assert_eq!(item.read_count, 1);
    }

    #[test]
    fn test_status_is_monotonic() {
        let (mut catalog, _) = catalog();
        let url = "https://a.com/w/1/";
        catalog.merge(&[found(url, "一")]);

        assert!(catalog.mark_invalid(url));
        assert!(!catalog.mark_invalid(url));
        catalog.record_visit(url, day(2));
        catalog.merge(&[found(url, "一")]);

        assert_eq!(catalog.get(url).unwrap().status, ItemStatus::Invalid);
    }

    #[test]
    fn test_unknown_urls_are_noops() {
        let (mut catalog, store) = catalog();
        assert!(!catalog.mark_invalid("https://a.com/missing/"));
        assert!(!catalog.record_visit("https://a.com/missing/", day(1)));
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_record_visit_updates_date_and_count() {
        let (mut catalog, store) = catalog();
        let url = "https://a.com/w/1/";
        catalog.merge(&[found(url, "一")]);
        catalog.record_visit(url, day(1));
        catalog.record_visit(url, day(3));

        let item = catalog.get(url).unwrap();
        assert_eq!(item.read_count, 2);
        assert_eq!(item.last_read_date, Some(day(3)));
        assert_eq!(store.saved().unwrap().items[url].read_count, 2);
    }

    #[test]
    fn test_failed_write_is_retried_by_next_mutation() {
        let (mut catalog, store) = catalog();
        store.set_failing(true);
        catalog.merge(&[found("https://a.com/w/1/", "一")]);
        assert!(catalog.is_dirty());
        assert!(store.saved().is_none());

        store.set_failing(false);
        catalog.mark_synced(day(1));
        assert!(!catalog.is_dirty());
        assert_eq!(store.saved().unwrap().items.len(), 1);
    }

    #[test]
    fn test_flush_writes_pending_changes() {
        let (mut catalog, store) = catalog();
        store.set_failing(true);
        catalog.merge(&[found("https://a.com/w/1/", "一")]);
        assert!(catalog.flush().is_err());

        store.set_failing(false);
        assert!(catalog.flush().is_ok());
        assert!(!catalog.is_dirty());
        assert_eq!(store.saved().unwrap().items.len(), 1);
    }

    #[test]
    fn test_reopen_sees_persisted_state() {
        let (mut catalog, store) = catalog();
        catalog.merge(&[found("https://a.com/w/1/", "一")]);
        catalog.mark_synced(day(1));

        let reopened = Catalog::open(store);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.last_sync_date(), Some(day(1)));
    }
}
