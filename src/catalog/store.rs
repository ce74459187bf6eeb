//! 目录持久化
//!
//! `CatalogStore` 只关心"整份读 / 整份写"。写入必须是原子的：
//! 要么旧文件完整，要么新文件完整。

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::CatalogState;
use crate::error::CatalogError;

/// 目录存储
pub trait CatalogStore {
    /// 读取目录。文件不存在或内容损坏都返回空目录，不报错。
    fn load(&self) -> CatalogState;

    /// 同步写入完整目录
    fn save(&self, state: &CatalogState) -> Result<(), CatalogError>;
}

/// JSON 文件存储（写临时文件再 rename）
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// 损坏的文件挪到 `.corrupt`，避免下一次写入把它覆盖掉
    fn quarantine(&self) {
        let target = self.sibling(".corrupt");
        match fs::rename(&self.path, &target) {
            Ok(()) => warn!("已将损坏的目录文件移至: {}", target.display()),
            Err(e) => warn!("无法移走损坏的目录文件 {}: {}", self.path.display(), e),
        }
    }
}

impl CatalogStore for JsonFileStore {
    fn load(&self) -> CatalogState {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("目录文件不存在，从空目录开始: {}", self.path.display());
                return CatalogState::default();
            }
            Err(e) => {
                warn!(
                    "⚠️ 读取目录文件失败 {}: {}，按空目录处理",
                    self.path.display(),
                    e
                );
                return CatalogState::default();
            }
        };

        // 非 UTF-8 内容同样算损坏，交给 serde_json 统一判定
        match serde_json::from_slice::<CatalogState>(&content) {
            Ok(state) => {
                debug!(
                    "已加载目录: {} 个条目, 上次同步 {:?}",
                    state.items.len(),
                    state.last_sync_date
                );
                state
            }
            Err(e) => {
                warn!(
                    "⚠️ 目录文件内容损坏 {}: {}，按空目录处理",
                    self.path.display(),
                    e
                );
                self.quarantine();
                CatalogState::default()
            }
        }
    }

    fn save(&self, state: &CatalogState) -> Result<(), CatalogError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let write_failed = |source: std::io::Error| CatalogError::WriteFailed {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let tmp = self.sibling(".tmp");
        {
            let mut file = File::create(&tmp).map_err(write_failed)?;
            file.write_all(&bytes).map_err(write_failed)?;
            file.sync_all().map_err(write_failed)?;
        }
        fs::rename(&tmp, &self.path).map_err(write_failed)?;
        Ok(())
    }
}

/// 内存存储，可共享句柄观察写入结果，也可模拟写入失败
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    saved: Option<CatalogState>,
    saves: usize,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: CatalogState) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.saved = Some(state);
        }
        store
    }

    /// 设置后续写入是否失败
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing = failing;
        }
    }

    /// 最近一次成功写入的内容
    pub fn saved(&self) -> Option<CatalogState> {
        self.inner.lock().ok().and_then(|inner| inner.saved.clone())
    }

    /// 成功写入的次数
    pub fn save_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.saves).unwrap_or(0)
    }
}

impl CatalogStore for MemoryStore {
    fn load(&self) -> CatalogState {
        self.saved().unwrap_or_default()
    }

    fn save(&self, state: &CatalogState) -> Result<(), CatalogError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| CatalogError::Unavailable("lock poisoned".to_string()))?;
        if inner.failing {
            return Err(CatalogError::Unavailable("模拟写入失败".to_string()));
        }
        inner.saved = Some(state.clone());
        inner.saves += 1;
        Ok(())
    }
}
