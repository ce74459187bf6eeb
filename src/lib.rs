//! # Feed Sampler
//!
//! 对一个信息流做周期性的"发现 + 抽样阅读"
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `browser/` - 浏览器驱动接口（`BrowserSession` / `SessionFactory`）及 chromiumoxide 实现
//!
//! ### ② 数据与存储（Models / Catalog）
//! - `models/` - 条目、状态、URL 规范化
//! - `catalog/` - 目录聚合根，原子写入的 JSON 存储
//!
//! ### ③ 业务能力层（Services）
//! - `ModeSelector` - 全量 / 增量发现策略
//! - `WeightedSampler` - 加权无放回抽样
//! - `DurationModel` - 停留时长模型
//! - `DomLinkExtractor` - 页面链接提取
//! - `SnapshotWriter` - 发现快照
//!
//! ### ④ 流程层（Workflow）
//! - `ConvergenceLoop` - 下滑直到收敛
//! - `VisitCtx` - 单篇阅读的日志上下文
//!
//! ### ⑤ 编排层（Orchestration）
//! - `RetryOrchestrator` - 发现重试 / 单篇阅读
//! - `RunScheduler` - 一次完整运行
//! - `App` - 进程入口
//!
//! ## 模块结构

pub mod browser;
pub mod catalog;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod testing;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{BrowserSession, DriverOutcome, Extractor, SessionFactory};
pub use catalog::{Catalog, CatalogStore, JsonFileStore, MemoryStore};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{DiscoveredItem, Item, ItemStatus};
pub use orchestrator::{App, RunReport, RunScheduler};
pub use workflow::{ConvergenceLoop, TerminationReason, VisitCtx};
