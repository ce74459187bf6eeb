//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次运行的完整调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行、统计）
//! - 组装真实浏览器驱动、提取器、目录文件
//!
//! ### `scheduler` - 单次运行调度
//! - 判断是否需要发现、选择模式
//! - 抽取阅读列表，逐篇阅读，篇间冷却
//! - 汇总 `RunReport`
//!
//! ### `retry` - 重试编排
//! - 发现流程：有限次重试 + 退避，每次全新会话，失败不写目录
//! - 单篇阅读：只尝试一次，按结果更新目录
//!
//! ## 层次关系
//!
//! ```text
//! app (进程级资源)
//!     ↓
//! scheduler (一次运行)
//!     ↓
//! retry (发现 / 阅读)
//!     ↓
//! workflow::ConvergenceLoop (一次发现的下滑循环)
//!     ↓
//! services / browser / catalog
//! ```

pub mod app;
pub mod retry;
pub mod scheduler;

// 重新导出主要类型
pub use app::App;
pub use retry::{DiscoveryFailure, DiscoveryOutcome, RetryOrchestrator, VisitOutcome};
pub use scheduler::{DiscoveryStatus, RunReport, RunScheduler};
