pub mod convergence;
pub mod visit_ctx;

pub use convergence::{ConvergenceLoop, ConvergenceReport, TerminationReason};
pub use visit_ctx::VisitCtx;
