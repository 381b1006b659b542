//! The TrustGuard verification pipeline.
//!
//! `Orchestrator::assess_verification` drives one capture through
//! Stage 1 (cheap checks that may fast-fail), Stage 2 (concurrent signal
//! providers and the frame classifier), fusion and policy, under a
//! per-stage and total wall-clock budget. Every path ends in exactly one
//! `PolicyDecision` and one `AuditRecord`.

pub mod aggregate;
pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod stage1;
pub mod stage2;
pub mod timeout;

pub use aggregate::FrameAggregation;
pub use config::{PipelineConfig, Stage1Config};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use providers::{
    AudioPresence, DocumentFormatCheck, FlowConsistency, FnProvider, LaplacianSharpness,
};
pub use stage1::Stage1;
pub use stage2::Stage2;
pub use timeout::{run_provider_with_budget, run_with_budget, Deadline};
