//! TrustGuard Root Library
//!
//! Configuration, error handling and the wiring that turns a `RootConfig`
//! into a ready orchestrator with its audit sinks attached: the JSON-lines
//! trail, the in-memory hash chain, the drift monitor and the review queue.

pub mod config;
pub mod demo;
pub mod error;

pub use config::{AuditConfig, RootConfig};
pub use error::{RootError, RootResult};

use std::sync::Arc;
use tracing::info;

use trustguard_audit::{DriftMonitor, InMemoryAuditLog, JsonlAuditLog, ReviewQueue};
use trustguard_pipeline::{Orchestrator, OrchestratorBuilder};

/// Initialized subsystems. The audit sinks are shared with the orchestrator,
/// which feeds every finished verification to each of them.
pub struct RootState {
    pub config: RootConfig,
    pub orchestrator: Orchestrator,
    pub audit_log: Arc<JsonlAuditLog>,
    pub chain: Arc<InMemoryAuditLog>,
    pub drift: Arc<DriftMonitor>,
    pub review: Arc<ReviewQueue>,
}

/// Builds the orchestrator with the bundled heuristic providers.
pub fn initialize(config: RootConfig) -> RootResult<RootState> {
    initialize_with(config, |builder| builder)
}

/// Like [`initialize`], with a hook to register additional providers or a
/// frame classifier before the orchestrator is built.
pub fn initialize_with<F>(config: RootConfig, extend: F) -> RootResult<RootState>
where
    F: FnOnce(OrchestratorBuilder) -> OrchestratorBuilder,
{
    config.validate()?;

    info!(
        audit_log = %config.audit.log_path.display(),
        max_workers = config.pipeline.max_workers,
        total_timeout_ms = config.pipeline.total_timeout_ms,
        "initializing trustguard"
    );

    let audit_log = Arc::new(JsonlAuditLog::open(config.audit.log_path.clone())?);
    let chain = Arc::new(InMemoryAuditLog::new());
    let drift = Arc::new(DriftMonitor::new(config.audit.drift.clone()));
    let review =
        Arc::new(ReviewQueue::new().with_evidence_root(config.audit.evidence_root.clone()));

    let builder = Orchestrator::builder(config.pipeline.clone())
        .fusion(config.fusion.clone())
        .policy(config.policy.clone())
        .heuristics()
        .recorder(audit_log.clone())
        .recorder(chain.clone())
        .recorder(drift.clone())
        .recorder(review.clone());
    let orchestrator = extend(builder).build()?;

    Ok(RootState {
        config,
        orchestrator,
        audit_log,
        chain,
        drift,
        review,
    })
}
