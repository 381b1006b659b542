//! Audit sinks and operational monitors for TrustGuard.
//!
//! Every sink implements `trustguard_core::AuditRecorder` and can be handed
//! to the orchestrator:
//! - `InMemoryAuditLog`: append-only, SHA-256 hash-chained trail
//! - `JsonlAuditLog`: append-only JSON-lines file
//! - `DriftMonitor`: counters and rolling score/deepfake windows
//! - `ReviewQueue`: REVIEW decisions awaiting a human

pub mod chain;
pub mod drift;
pub mod error;
pub mod jsonl;
pub mod review;

pub use chain::{ChainedRecord, InMemoryAuditLog, GENESIS_HASH};
pub use drift::{DriftMonitor, DriftStats, DriftWindows};
pub use error::{AuditError, AuditResult};
pub use jsonl::JsonlAuditLog;
pub use review::{ReviewQueue, ReviewStatus, ReviewTask};
