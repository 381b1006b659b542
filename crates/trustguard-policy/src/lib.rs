//! Policy decisions for TrustGuard.
//!
//! Turns a fused risk score plus the raw signals and request context into a
//! TRUSTED / REVIEW / BLOCK verdict. Evaluation order is fixed: access lists,
//! then hard overrides on raw signals, then context-adjusted thresholds.

pub mod access;
pub mod config;
pub mod engine;

pub use access::AccessLists;
pub use config::{ActionMultipliers, ListConfig, OverrideLimits, PolicyConfig};
pub use engine::PolicyEngine;
