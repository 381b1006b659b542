//! Signal fusion.
//!
//! Maps raw signals onto named risk inputs in [0, 1] through a fixed rule
//! table, then combines the present inputs with configured weights
//! (renormalized over whatever is available) into one fused risk score.

pub mod normalize;
pub mod scorer;

pub use normalize::Normalization;
pub use scorer::{FusionConfig, FusionScorer, RiskInput, RISK_INPUTS};
