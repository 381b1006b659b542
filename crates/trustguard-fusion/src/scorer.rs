use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use trustguard_core::signals;
use trustguard_core::{usable_value, FusionBreakdown, SignalMap, VerifyError, VerifyResult};

use crate::normalize::Normalization;

/// Normalized risk above which an input is called out in explanations.
pub const EXPLAIN_RISK_FLOOR: f64 = 0.6;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// One named risk input: where its raw value comes from and how it is
/// normalized.
#[derive(Debug, Clone, Copy)]
pub struct RiskInput {
    pub name: &'static str,
    pub source: &'static str,
    pub rule: Normalization,
}

pub const RISK_INPUTS: &[RiskInput] = &[
    RiskInput {
        name: "deepfake",
        source: signals::VIDEO_FAKE_PROB,
        rule: Normalization::Probability,
    },
    RiskInput {
        name: "liveness",
        source: signals::RPPG_CONF,
        rule: Normalization::OkAbove(0.5),
    },
    RiskInput {
        name: "blur",
        source: signals::SHARPNESS_VAR,
        rule: Normalization::InvertedMinMax { lo: 0.0, hi: 200.0 },
    },
    RiskInput {
        name: "rppg",
        source: signals::RPPG_CONF,
        rule: Normalization::OkAbove(0.5),
    },
    RiskInput {
        name: "optical_flow",
        source: signals::FLOW_VARIANCE,
        rule: Normalization::OkBelow(0.4),
    },
    RiskInput {
        name: "audio_spoof",
        source: signals::AUDIO_SPOOF_SCORE,
        rule: Normalization::Probability,
    },
    RiskInput {
        name: "jitter",
        source: signals::JITTER_SCORE,
        rule: Normalization::Sigmoid { threshold: 0.4 },
    },
    RiskInput {
        name: "lip_sync",
        source: signals::LIP_SYNC_SCORE,
        rule: Normalization::InvertedMinMax { lo: 0.0, hi: 1.0 },
    },
    RiskInput {
        name: "voice_mismatch",
        source: signals::VOICE_MISMATCH_SCORE,
        rule: Normalization::Probability,
    },
];

fn find_input(name: &str) -> Option<&'static RiskInput> {
    RISK_INPUTS.iter().find(|i| i.name == name)
}

/// "optical_flow" -> "Optical Flow"
fn display_name(name: &str) -> String {
    name.split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// FusionConfig
// ---------------------------------------------------------------------------

fn default_weights() -> BTreeMap<String, f64> {
    [
        ("deepfake", 0.5),
        ("liveness", 0.2),
        ("blur", 0.1),
        ("rppg", 0.1),
        ("optical_flow", 0.1),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_pass_threshold() -> f64 {
    0.6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Weight per risk input name. Inputs not listed have weight 0.
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,
    /// Fused scores strictly below this pass.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            pass_threshold: default_pass_threshold(),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> VerifyResult<()> {
        for (name, weight) in &self.weights {
            if find_input(name).is_none() {
                return Err(VerifyError::Config(format!(
                    "unknown fusion input '{}'",
                    name
                )));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(VerifyError::Config(format!(
                    "fusion weight for '{}' must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(VerifyError::Config(format!(
                "fusion weights must sum to 1.0, got {:.6}",
                sum
            )));
        }
        if !(self.pass_threshold > 0.0 && self.pass_threshold <= 1.0) {
            return Err(VerifyError::Config(format!(
                "pass_threshold must be in (0, 1], got {}",
                self.pass_threshold
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FusionScorer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FusionScorer {
    config: FusionConfig,
}

impl FusionScorer {
    pub fn new(config: FusionConfig) -> VerifyResult<Self> {
        config.validate()?;
        info!(
            weights = ?config.weights,
            pass_threshold = config.pass_threshold,
            "fusion scorer configured"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuses `signals` into one risk score.
    ///
    /// Only inputs with a positive weight and a usable source reading take
    /// part; their weights are renormalized to sum to one. With nothing to
    /// fuse the result is the worst case, flagged `insufficient_evidence`.
    pub fn score(&self, signals: &SignalMap) -> FusionBreakdown {
        let mut present: Vec<(&'static str, f64, f64)> = Vec::new();
        for input in RISK_INPUTS {
            let weight = self.config.weights.get(input.name).copied().unwrap_or(0.0);
            if weight <= 0.0 {
                continue;
            }
            if let Some(raw) = usable_value(signals, input.source) {
                present.push((input.name, weight, input.rule.risk(raw)));
            }
        }

        let total_weight: f64 = present.iter().map(|(_, w, _)| w).sum();
        if present.is_empty() || total_weight <= 0.0 {
            debug!("no usable fusion inputs");
            return FusionBreakdown::insufficient();
        }

        let mut contributions = BTreeMap::new();
        let mut risks = BTreeMap::new();
        let mut sum = 0.0;
        for (name, weight, risk) in present {
            let contribution = weight / total_weight * risk;
            sum += contribution;
            contributions.insert(name.to_string(), contribution);
            risks.insert(name.to_string(), risk);
        }

        let final_score = sum.clamp(0.0, 1.0);
        let pass = final_score < self.config.pass_threshold;
        debug!(final_score, pass, inputs = risks.len(), "fusion scored");

        FusionBreakdown {
            final_score,
            contributions,
            risks,
            pass,
            insufficient_evidence: false,
        }
    }

    /// Human-readable call-outs for the riskiest inputs, highest first.
    pub fn explain(&self, breakdown: &FusionBreakdown, top_n: usize) -> Vec<String> {
        let mut high: Vec<(&String, f64)> = breakdown
            .risks
            .iter()
            .filter(|(_, r)| **r > EXPLAIN_RISK_FLOOR)
            .map(|(k, r)| (k, *r))
            .collect();
        high.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        high.into_iter()
            .take(top_n)
            .map(|(name, risk)| format!("{} indicated high risk ({:.2})", display_name(name), risk))
            .collect()
    }
}
