use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Decision: final verdict with a stable numeric action code
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Trusted,
    Review,
    Block,
}

impl Decision {
    /// Action code handed to downstream systems: 0 trusted, 1 review, 2 block.
    pub fn action_code(&self) -> u8 {
        match self {
            Decision::Trusted => 0,
            Decision::Review => 1,
            Decision::Block => 2,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Trusted => write!(f, "TRUSTED"),
            Decision::Review => write!(f, "REVIEW"),
            Decision::Block => write!(f, "BLOCK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCategory {
    Low,
    High,
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskCategory::Low => write!(f, "LOW"),
            RiskCategory::High => write!(f, "HIGH"),
        }
    }
}

/// The decision path that produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    Allowlist,
    Blocklist,
    HardOverride,
    Threshold,
    FastFail,
    StageFailure,
}

impl fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionRule::Allowlist => "allowlist",
            DecisionRule::Blocklist => "blocklist",
            DecisionRule::HardOverride => "hard_override",
            DecisionRule::Threshold => "threshold",
            DecisionRule::FastFail => "fast_fail",
            DecisionRule::StageFailure => "stage_failure",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// PolicyDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub action_code: u8,
    pub effective_score: f64,
    pub reasons: Vec<String>,
    pub risk_category: RiskCategory,
    pub rule: DecisionRule,
}

impl PolicyDecision {
    /// Builds a decision whose action code is derived from `decision`.
    pub fn new(
        decision: Decision,
        effective_score: f64,
        reasons: Vec<String>,
        risk_category: RiskCategory,
        rule: DecisionRule,
    ) -> Self {
        Self {
            decision,
            action_code: decision.action_code(),
            effective_score,
            reasons,
            risk_category,
            rule,
        }
    }

    /// Forced worst-case BLOCK, used for fast fails and stage failures.
    pub fn forced_block(rule: DecisionRule, reasons: Vec<String>) -> Self {
        Self::new(Decision::Block, 1.0, reasons, RiskCategory::High, rule)
    }
}
