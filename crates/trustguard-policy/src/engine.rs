use std::sync::Arc;

use tracing::{debug, warn};

use trustguard_core::signals;
use trustguard_core::{
    usable_value, Action, Context, Decision, DecisionRule, FusionBreakdown, PolicyDecision,
    RiskCategory, SignalMap, VerifyResult,
};

use crate::access::AccessLists;
use crate::config::PolicyConfig;

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

/// Applies business rules to a fused score.
///
/// Order is strict and the first rule that fires wins:
/// 1. access lists (blocklist before allowlist),
/// 2. hard overrides on usable raw signals,
/// 3. action-adjusted thresholds on the fused score.
pub struct PolicyEngine {
    config: PolicyConfig,
    lists: Arc<AccessLists>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig, lists: Arc<AccessLists>) -> VerifyResult<Self> {
        config.validate()?;
        Ok(Self { config, lists })
    }

    /// Engine whose access lists are seeded from `config.lists`.
    pub fn from_config(config: PolicyConfig) -> VerifyResult<Self> {
        let lists = Arc::new(AccessLists::from_config(&config.lists));
        Self::new(config, lists)
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn lists(&self) -> &Arc<AccessLists> {
        &self.lists
    }

    /// (block, review) thresholds after applying the action multiplier.
    pub fn thresholds_for(&self, action: Action) -> (f64, f64) {
        let m = self.config.multipliers.for_action(action);
        (
            self.config.block_threshold * m,
            self.config.review_threshold * m,
        )
    }

    pub fn evaluate(
        &self,
        fusion: &FusionBreakdown,
        raw: &SignalMap,
        context: &Context,
    ) -> PolicyDecision {
        if let Some(user_id) = context.user_id.as_deref() {
            if self.lists.is_user_blocked(user_id) {
                warn!(user_id, "blocked user attempted verification");
                return PolicyDecision::new(
                    Decision::Block,
                    1.0,
                    vec!["User ID in blocklist".to_string()],
                    RiskCategory::High,
                    DecisionRule::Blocklist,
                );
            }
            if self.lists.is_user_allowed(user_id) {
                debug!(user_id, "allowlisted user bypasses scoring");
                return PolicyDecision::new(
                    Decision::Trusted,
                    0.0,
                    vec!["User ID in allowlist".to_string()],
                    RiskCategory::Low,
                    DecisionRule::Allowlist,
                );
            }
        }

        if let Some(reason) = self.check_overrides(raw) {
            warn!(reason = %reason, "hard override triggered");
            return PolicyDecision::forced_block(DecisionRule::HardOverride, vec![reason]);
        }

        let mut reasons = Vec::new();
        let multiplier = self.config.multipliers.for_action(context.action);
        let (block, review) = self.thresholds_for(context.action);
        if multiplier < 1.0 {
            reasons.push(format!(
                "Thresholds tightened due to sensitive context: {}",
                context.action
            ));
        }
        if fusion.insufficient_evidence {
            reasons.push("Insufficient evidence: no usable signals for fusion".to_string());
        }

        let score = fusion.final_score;
        let decision = if score >= block {
            reasons.push(format!(
                "Score {:.2} exceeded block threshold {:.2}",
                score, block
            ));
            Decision::Block
        } else if score >= review {
            reasons.push(format!(
                "Score {:.2} requires manual review or step-up",
                score
            ));
            Decision::Review
        } else {
            reasons.push("Score within safe limits".to_string());
            Decision::Trusted
        };

        // Derived from the fusion pass flag, not from the decision: a score
        // between the pass threshold and the block threshold is HIGH risk
        // but only REVIEW.
        let risk_category = if fusion.pass {
            RiskCategory::Low
        } else {
            RiskCategory::High
        };

        debug!(
            %decision,
            score,
            block_threshold = block,
            review_threshold = review,
            action = %context.action,
            "policy applied"
        );
        PolicyDecision::new(
            decision,
            score,
            reasons,
            risk_category,
            DecisionRule::Threshold,
        )
    }

    fn check_overrides(&self, raw: &SignalMap) -> Option<String> {
        let limits = &self.config.overrides;
        if let Some(p) = usable_value(raw, signals::VIDEO_FAKE_PROB) {
            if p > limits.video_fake_prob {
                return Some(format!(
                    "CRITICAL: Video deepfake probability {:.2} exceeded safety limit",
                    p
                ));
            }
        }
        if let Some(s) = usable_value(raw, signals::AUDIO_SPOOF_SCORE) {
            if s > limits.audio_spoof_score {
                return Some(format!(
                    "CRITICAL: Audio spoof score {:.2} exceeded safety limit",
                    s
                ));
            }
        }
        if let Some(c) = usable_value(raw, signals::RPPG_CONF) {
            if c < limits.rppg_conf_floor {
                return Some(
                    "CRITICAL: Liveness check failed (No physiological signal)".to_string(),
                );
            }
        }
        None
    }
}
