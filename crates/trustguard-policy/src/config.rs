use serde::{Deserialize, Serialize};

use trustguard_core::{Action, VerifyError, VerifyResult};

// ---------------------------------------------------------------------------
// ActionMultipliers: threshold tightening per business action
// ---------------------------------------------------------------------------

fn default_login_multiplier() -> f64 {
    1.0
}
fn default_profile_update_multiplier() -> f64 {
    0.9
}
fn default_high_value_tx_multiplier() -> f64 {
    0.8
}

/// Factors applied to both base thresholds. Values must be in (0, 1] so a
/// sensitive action can only make blocking easier, never harder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMultipliers {
    #[serde(default = "default_login_multiplier")]
    pub login: f64,
    #[serde(default = "default_profile_update_multiplier")]
    pub profile_update: f64,
    #[serde(default = "default_high_value_tx_multiplier")]
    pub high_value_tx: f64,
}

impl Default for ActionMultipliers {
    fn default() -> Self {
        Self {
            login: default_login_multiplier(),
            profile_update: default_profile_update_multiplier(),
            high_value_tx: default_high_value_tx_multiplier(),
        }
    }
}

impl ActionMultipliers {
    pub fn for_action(&self, action: Action) -> f64 {
        match action {
            Action::Login => self.login,
            Action::ProfileUpdate => self.profile_update,
            Action::HighValueTx => self.high_value_tx,
        }
    }
}

// ---------------------------------------------------------------------------
// OverrideLimits: raw-signal limits that force a BLOCK
// ---------------------------------------------------------------------------

fn default_video_fake_prob_limit() -> f64 {
    0.85
}
fn default_audio_spoof_limit() -> f64 {
    0.90
}
fn default_rppg_conf_floor() -> f64 {
    0.10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideLimits {
    /// BLOCK when `video_fake_prob` exceeds this.
    #[serde(default = "default_video_fake_prob_limit")]
    pub video_fake_prob: f64,
    /// BLOCK when `audio_spoof_score` exceeds this.
    #[serde(default = "default_audio_spoof_limit")]
    pub audio_spoof_score: f64,
    /// BLOCK when `rppg_conf` falls below this.
    #[serde(default = "default_rppg_conf_floor")]
    pub rppg_conf_floor: f64,
}

impl Default for OverrideLimits {
    fn default() -> Self {
        Self {
            video_fake_prob: default_video_fake_prob_limit(),
            audio_spoof_score: default_audio_spoof_limit(),
            rppg_conf_floor: default_rppg_conf_floor(),
        }
    }
}

// ---------------------------------------------------------------------------
// ListConfig: initial contents of the access lists
// ---------------------------------------------------------------------------

fn default_blocked_users() -> Vec<String> {
    vec!["user_fraud_123".into(), "banned_device_99".into()]
}
fn default_blocked_ips() -> Vec<String> {
    vec!["192.168.1.666".into(), "10.0.0.99".into()]
}
fn default_allowed_users() -> Vec<String> {
    vec!["admin_superuser".into()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default = "default_blocked_users")]
    pub blocked_users: Vec<String>,
    #[serde(default = "default_blocked_ips")]
    pub blocked_ips: Vec<String>,
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            blocked_users: default_blocked_users(),
            blocked_ips: default_blocked_ips(),
            allowed_users: default_allowed_users(),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyConfig
// ---------------------------------------------------------------------------

fn default_block_threshold() -> f64 {
    0.75
}
fn default_review_threshold() -> f64 {
    0.40
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_block_threshold")]
    pub block_threshold: f64,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default)]
    pub multipliers: ActionMultipliers,
    #[serde(default)]
    pub overrides: OverrideLimits,
    #[serde(default)]
    pub lists: ListConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            block_threshold: default_block_threshold(),
            review_threshold: default_review_threshold(),
            multipliers: ActionMultipliers::default(),
            overrides: OverrideLimits::default(),
            lists: ListConfig::default(),
        }
    }
}

fn check_unit(name: &str, value: f64) -> VerifyResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(VerifyError::Config(format!(
            "{} must be in [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

impl PolicyConfig {
    pub fn validate(&self) -> VerifyResult<()> {
        check_unit("block_threshold", self.block_threshold)?;
        check_unit("review_threshold", self.review_threshold)?;
        if self.review_threshold >= self.block_threshold {
            return Err(VerifyError::Config(format!(
                "review_threshold ({}) must be below block_threshold ({})",
                self.review_threshold, self.block_threshold
            )));
        }
        for (name, m) in [
            ("multipliers.login", self.multipliers.login),
            ("multipliers.profile_update", self.multipliers.profile_update),
            ("multipliers.high_value_tx", self.multipliers.high_value_tx),
        ] {
            if !(m > 0.0 && m <= 1.0) {
                return Err(VerifyError::Config(format!(
                    "{} must be in (0, 1], got {}",
                    name, m
                )));
            }
        }
        check_unit("overrides.video_fake_prob", self.overrides.video_fake_prob)?;
        check_unit("overrides.audio_spoof_score", self.overrides.audio_spoof_score)?;
        check_unit("overrides.rppg_conf_floor", self.overrides.rppg_conf_floor)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = PolicyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.multipliers.for_action(Action::HighValueTx), 0.8);
        assert!(config.lists.allowed_users.contains(&"admin_superuser".to_string()));
    }

    #[test]
    fn test_multiplier_above_one_rejected() {
        let mut config = PolicyConfig::default();
        config.multipliers.high_value_tx = 1.2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("high_value_tx"));
    }

    #[test]
    fn test_review_must_be_below_block() {
        let config = PolicyConfig {
            review_threshold: 0.8,
            ..PolicyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PolicyConfig = toml::from_str(
            r#"
            block_threshold = 0.7

            [multipliers]
            high_value_tx = 0.5

            [lists]
            blocked_users = []
            "#,
        )
        .unwrap();
        assert_eq!(config.block_threshold, 0.7);
        assert_eq!(config.review_threshold, 0.40);
        assert_eq!(config.multipliers.high_value_tx, 0.5);
        assert_eq!(config.multipliers.profile_update, 0.9);
        assert!(config.lists.blocked_users.is_empty());
        assert_eq!(config.lists.blocked_ips.len(), 2);
    }
}
