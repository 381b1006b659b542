use serde::{Deserialize, Serialize};
use std::time::Duration;

use trustguard_core::{VerifyError, VerifyResult, DEFAULT_AUDIT_PREFIX};

use crate::aggregate::FrameAggregation;

// ---------------------------------------------------------------------------
// Stage1Config
// ---------------------------------------------------------------------------

fn default_blur_floor() -> f64 {
    50.0
}
fn default_blur_degraded() -> f64 {
    100.0
}
fn default_expected_app_id() -> Option<String> {
    Some("com.trustguard.bank".to_string())
}
fn default_doc_min_width() -> u32 {
    320
}
fn default_doc_min_height() -> u32 {
    200
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Config {
    /// Sharpness below this fast-fails the capture.
    #[serde(default = "default_blur_floor")]
    pub blur_floor: f64,
    /// Sharpness below this only adds a quality warning.
    #[serde(default = "default_blur_degraded")]
    pub blur_degraded: f64,
    /// Package id a genuine client reports. `None` or empty disables the check.
    #[serde(default = "default_expected_app_id")]
    pub expected_app_id: Option<String>,
    #[serde(default = "default_doc_min_width")]
    pub doc_min_width: u32,
    #[serde(default = "default_doc_min_height")]
    pub doc_min_height: u32,
}

impl Default for Stage1Config {
    fn default() -> Self {
        Self {
            blur_floor: default_blur_floor(),
            blur_degraded: default_blur_degraded(),
            expected_app_id: default_expected_app_id(),
            doc_min_width: default_doc_min_width(),
            doc_min_height: default_doc_min_height(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

fn default_stage1_timeout_ms() -> u64 {
    500
}
fn default_stage2_timeout_ms() -> u64 {
    4_000
}
fn default_total_timeout_ms() -> u64 {
    5_000
}
fn default_provider_timeout_ms() -> u64 {
    3_000
}
fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_frame_stride() -> usize {
    5
}
fn default_min_deepfake_frames() -> usize {
    3
}
fn default_min_usable_signals() -> usize {
    2
}
fn default_deepfake_pass_threshold() -> f64 {
    0.5
}
fn default_explain_top_n() -> usize {
    3
}
fn default_audit_prefix() -> String {
    DEFAULT_AUDIT_PREFIX.to_string()
}

/// Budgets, pool size and evidence minima for one orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_stage1_timeout_ms")]
    pub stage1_timeout_ms: u64,
    #[serde(default = "default_stage2_timeout_ms")]
    pub stage2_timeout_ms: u64,
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,
    /// Sub-budget for each Stage 2 provider and the frame classifier.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Classify every n-th frame.
    #[serde(default = "default_frame_stride")]
    pub frame_stride: usize,
    #[serde(default)]
    pub frame_aggregation: FrameAggregation,
    #[serde(default = "default_min_deepfake_frames")]
    pub min_deepfake_frames: usize,
    #[serde(default = "default_min_usable_signals")]
    pub min_usable_signals: usize,
    #[serde(default = "default_deepfake_pass_threshold")]
    pub deepfake_pass_threshold: f64,
    #[serde(default = "default_explain_top_n")]
    pub explain_top_n: usize,
    #[serde(default = "default_audit_prefix")]
    pub audit_prefix: String,
    #[serde(default)]
    pub stage1: Stage1Config,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage1_timeout_ms: default_stage1_timeout_ms(),
            stage2_timeout_ms: default_stage2_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
            provider_timeout_ms: default_provider_timeout_ms(),
            max_workers: default_max_workers(),
            frame_stride: default_frame_stride(),
            frame_aggregation: FrameAggregation::default(),
            min_deepfake_frames: default_min_deepfake_frames(),
            min_usable_signals: default_min_usable_signals(),
            deepfake_pass_threshold: default_deepfake_pass_threshold(),
            explain_top_n: default_explain_top_n(),
            audit_prefix: default_audit_prefix(),
            stage1: Stage1Config::default(),
        }
    }
}

impl PipelineConfig {
    pub fn stage1_budget(&self) -> Duration {
        Duration::from_millis(self.stage1_timeout_ms)
    }

    pub fn stage2_budget(&self) -> Duration {
        Duration::from_millis(self.stage2_timeout_ms)
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    pub fn provider_budget(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn validate(&self) -> VerifyResult<()> {
        for (name, ms) in [
            ("stage1_timeout_ms", self.stage1_timeout_ms),
            ("stage2_timeout_ms", self.stage2_timeout_ms),
            ("total_timeout_ms", self.total_timeout_ms),
            ("provider_timeout_ms", self.provider_timeout_ms),
        ] {
            if ms == 0 {
                return Err(VerifyError::Config(format!("{} must be positive", name)));
            }
        }
        for (name, ms, outer, limit) in [
            ("stage1_timeout_ms", self.stage1_timeout_ms, "total_timeout_ms", self.total_timeout_ms),
            ("stage2_timeout_ms", self.stage2_timeout_ms, "total_timeout_ms", self.total_timeout_ms),
            ("provider_timeout_ms", self.provider_timeout_ms, "stage2_timeout_ms", self.stage2_timeout_ms),
        ] {
            if ms > limit {
                return Err(VerifyError::Config(format!(
                    "{} ({}) must not exceed {} ({})",
                    name, ms, outer, limit
                )));
            }
        }
        if self.max_workers == 0 {
            return Err(VerifyError::Config("max_workers must be positive".into()));
        }
        if self.frame_stride == 0 {
            return Err(VerifyError::Config("frame_stride must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.deepfake_pass_threshold) {
            return Err(VerifyError::Config(format!(
                "deepfake_pass_threshold must be in [0, 1], got {}",
                self.deepfake_pass_threshold
            )));
        }
        if self.audit_prefix.is_empty() || self.audit_prefix.contains('-') {
            return Err(VerifyError::Config(format!(
                "audit_prefix must be non-empty and contain no '-', got '{}'",
                self.audit_prefix
            )));
        }
        if self.stage1.blur_floor > self.stage1.blur_degraded {
            return Err(VerifyError::Config(format!(
                "stage1.blur_floor ({}) must not exceed stage1.blur_degraded ({})",
                self.stage1.blur_floor, self.stage1.blur_degraded
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stage1_budget(), Duration::from_millis(500));
        assert_eq!(config.stage2_budget(), Duration::from_secs(4));
        assert_eq!(config.total_budget(), Duration::from_secs(5));
        assert!(config.max_workers >= 1);
        assert_eq!(
            config.stage1.expected_app_id.as_deref(),
            Some("com.trustguard.bank")
        );
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = PipelineConfig {
            stage2_timeout_ms: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stage_budget_over_total_rejected() {
        let config = PipelineConfig {
            stage1_timeout_ms: 6_000,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stage1_timeout_ms"));

        let config = PipelineConfig {
            stage2_timeout_ms: 5_001,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stage2_timeout_ms"));
    }

    #[test]
    fn test_provider_budget_over_stage2_rejected() {
        let config = PipelineConfig {
            stage2_timeout_ms: 1_000,
            provider_timeout_ms: 1_500,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("provider_timeout_ms"));

        let equal = PipelineConfig {
            stage2_timeout_ms: 1_000,
            provider_timeout_ms: 1_000,
            ..PipelineConfig::default()
        };
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn test_prefix_with_dash_rejected() {
        let config = PipelineConfig {
            audit_prefix: "MY-REQ".into(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_blur_limits_rejected() {
        let mut config = PipelineConfig::default();
        config.stage1.blur_floor = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_overrides() {
        let config: PipelineConfig = toml::from_str(
            r#"
            stage2_timeout_ms = 2500
            frame_aggregation = "p90"

            [stage1]
            blur_floor = 30.0
            "#,
        )
        .unwrap();
        assert_eq!(config.stage2_timeout_ms, 2500);
        assert_eq!(config.frame_aggregation, FrameAggregation::P90);
        assert_eq!(config.stage1.blur_floor, 30.0);
        assert_eq!(config.stage1.blur_degraded, 100.0);
        assert_eq!(config.min_deepfake_frames, 3);
    }
}
