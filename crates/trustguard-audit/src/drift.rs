//! Operational counters and rolling drift detection.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

use trustguard_core::signals;
use trustguard_core::{AuditRecord, AuditRecorder, Decision, PipelineState, RiskCategory, VerifyResult};

use crate::error::{AuditError, AuditResult};

fn default_score_window() -> usize {
    100
}
fn default_score_min_samples() -> usize {
    50
}
fn default_score_alarm_mean() -> f64 {
    0.8
}
fn default_deepfake_window() -> usize {
    100
}
fn default_deepfake_alert_mean() -> f64 {
    0.2
}

/// Window sizes and alarm levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftWindows {
    #[serde(default = "default_score_window")]
    pub score_window: usize,
    /// Scores needed before the score alarm can fire.
    #[serde(default = "default_score_min_samples")]
    pub score_min_samples: usize,
    #[serde(default = "default_score_alarm_mean")]
    pub score_alarm_mean: f64,
    #[serde(default = "default_deepfake_window")]
    pub deepfake_window: usize,
    /// The deepfake alert only fires over a full window.
    #[serde(default = "default_deepfake_alert_mean")]
    pub deepfake_alert_mean: f64,
}

impl Default for DriftWindows {
    fn default() -> Self {
        Self {
            score_window: default_score_window(),
            score_min_samples: default_score_min_samples(),
            score_alarm_mean: default_score_alarm_mean(),
            deepfake_window: default_deepfake_window(),
            deepfake_alert_mean: default_deepfake_alert_mean(),
        }
    }
}

impl DriftWindows {
    pub fn validate(&self) -> Result<(), String> {
        if self.score_window == 0 || self.deepfake_window == 0 {
            return Err("drift windows must be non-empty".into());
        }
        if self.score_min_samples > self.score_window {
            return Err("score_min_samples cannot exceed score_window".into());
        }
        for (name, v) in [
            ("score_alarm_mean", self.score_alarm_mean),
            ("deepfake_alert_mean", self.deepfake_alert_mean),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("{} must be in [0, 1], got {}", name, v));
            }
        }
        Ok(())
    }
}

/// Snapshot returned by [`DriftMonitor::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriftStats {
    pub total: u64,
    pub trusted: u64,
    pub reviewed: u64,
    pub blocked: u64,
    pub fast_fail: u64,
    pub stage_failures: u64,
    pub deepfake_detections: u64,
    pub high_risk: u64,
    pub latency_sum_ms: u64,
    pub avg_latency_ms: f64,
    pub block_rate: f64,
    pub deepfake_detection_rate: f64,
    pub high_risk_rate: f64,
    pub score_mean: Option<f64>,
    pub deepfake_mean: Option<f64>,
    pub score_alarm: bool,
    pub deepfake_alert: bool,
}

#[derive(Default)]
struct DriftState {
    stats: DriftStats,
    scores: VecDeque<f64>,
    fake_probs: VecDeque<f64>,
}

fn push_bounded(window: &mut VecDeque<f64>, cap: usize, value: f64) {
    if window.len() == cap {
        window.pop_front();
    }
    window.push_back(value);
}

fn mean(window: &VecDeque<f64>) -> Option<f64> {
    if window.is_empty() {
        None
    } else {
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }
}

fn rate(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Tracks outcomes of finished verifications and raises drift alarms when
/// the recent average risk or deepfake probability climbs.
pub struct DriftMonitor {
    windows: DriftWindows,
    state: Mutex<DriftState>,
}

impl DriftMonitor {
    pub fn new(windows: DriftWindows) -> Self {
        Self {
            windows,
            state: Mutex::new(DriftState::default()),
        }
    }

    pub fn windows(&self) -> &DriftWindows {
        &self.windows
    }

    /// Folds one record into the counters and windows.
    pub fn observe(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut state = self.state.lock().map_err(|_| AuditError::LockPoisoned)?;
        let stats = &mut state.stats;
        stats.total += 1;
        match record.decision {
            Decision::Trusted => stats.trusted += 1,
            Decision::Review => stats.reviewed += 1,
            Decision::Block => stats.blocked += 1,
        }
        match record.status {
            PipelineState::FastFailExit => stats.fast_fail += 1,
            PipelineState::StageFailure => stats.stage_failures += 1,
            _ => {}
        }
        if record.risk_category == RiskCategory::High {
            stats.high_risk += 1;
        }
        if record
            .sanitized_signals
            .get(signals::DEEPFAKE_PASS)
            .is_some_and(|s| s.value == 0.0)
        {
            stats.deepfake_detections += 1;
        }
        stats.latency_sum_ms += record.latency_ms;

        let score_cap = self.windows.score_window;
        push_bounded(&mut state.scores, score_cap, record.score);
        if let Some(fake) = record
            .sanitized_signals
            .get(signals::VIDEO_FAKE_PROB)
            .filter(|s| s.confidence > 0.0)
        {
            let cap = self.windows.deepfake_window;
            push_bounded(&mut state.fake_probs, cap, fake.value);
        }

        let score_mean = mean(&state.scores);
        let score_alarm = state.scores.len() >= self.windows.score_min_samples
            && score_mean.is_some_and(|m| m > self.windows.score_alarm_mean);
        let deepfake_mean = mean(&state.fake_probs);
        let deepfake_alert = state.fake_probs.len() >= self.windows.deepfake_window
            && deepfake_mean.is_some_and(|m| m > self.windows.deepfake_alert_mean);

        if score_alarm {
            warn!(
                mean = score_mean.unwrap_or_default(),
                samples = state.scores.len(),
                "high average risk score, possible attack wave"
            );
        }
        if deepfake_alert {
            warn!(
                mean = deepfake_mean.unwrap_or_default(),
                window = self.windows.deepfake_window,
                "deepfake probability drift, possible model drift or coordinated attack"
            );
        }

        let stats = &mut state.stats;
        stats.score_mean = score_mean;
        stats.deepfake_mean = deepfake_mean;
        stats.score_alarm = score_alarm;
        stats.deepfake_alert = deepfake_alert;
        Ok(())
    }

    pub fn stats(&self) -> AuditResult<DriftStats> {
        let state = self.state.lock().map_err(|_| AuditError::LockPoisoned)?;
        let mut stats = state.stats.clone();
        stats.avg_latency_ms = if stats.total == 0 {
            0.0
        } else {
            stats.latency_sum_ms as f64 / stats.total as f64
        };
        stats.block_rate = rate(stats.blocked, stats.total);
        stats.deepfake_detection_rate = rate(stats.deepfake_detections, stats.total);
        stats.high_risk_rate = rate(stats.high_risk, stats.total);
        Ok(stats)
    }
}

impl Default for DriftMonitor {
    fn default() -> Self {
        Self::new(DriftWindows::default())
    }
}

impl AuditRecorder for DriftMonitor {
    fn record_verification(&self, record: &AuditRecord) -> VerifyResult<()> {
        self.observe(record)?;
        Ok(())
    }
}
