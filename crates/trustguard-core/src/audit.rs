use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::capture::{Action, Context};
use crate::decision::{Decision, DecisionRule, PolicyDecision, RiskCategory};
use crate::signal::SignalMap;

pub const DEFAULT_AUDIT_PREFIX: &str = "REQ";

// ---------------------------------------------------------------------------
// AuditId: time-ordered request identifier
// ---------------------------------------------------------------------------

/// Request identifier of the form `PREFIX-YYYYMMDD-HHMMSS-xxxxxxxx`.
///
/// The embedded UTC timestamp makes ids sort chronologically as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuditId(pub String);

impl AuditId {
    pub fn generate(prefix: &str) -> Self {
        Self::generate_at(prefix, Utc::now())
    }

    pub fn generate_at(prefix: &str, at: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}",
            prefix,
            at.format("%Y%m%d-%H%M%S"),
            &suffix[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `YYYYMMDD` component, if the id is well formed.
    pub fn date_part(&self) -> Option<&str> {
        self.0
            .split('-')
            .nth(1)
            .filter(|p| p.len() == 8 && p.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Date-partitioned location for raw evidence of this request:
    /// `<root>/<YYYYMMDD>/<audit_id>.<ext>`. Ids that do not carry a date
    /// fall back to today's date. No directories are created.
    pub fn evidence_path(&self, root: &Path, kind: EvidenceKind) -> PathBuf {
        let date = self
            .date_part()
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().format("%Y%m%d").to_string());
        root.join(date)
            .join(format!("{}.{}", self.0, kind.extension()))
    }
}

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AuditId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    Video,
    Audio,
    Image,
    Report,
}

impl EvidenceKind {
    pub fn extension(&self) -> &'static str {
        match self {
            EvidenceKind::Video => "mp4",
            EvidenceKind::Audio => "wav",
            EvidenceKind::Image => "jpg",
            EvidenceKind::Report => "json",
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineState: orchestrator state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Initiated,
    Stage1,
    FastFailExit,
    Stage2,
    Fusion,
    Policy,
    Complete,
    StageFailure,
}

impl PipelineState {
    /// Legal transitions of the orchestrator state machine.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Initiated, Stage1)
                | (Stage1, FastFailExit)
                | (Stage1, Stage2)
                | (Stage1, StageFailure)
                | (Stage2, Fusion)
                | (Stage2, StageFailure)
                | (Fusion, Policy)
                | (Policy, Complete)
                | (FastFailExit, Complete)
                | (StageFailure, Complete)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Initiated => "INITIATED",
            PipelineState::Stage1 => "STAGE1",
            PipelineState::FastFailExit => "FAST_FAIL_EXIT",
            PipelineState::Stage2 => "STAGE2",
            PipelineState::Fusion => "FUSION",
            PipelineState::Policy => "POLICY",
            PipelineState::Complete => "COMPLETE",
            PipelineState::StageFailure => "STAGE_FAILURE",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// AuditRecord
// ---------------------------------------------------------------------------

/// Numeric part of a signal as kept in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SanitizedSignal {
    pub value: f64,
    pub confidence: f64,
}

/// Drops debug payloads and non-finite readings.
pub fn sanitize_signals(signals: &SignalMap) -> BTreeMap<String, SanitizedSignal> {
    signals
        .iter()
        .filter(|(_, r)| r.value.is_finite() && r.confidence.is_finite())
        .map(|(k, r)| {
            (
                k.clone(),
                SanitizedSignal {
                    value: r.value,
                    confidence: r.confidence,
                },
            )
        })
        .collect()
}

/// Immutable record of one finished verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: AuditId,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub action: Action,
    /// Terminal state: COMPLETE, FAST_FAIL_EXIT or STAGE_FAILURE.
    pub status: PipelineState,
    pub decision: Decision,
    pub action_code: u8,
    pub score: f64,
    pub risk_category: RiskCategory,
    pub rule: DecisionRule,
    pub reasons: Vec<String>,
    pub sanitized_signals: BTreeMap<String, SanitizedSignal>,
    pub trail: Vec<PipelineState>,
    pub latency_ms: u64,
}

impl AuditRecord {
    /// Canonical serialization used for hashing and the JSONL sink.
    pub fn to_canonical_json(&self) -> String {
        // Every field is a plain serde type; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// An audit record under construction. Created when a request arrives so the
/// id and start time are fixed before any stage runs; consumed exactly once
/// by [`finalize`](Self::finalize).
#[derive(Debug)]
pub struct PendingAudit {
    audit_id: AuditId,
    started_at: DateTime<Utc>,
    started: Instant,
    user_id: Option<String>,
    action: Action,
    trail: Vec<PipelineState>,
}

impl PendingAudit {
    pub fn start(prefix: &str, context: &Context) -> Self {
        let started_at = Utc::now();
        Self {
            audit_id: AuditId::generate_at(prefix, started_at),
            started_at,
            started: Instant::now(),
            user_id: context.user_id.clone(),
            action: context.action,
            trail: vec![PipelineState::Initiated],
        }
    }

    pub fn audit_id(&self) -> &AuditId {
        &self.audit_id
    }

    pub fn state(&self) -> PipelineState {
        self.trail
            .last()
            .copied()
            .unwrap_or(PipelineState::Initiated)
    }

    /// Appends `next` to the trail. Illegal transitions are still recorded;
    /// the return value reports whether the transition was legal.
    pub fn enter(&mut self, next: PipelineState) -> bool {
        let legal = self.state().can_transition_to(next);
        self.trail.push(next);
        legal
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn finalize(mut self, decision: &PolicyDecision, signals: &SignalMap) -> AuditRecord {
        let status = if self.trail.contains(&PipelineState::StageFailure) {
            PipelineState::StageFailure
        } else if self.trail.contains(&PipelineState::FastFailExit) {
            PipelineState::FastFailExit
        } else {
            PipelineState::Complete
        };
        if self.state() != PipelineState::Complete {
            self.trail.push(PipelineState::Complete);
        }
        let latency_ms = self.elapsed_ms();
        AuditRecord {
            audit_id: self.audit_id,
            timestamp: self.started_at,
            user_id: self.user_id,
            action: self.action,
            status,
            decision: decision.decision,
            action_code: decision.action_code,
            score: decision.effective_score,
            risk_category: decision.risk_category,
            rule: decision.rule,
            reasons: decision.reasons.clone(),
            sanitized_signals: sanitize_signals(signals),
            trail: self.trail,
            latency_ms,
        }
    }
}
