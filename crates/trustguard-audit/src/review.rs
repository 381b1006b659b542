//! Manual review queue for REVIEW decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

use trustguard_core::{
    Action, AuditId, AuditRecord, AuditRecorder, Decision, EvidenceKind, VerifyResult,
};

use crate::error::{AuditError, AuditResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

/// A case waiting for (or closed by) a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewTask {
    pub audit_id: AuditId,
    pub user_id: Option<String>,
    pub action: Action,
    pub score: f64,
    pub reasons: Vec<String>,
    /// Where the capture evidence for this request is expected to live.
    pub evidence_path: Option<PathBuf>,
    pub enqueued_at: DateTime<Utc>,
    pub status: ReviewStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

pub struct ReviewQueue {
    evidence_root: Option<PathBuf>,
    tasks: Mutex<Vec<ReviewTask>>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self {
            evidence_root: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Attaches date-partitioned video evidence paths under `root` to new tasks.
    pub fn with_evidence_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.evidence_root = Some(root.into());
        self
    }

    /// Queues `record` if its decision is REVIEW. Returns whether it was queued.
    pub fn enqueue(&self, record: &AuditRecord) -> AuditResult<bool> {
        if record.decision != Decision::Review {
            return Ok(false);
        }
        let task = ReviewTask {
            audit_id: record.audit_id.clone(),
            user_id: record.user_id.clone(),
            action: record.action,
            score: record.score,
            reasons: record.reasons.clone(),
            evidence_path: self
                .evidence_root
                .as_ref()
                .map(|root| record.audit_id.evidence_path(root, EvidenceKind::Video)),
            enqueued_at: Utc::now(),
            status: ReviewStatus::Pending,
            resolved_at: None,
        };
        let mut tasks = self.tasks.lock().map_err(|_| AuditError::LockPoisoned)?;
        tasks.push(task);
        info!(audit_id = %record.audit_id, "case pushed to human review");
        Ok(true)
    }

    /// Open tasks, oldest first.
    pub fn pending(&self) -> AuditResult<Vec<ReviewTask>> {
        let tasks = self.tasks.lock().map_err(|_| AuditError::LockPoisoned)?;
        Ok(tasks
            .iter()
            .filter(|t| t.status == ReviewStatus::Pending)
            .cloned()
            .collect())
    }

    /// Closes the pending task for `audit_id` with the reviewer's verdict.
    pub fn resolve(&self, audit_id: &AuditId, approved: bool) -> AuditResult<ReviewTask> {
        let mut tasks = self.tasks.lock().map_err(|_| AuditError::LockPoisoned)?;
        let task = tasks
            .iter_mut()
            .find(|t| &t.audit_id == audit_id && t.status == ReviewStatus::Pending)
            .ok_or_else(|| AuditError::TaskNotFound(audit_id.to_string()))?;
        task.status = if approved {
            ReviewStatus::Approved
        } else {
            ReviewStatus::Rejected
        };
        task.resolved_at = Some(Utc::now());
        info!(audit_id = %audit_id, status = ?task.status, "review resolved");
        Ok(task.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReviewQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditRecorder for ReviewQueue {
    fn record_verification(&self, record: &AuditRecord) -> VerifyResult<()> {
        self.enqueue(record)?;
        Ok(())
    }
}
