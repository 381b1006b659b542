//! In-memory audit trail with hash chaining for tamper evidence.

use sha2::{Digest, Sha256};
use std::sync::Mutex;
use tracing::debug;

use trustguard_core::{AuditId, AuditRecord, AuditRecorder, VerifyResult};

use crate::error::{AuditError, AuditResult};

/// `prev_hash` of the first record in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A stored record together with its link in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainedRecord {
    pub record: AuditRecord,
    pub prev_hash: String,
    pub hash: String,
}

fn link_hash(prev_hash: &str, record: &AuditRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(record.to_canonical_json().as_bytes());
    hex::encode(hasher.finalize())
}

/// Thread-safe append-only audit log.
///
/// Each entry hashes the previous entry's hash together with the canonical
/// JSON of its record, so editing or dropping any record breaks every link
/// after it.
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<ChainedRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Appends `record` and returns its chain hash.
    pub fn record(&self, record: &AuditRecord) -> AuditResult<String> {
        let mut entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        let prev_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let hash = link_hash(&prev_hash, record);
        debug!(audit_id = %record.audit_id, hash = %hash, "audit record chained");
        entries.push(ChainedRecord {
            record: record.clone(),
            prev_hash,
            hash: hash.clone(),
        });
        Ok(hash)
    }

    pub fn entries(&self) -> AuditResult<Vec<ChainedRecord>> {
        let entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        Ok(entries.clone())
    }

    /// The stored records in insertion order.
    pub fn records(&self) -> AuditResult<Vec<AuditRecord>> {
        let entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        Ok(entries.iter().map(|e| e.record.clone()).collect())
    }

    pub fn find(&self, audit_id: &AuditId) -> AuditResult<Option<AuditRecord>> {
        let entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        Ok(entries
            .iter()
            .find(|e| &e.record.audit_id == audit_id)
            .map(|e| e.record.clone()))
    }

    /// Hash of the latest entry, or the genesis hash for an empty log.
    pub fn head_hash(&self) -> AuditResult<String> {
        let entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        Ok(entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recomputes every link. False if any record, hash or back-pointer
    /// no longer matches.
    pub fn verify_chain(&self) -> AuditResult<bool> {
        let entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        let mut expected_prev = GENESIS_HASH.to_string();
        for entry in entries.iter() {
            if entry.prev_hash != expected_prev {
                return Ok(false);
            }
            if link_hash(&entry.prev_hash, &entry.record) != entry.hash {
                return Ok(false);
            }
            expected_prev = entry.hash.clone();
        }
        Ok(true)
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditRecorder for InMemoryAuditLog {
    fn record_verification(&self, record: &AuditRecord) -> VerifyResult<()> {
        self.record(record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustguard_core::{
        Context, DecisionRule, PendingAudit, PolicyDecision, SignalMap, SignalReading,
    };

    fn make_record(user: &str) -> AuditRecord {
        let mut signals = SignalMap::new();
        signals.insert("video_fake_prob".into(), SignalReading::certain(0.1));
        let pending = PendingAudit::start("REQ", &Context::for_user(user));
        let decision = PolicyDecision::forced_block(
            DecisionRule::FastFail,
            vec!["No video frames provided".into()],
        );
        pending.finalize(&decision, &signals)
    }

    #[test]
    fn test_new_log_is_empty() {
        let log = InMemoryAuditLog::new();
        assert!(log.is_empty());
        assert_eq!(log.head_hash().unwrap(), GENESIS_HASH);
        assert!(log.verify_chain().unwrap());
    }

    #[test]
    fn test_record_links_to_previous() {
        let log = InMemoryAuditLog::new();
        let h1 = log.record(&make_record("alice")).unwrap();
        let h2 = log.record(&make_record("bob")).unwrap();
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, h2);

        let entries = log.entries().unwrap();
        assert_eq!(entries[0].prev_hash, GENESIS_HASH);
        assert_eq!(entries[1].prev_hash, h1);
        assert_eq!(log.head_hash().unwrap(), h2);
        assert!(log.verify_chain().unwrap());
    }

    #[test]
    fn test_tampered_record_breaks_chain() {
        let log = InMemoryAuditLog::new();
        for user in ["alice", "bob", "carol"] {
            log.record(&make_record(user)).unwrap();
        }
        log.entries.lock().unwrap()[1].record.score = 0.0;
        assert!(!log.verify_chain().unwrap());
    }

    #[test]
    fn test_dropped_record_breaks_chain() {
        let log = InMemoryAuditLog::new();
        for user in ["alice", "bob", "carol"] {
            log.record(&make_record(user)).unwrap();
        }
        log.entries.lock().unwrap().remove(1);
        assert!(!log.verify_chain().unwrap());
    }

    #[test]
    fn test_find_by_audit_id() {
        let log = InMemoryAuditLog::new();
        let record = make_record("alice");
        log.record(&record).unwrap();
        log.record(&make_record("bob")).unwrap();
        let found = log.find(&record.audit_id).unwrap().unwrap();
        assert_eq!(found.user_id.as_deref(), Some("alice"));
        assert!(log
            .find(&AuditId("REQ-missing".into()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_as_recorder() {
        let log = InMemoryAuditLog::new();
        let recorder: &dyn AuditRecorder = &log;
        recorder.record_verification(&make_record("alice")).unwrap();
        assert_eq!(log.len(), 1);
    }
}
