//! Append-only JSON-lines audit file.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

use trustguard_core::{AuditRecord, AuditRecorder, VerifyResult};

use crate::error::{AuditError, AuditResult};

/// One canonical JSON record per line. Writers are serialized through an
/// internal lock so lines never interleave.
pub struct JsonlAuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    /// Opens (or prepares) the log at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().map_err(|_| AuditError::LockPoisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        info!(audit_id = %record.audit_id, "audit record written");
        Ok(())
    }

    /// Every record in file order. A missing file is an empty log.
    pub fn read_all(&self) -> AuditResult<Vec<AuditRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| AuditError::Malformed {
                line: idx + 1,
                message: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// The newest `limit` records, oldest first.
    pub fn read_recent(&self, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        let mut records = self.read_all()?;
        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }
}

impl AuditRecorder for JsonlAuditLog {
    fn record_verification(&self, record: &AuditRecord) -> VerifyResult<()> {
        self.append(record).map_err(|e| {
            error!(audit_id = %record.audit_id, error = %e, "failed to write audit log");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustguard_core::{Context, DecisionRule, PendingAudit, PolicyDecision, SignalMap};

    fn temp_log(name: &str) -> JsonlAuditLog {
        let dir = std::env::temp_dir().join(format!("trustguard-audit-{}", std::process::id()));
        let path = dir.join(format!("{}.jsonl", name));
        let _ = fs::remove_file(&path);
        JsonlAuditLog::open(path).unwrap()
    }

    fn make_record(user: &str) -> AuditRecord {
        let pending = PendingAudit::start("REQ", &Context::for_user(user));
        let decision = PolicyDecision::forced_block(DecisionRule::StageFailure, vec!["x".into()]);
        pending.finalize(&decision, &SignalMap::new())
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let log = temp_log("missing");
        assert!(log.read_all().unwrap().is_empty());
        assert!(log.read_recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_append_and_read_back() {
        let log = temp_log("roundtrip");
        let record = make_record("alice");
        log.append(&record).unwrap();
        let all = log.read_all().unwrap();
        assert_eq!(all, vec![record]);
    }

    #[test]
    fn test_read_recent_keeps_newest() {
        let log = temp_log("recent");
        for user in ["a", "b", "c", "d"] {
            log.append(&make_record(user)).unwrap();
        }
        let recent = log.read_recent(2).unwrap();
        let users: Vec<_> = recent.iter().filter_map(|r| r.user_id.clone()).collect();
        assert_eq!(users, vec!["c", "d"]);
        assert_eq!(log.read_recent(10).unwrap().len(), 4);
    }

    #[test]
    fn test_malformed_line_reported() {
        let log = temp_log("malformed");
        log.append(&make_record("a")).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "not json").unwrap();
        match log.read_all() {
            Err(AuditError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_one_line_per_record() {
        let log = temp_log("lines");
        log.record_verification(&make_record("a")).unwrap();
        log.record_verification(&make_record("b")).unwrap();
        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
