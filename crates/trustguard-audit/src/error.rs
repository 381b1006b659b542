use thiserror::Error;

use trustguard_core::VerifyError;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed audit log line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("review task not found: {0}")]
    TaskNotFound(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl From<AuditError> for VerifyError {
    fn from(err: AuditError) -> Self {
        VerifyError::Audit(err.to_string())
    }
}
