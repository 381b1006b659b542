use thiserror::Error;

/// Error type for the TrustGuard root binary, aggregating errors from the
/// library crates.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("verification error: {0}")]
    Verify(#[from] trustguard_core::VerifyError),

    #[error("audit error: {0}")]
    Audit(#[from] trustguard_audit::AuditError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

impl From<toml::ser::Error> for RootError {
    fn from(e: toml::ser::Error) -> Self {
        RootError::Config(format!("TOML serialize error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;

#[cfg(test)]
mod tests {
    use super::*;
    use trustguard_core::VerifyError;

    #[test]
    fn test_root_error_display() {
        let err = RootError::Internal("something broke".into());
        assert_eq!(err.to_string(), "internal error: something broke");
    }

    #[test]
    fn test_from_verify_error() {
        let err: RootError = VerifyError::Config("bad weights".into()).into();
        assert_eq!(
            err.to_string(),
            "verification error: configuration error: bad weights"
        );
    }

    #[test]
    fn test_from_toml_error() {
        let parse: Result<toml::Table, _> = toml::from_str("= nope");
        let err: RootError = parse.unwrap_err().into();
        assert!(matches!(err, RootError::Config(ref m) if m.starts_with("TOML parse error")));
    }

    #[test]
    fn test_from_json_error() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: RootError = parse.unwrap_err().into();
        assert!(matches!(err, RootError::Serialization(_)));
    }
}
