use thiserror::Error;

/// Error taxonomy for a verification request.
///
/// Only `Input` and `Config` ever reach a caller of the library as `Err`.
/// `Provider` is recovered inside Stage 2, `StageTimeout` / `StageFailure`
/// are recovered by the orchestrator into a BLOCK decision, and
/// `FusionInsufficientData` is expressed as a maximal fused score.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerifyError {
    #[error("invalid capture: {0}")]
    Input(String),

    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("stage {stage} timed out after {budget_ms}ms")]
    StageTimeout { stage: String, budget_ms: u64 },

    #[error("stage {stage} failed: {message}")]
    StageFailure { stage: String, message: String },

    #[error("no usable signals for fusion")]
    FusionInsufficientData,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("audit error: {0}")]
    Audit(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VerifyError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        VerifyError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for the failure classes the orchestrator converts into a forced BLOCK.
    pub fn is_stage_fatal(&self) -> bool {
        matches!(
            self,
            VerifyError::StageTimeout { .. }
                | VerifyError::StageFailure { .. }
                | VerifyError::Cancelled(_)
                | VerifyError::Internal(_)
        )
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;
