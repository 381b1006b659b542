use std::time::Duration;

use crate::audit::AuditRecord;
use crate::cancel::CancellationToken;
use crate::capture::{Capture, FaceBox, Frame};
use crate::error::VerifyResult;
use crate::signal::SignalReading;

// ---------------------------------------------------------------------------
// SignalProvider: one named signal extracted from a capture
//
// Providers run on blocking worker threads. They must not mutate the capture
// and should poll the cancellation token between expensive steps; a provider
// that ignores it is abandoned when its budget runs out.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Backed by a trained model.
    Model,
    /// Cheap deterministic fallback.
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct ProviderParams {
    pub budget: Duration,
    pub cancel: CancellationToken,
}

impl ProviderParams {
    pub fn new(budget: Duration, cancel: CancellationToken) -> Self {
        Self { budget, cancel }
    }
}

pub trait SignalProvider: Send + Sync {
    /// Signal name under which the reading is stored.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn extract(&self, capture: &Capture, params: &ProviderParams) -> VerifyResult<SignalReading>;
}

// ---------------------------------------------------------------------------
// FrameClassifier: per-frame deepfake probability
// ---------------------------------------------------------------------------

pub trait FrameClassifier: Send + Sync {
    /// Probability in [0, 1] that the face crop is synthetic.
    fn classify(&self, frame: &Frame, face: &FaceBox) -> VerifyResult<f64>;
}

impl<F> FrameClassifier for F
where
    F: Fn(&Frame, &FaceBox) -> VerifyResult<f64> + Send + Sync,
{
    fn classify(&self, frame: &Frame, face: &FaceBox) -> VerifyResult<f64> {
        self(frame, face)
    }
}

// ---------------------------------------------------------------------------
// AuditRecorder: sink for finalized verification records
// ---------------------------------------------------------------------------

pub trait AuditRecorder: Send + Sync {
    fn record_verification(&self, record: &AuditRecord) -> VerifyResult<()>;
}
