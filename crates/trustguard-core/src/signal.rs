use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// SignalReading: one measured feature with its confidence
// ---------------------------------------------------------------------------

/// A single measured feature.
///
/// `confidence == 0` marks the signal as unavailable: the provider failed or
/// did not have enough evidence. Fusion and hard overrides ignore such readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    pub value: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl SignalReading {
    /// A reading with `confidence` clamped to [0, 1].
    pub fn new(value: f64, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            value,
            confidence,
            debug: None,
        }
    }

    /// A fully confident reading.
    pub fn certain(value: f64) -> Self {
        Self::new(value, 1.0)
    }

    /// Placeholder for a signal that could not be measured.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            value: 0.0,
            confidence: 0.0,
            debug: Some(serde_json::json!({ "error": reason.into() })),
        }
    }

    pub fn with_debug(mut self, debug: serde_json::Value) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn is_usable(&self) -> bool {
        self.confidence > 0.0 && self.value.is_finite()
    }
}

/// Signals keyed by name. Ordered so that iteration (and everything derived
/// from it) is independent of insertion order.
pub type SignalMap = BTreeMap<String, SignalReading>;

/// Value of `name` if present and usable.
pub fn usable_value(signals: &SignalMap, name: &str) -> Option<f64> {
    signals
        .get(name)
        .filter(|r| r.is_usable())
        .map(|r| r.value)
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub passed: bool,
    pub fast_fail: bool,
    pub signals: SignalMap,
    pub reasons: Vec<String>,
    pub latency_ms: u64,
}

impl StageResult {
    /// Number of readings with non-zero confidence.
    pub fn usable_count(&self) -> usize {
        self.signals.values().filter(|r| r.is_usable()).count()
    }
}

// ---------------------------------------------------------------------------
// FusionBreakdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionBreakdown {
    pub final_score: f64,
    /// weight (after renormalization) × risk, per participating input.
    pub contributions: BTreeMap<String, f64>,
    /// Normalized risk in [0, 1], per participating input.
    pub risks: BTreeMap<String, f64>,
    pub pass: bool,
    pub insufficient_evidence: bool,
}

impl FusionBreakdown {
    /// The worst-case breakdown used when nothing could be fused.
    pub fn insufficient() -> Self {
        Self {
            final_score: 1.0,
            contributions: BTreeMap::new(),
            risks: BTreeMap::new(),
            pass: false,
            insufficient_evidence: true,
        }
    }
}
