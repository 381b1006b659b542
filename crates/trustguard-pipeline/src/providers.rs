//! Heuristic signal providers.
//!
//! Cheap deterministic stand-ins for the model-backed extractors. They are
//! good enough to gate obviously unusable captures and to exercise the
//! pipeline end to end; deployments plug real models in through
//! [`SignalProvider`] or [`FnProvider`].

use serde_json::json;

use trustguard_core::signals;
use trustguard_core::{
    Capture, FaceBox, Frame, ProviderKind, ProviderParams, SignalProvider, SignalReading,
    VerifyError, VerifyResult,
};

/// Pixel count at which texture measures are considered fully reliable (64x64).
const RELIABLE_PIXELS: f64 = 4096.0;

/// ID-1 card (ISO/IEC 7810) width to height ratio.
pub const ID1_ASPECT: f64 = 1.586;
pub const ID1_ASPECT_TOLERANCE: f64 = 0.25;

// ---------------------------------------------------------------------------
// Laplacian sharpness
// ---------------------------------------------------------------------------

/// Variance of the 4-neighbour Laplacian over the interior of `frame`.
/// None for frames smaller than 3x3.
pub fn laplacian_variance(frame: &Frame) -> Option<f64> {
    if frame.width < 3 || frame.height < 3 {
        return None;
    }
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut n = 0usize;
    for y in 1..frame.height - 1 {
        for x in 1..frame.width - 1 {
            let lap = frame.luma(x, y - 1)
                + frame.luma(x, y + 1)
                + frame.luma(x - 1, y)
                + frame.luma(x + 1, y)
                - 4.0 * frame.luma(x, y);
            sum += lap;
            sum_sq += lap * lap;
            n += 1;
        }
    }
    let mean = sum / n as f64;
    Some((sum_sq / n as f64 - mean * mean).max(0.0))
}

/// Focus measure of the representative (middle) frame. Higher is sharper.
#[derive(Debug, Default, Clone, Copy)]
pub struct LaplacianSharpness;

impl SignalProvider for LaplacianSharpness {
    fn name(&self) -> &str {
        signals::SHARPNESS_VAR
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Heuristic
    }

    fn extract(&self, capture: &Capture, params: &ProviderParams) -> VerifyResult<SignalReading> {
        let (idx, frame) = capture
            .representative_frame()
            .ok_or_else(|| VerifyError::provider(self.name(), "no frames"))?;
        params.cancel.checkpoint(self.name())?;
        let variance = laplacian_variance(frame)
            .ok_or_else(|| VerifyError::provider(self.name(), "frame smaller than 3x3"))?;
        let confidence = (frame.pixel_count() as f64 / RELIABLE_PIXELS).min(1.0);
        Ok(SignalReading::new(variance, confidence).with_debug(json!({
            "frame_index": idx,
            "width": frame.width,
            "height": frame.height,
        })))
    }
}

// ---------------------------------------------------------------------------
// Document format
// ---------------------------------------------------------------------------

/// Resolution and ID-1 aspect-ratio pre-check of the document image.
/// Records 1.0 when the image looks like a usable card scan, 0.0 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct DocumentFormatCheck {
    pub min_width: u32,
    pub min_height: u32,
}

impl DocumentFormatCheck {
    pub fn new(min_width: u32, min_height: u32) -> Self {
        Self {
            min_width,
            min_height,
        }
    }
}

impl SignalProvider for DocumentFormatCheck {
    fn name(&self) -> &str {
        signals::DOC_FORMAT_VALID
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Heuristic
    }

    fn extract(&self, capture: &Capture, _params: &ProviderParams) -> VerifyResult<SignalReading> {
        let doc = capture
            .document()
            .ok_or_else(|| VerifyError::provider(self.name(), "no document image"))?;
        let long = doc.width.max(doc.height);
        let short = doc.width.min(doc.height);
        let aspect = long as f64 / short as f64;
        let resolution_ok = long >= self.min_width && short >= self.min_height;
        let aspect_ok = (aspect - ID1_ASPECT).abs() <= ID1_ASPECT_TOLERANCE;
        let valid = resolution_ok && aspect_ok;
        Ok(
            SignalReading::certain(if valid { 1.0 } else { 0.0 }).with_debug(json!({
                "width": doc.width,
                "height": doc.height,
                "aspect": aspect,
                "resolution_ok": resolution_ok,
                "aspect_ok": aspect_ok,
            })),
        )
    }
}

// ---------------------------------------------------------------------------
// Temporal flow consistency
// ---------------------------------------------------------------------------

/// Mean absolute luma change inside `face` between two same-sized frames,
/// scaled to [0, 1].
fn region_difference(prev: &Frame, curr: &Frame, face: &FaceBox) -> f64 {
    let mut total = 0.0;
    for y in face.y..face.y + face.h {
        for x in face.x..face.x + face.w {
            total += (curr.luma(x, y) - prev.luma(x, y)).abs();
        }
    }
    total / (face.w as f64 * face.h as f64) / 255.0
}

/// Dispersion of inter-frame motion inside the face region.
///
/// A real head moves smoothly, so consecutive difference magnitudes are
/// similar; frame-by-frame synthesis tends to produce bursts. The value is
/// the coefficient of variation of the per-pair mean differences, clamped to
/// [0, 1]. Higher is more suspicious.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlowConsistency;

/// Pairs needed for full confidence.
const FLOW_RELIABLE_PAIRS: f64 = 10.0;

impl SignalProvider for FlowConsistency {
    fn name(&self) -> &str {
        signals::FLOW_VARIANCE
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Heuristic
    }

    fn extract(&self, capture: &Capture, params: &ProviderParams) -> VerifyResult<SignalReading> {
        let frames = capture.frames();
        let mut diffs = Vec::new();
        for i in 1..frames.len() {
            params.cancel.checkpoint(self.name())?;
            let (prev, curr) = (&frames[i - 1], &frames[i]);
            let face = match capture.face_box(i) {
                Some(b) if !b.is_degenerate() => b,
                _ => continue,
            };
            if prev.width != curr.width || prev.height != curr.height {
                continue;
            }
            diffs.push(region_difference(prev, curr, face));
        }
        if diffs.len() < 2 {
            return Err(VerifyError::provider(
                self.name(),
                format!("need at least 2 face frame pairs, found {}", diffs.len()),
            ));
        }
        let n = diffs.len() as f64;
        let mean = diffs.iter().sum::<f64>() / n;
        let var = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        let value = if mean < 1e-9 {
            0.0
        } else {
            (var.sqrt() / mean).min(1.0)
        };
        let confidence = (n / FLOW_RELIABLE_PAIRS).min(1.0);
        Ok(SignalReading::new(value, confidence).with_debug(json!({
            "pairs": diffs.len(),
            "mean_difference": mean,
        })))
    }
}

// ---------------------------------------------------------------------------
// Audio presence
// ---------------------------------------------------------------------------

/// Records 1.0 when the capture has no usable audio track.
#[derive(Debug, Clone, Copy)]
pub struct AudioPresence {
    pub min_duration_secs: f64,
}

impl Default for AudioPresence {
    fn default() -> Self {
        Self {
            min_duration_secs: 0.5,
        }
    }
}

impl SignalProvider for AudioPresence {
    fn name(&self) -> &str {
        signals::AUDIO_MISSING
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Heuristic
    }

    fn extract(&self, capture: &Capture, _params: &ProviderParams) -> VerifyResult<SignalReading> {
        let duration = capture.audio().map(|a| a.duration_secs()).unwrap_or(0.0);
        let missing = duration < self.min_duration_secs;
        Ok(
            SignalReading::certain(if missing { 1.0 } else { 0.0 })
                .with_debug(json!({ "duration_secs": duration })),
        )
    }
}

// ---------------------------------------------------------------------------
// FnProvider: closure adapter
// ---------------------------------------------------------------------------

/// Wraps a closure as a [`SignalProvider`], for embedding external extractors.
pub struct FnProvider<F> {
    name: String,
    kind: ProviderKind,
    extract: F,
}

impl<F> FnProvider<F>
where
    F: Fn(&Capture, &ProviderParams) -> VerifyResult<SignalReading> + Send + Sync,
{
    pub fn new(name: impl Into<String>, kind: ProviderKind, extract: F) -> Self {
        Self {
            name: name.into(),
            kind,
            extract,
        }
    }
}

impl<F> SignalProvider for FnProvider<F>
where
    F: Fn(&Capture, &ProviderParams) -> VerifyResult<SignalReading> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn extract(&self, capture: &Capture, params: &ProviderParams) -> VerifyResult<SignalReading> {
        (self.extract)(capture, params)
    }
}
