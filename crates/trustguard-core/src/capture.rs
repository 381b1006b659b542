use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{VerifyError, VerifyResult};

/// Upper bound on frames accepted in one capture (30 s at 30 fps).
pub const MAX_FRAMES: usize = 900;

// ---------------------------------------------------------------------------
// Frame: one decoded image (video frame or document scan)
// ---------------------------------------------------------------------------

/// A decoded 8-bit image, row-major, `channels` interleaved bytes per pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> VerifyResult<Self> {
        let frame = Self {
            width,
            height,
            channels,
            pixels,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Single-channel frame.
    pub fn gray(width: u32, height: u32, pixels: Vec<u8>) -> VerifyResult<Self> {
        Self::new(width, height, 1, pixels)
    }

    pub fn validate(&self) -> VerifyResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VerifyError::Input(format!(
                "frame has zero dimension {}x{}",
                self.width, self.height
            )));
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(VerifyError::Input(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(self.channels as usize))
            .ok_or_else(|| {
                VerifyError::Input(format!(
                    "frame dimensions overflow {}x{}x{}",
                    self.width, self.height, self.channels
                ))
            })?;
        if self.pixels.len() != expected {
            return Err(VerifyError::Input(format!(
                "pixel buffer has {} bytes, expected {} for {}x{}x{}",
                self.pixels.len(),
                expected,
                self.width,
                self.height,
                self.channels
            )));
        }
        Ok(())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Luma of the pixel at (x, y). Colour frames use the mean of the first
    /// three channels.
    pub fn luma(&self, x: u32, y: u32) -> f64 {
        let c = self.channels as usize;
        let idx = (y as usize * self.width as usize + x as usize) * c;
        if c == 1 {
            self.pixels[idx] as f64
        } else {
            let sum: u32 = self.pixels[idx..idx + 3].iter().map(|&v| v as u32).sum();
            sum as f64 / 3.0
        }
    }

    /// Mean luma inside `region`, or over the whole frame if `region` is None.
    pub fn mean_luma(&self, region: Option<&FaceBox>) -> f64 {
        let (x0, y0, w, h) = match region {
            Some(b) => (b.x, b.y, b.w, b.h),
            None => (0, 0, self.width, self.height),
        };
        if w == 0 || h == 0 {
            return 0.0;
        }
        let mut sum = 0.0;
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                sum += self.luma(x, y);
            }
        }
        sum / (w as f64 * h as f64)
    }
}

// ---------------------------------------------------------------------------
// FaceBox: detected face region aligned to a frame
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_degenerate(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn fits(&self, frame: &Frame) -> bool {
        self.x as u64 + self.w as u64 <= frame.width as u64
            && self.y as u64 + self.h as u64 <= frame.height as u64
    }
}

// ---------------------------------------------------------------------------
// AudioTrack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioTrack {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CaptureMetadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Capture: the normalized input unit of one verification
// ---------------------------------------------------------------------------

/// Normalized input for one verification request.
///
/// Only constructible through [`CaptureBuilder`] (or deserialization, which
/// goes through the same validation), so every `Capture` in the pipeline is
/// structurally sound. An empty frame list is allowed here; Stage 1 rejects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CaptureParts")]
pub struct Capture {
    frames: Vec<Frame>,
    face_boxes: Vec<Option<FaceBox>>,
    audio: Option<AudioTrack>,
    document: Option<Frame>,
    metadata: CaptureMetadata,
}

impl Capture {
    pub fn builder() -> CaptureBuilder {
        CaptureBuilder::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Face box for frame `idx`, if one was detected.
    pub fn face_box(&self, idx: usize) -> Option<&FaceBox> {
        self.face_boxes.get(idx).and_then(|b| b.as_ref())
    }

    pub fn face_boxes(&self) -> &[Option<FaceBox>] {
        &self.face_boxes
    }

    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref().filter(|a| !a.is_empty())
    }

    pub fn document(&self) -> Option<&Frame> {
        self.document.as_ref()
    }

    pub fn metadata(&self) -> &CaptureMetadata {
        &self.metadata
    }

    /// The frame Stage 1 treats as representative (the middle one).
    pub fn representative_frame(&self) -> Option<(usize, &Frame)> {
        if self.frames.is_empty() {
            return None;
        }
        let idx = self.frames.len() / 2;
        Some((idx, &self.frames[idx]))
    }
}

/// Unvalidated capture fields, used as the serde representation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureParts {
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub face_boxes: Vec<Option<FaceBox>>,
    #[serde(default)]
    pub audio: Option<AudioTrack>,
    #[serde(default)]
    pub document: Option<Frame>,
    #[serde(default)]
    pub metadata: CaptureMetadata,
}

impl TryFrom<CaptureParts> for Capture {
    type Error = VerifyError;

    fn try_from(parts: CaptureParts) -> VerifyResult<Self> {
        if parts.frames.len() > MAX_FRAMES {
            return Err(VerifyError::Input(format!(
                "capture has {} frames, limit is {}",
                parts.frames.len(),
                MAX_FRAMES
            )));
        }
        for (idx, frame) in parts.frames.iter().enumerate() {
            frame
                .validate()
                .map_err(|e| VerifyError::Input(format!("frame {}: {}", idx, e)))?;
        }
        if parts.face_boxes.len() > parts.frames.len() {
            return Err(VerifyError::Input(format!(
                "{} face boxes for {} frames",
                parts.face_boxes.len(),
                parts.frames.len()
            )));
        }
        for (idx, face) in parts.face_boxes.iter().enumerate() {
            if let Some(b) = face {
                if !b.fits(&parts.frames[idx]) {
                    return Err(VerifyError::Input(format!(
                        "face box {} lies outside its frame",
                        idx
                    )));
                }
            }
        }
        if let Some(audio) = &parts.audio {
            if audio.sample_rate == 0 && !audio.samples.is_empty() {
                return Err(VerifyError::Input(
                    "audio track has samples but zero sample rate".into(),
                ));
            }
        }
        if let Some(doc) = &parts.document {
            doc.validate()
                .map_err(|e| VerifyError::Input(format!("document image: {}", e)))?;
        }
        Ok(Self {
            frames: parts.frames,
            face_boxes: parts.face_boxes,
            audio: parts.audio,
            document: parts.document,
            metadata: parts.metadata,
        })
    }
}

#[derive(Debug, Default)]
pub struct CaptureBuilder {
    parts: CaptureParts,
}

impl CaptureBuilder {
    pub fn frame(mut self, frame: Frame, face: Option<FaceBox>) -> Self {
        self.parts.frames.push(frame);
        self.parts.face_boxes.push(face);
        self
    }

    pub fn frames(mut self, frames: impl IntoIterator<Item = (Frame, Option<FaceBox>)>) -> Self {
        for (frame, face) in frames {
            self = self.frame(frame, face);
        }
        self
    }

    pub fn audio(mut self, samples: Vec<f32>, sample_rate: u32) -> Self {
        self.parts.audio = Some(AudioTrack {
            samples,
            sample_rate,
        });
        self
    }

    pub fn document(mut self, image: Frame) -> Self {
        self.parts.document = Some(image);
        self
    }

    pub fn package_name(mut self, name: impl Into<String>) -> Self {
        self.parts.metadata.package_name = Some(name.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.parts.metadata.user_id = Some(user_id.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.metadata.extra.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VerifyResult<Capture> {
        Capture::try_from(self.parts)
    }
}

// ---------------------------------------------------------------------------
// Action / Context: request context supplied by the caller
// ---------------------------------------------------------------------------

/// The business action being protected; riskier actions tighten thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    Login,
    ProfileUpdate,
    HighValueTx,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::ProfileUpdate => "profile_update",
            Action::HighValueTx => "high_value_tx",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = VerifyError;

    fn from_str(s: &str) -> VerifyResult<Self> {
        match s {
            "login" => Ok(Action::Login),
            "profile_update" => Ok(Action::ProfileUpdate),
            "high_value_tx" => Ok(Action::HighValueTx),
            other => Err(VerifyError::Input(format!("unknown action '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub claimed_app_id: Option<String>,
}

impl Context {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_claimed_app(mut self, app_id: impl Into<String>) -> Self {
        self.claimed_app_id = Some(app_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(w: u32, h: u32, v: u8) -> Frame {
        Frame::gray(w, h, vec![v; (w * h) as usize]).unwrap()
    }

    #[test]
    fn test_frame_rejects_short_buffer() {
        let err = Frame::gray(4, 4, vec![0; 15]).unwrap_err();
        assert!(matches!(err, VerifyError::Input(_)));
    }

    #[test]
    fn test_oversized_frame_json_is_input_error() {
        let json = r#"{"frames":[{"width":4294967295,"height":4294967295,
                       "channels":3,"pixels":[]}]}"#;
        let err = serde_json::from_str::<Capture>(json).unwrap_err();
        assert!(err.to_string().contains("frame dimensions overflow"));

        let err = Frame::new(u32::MAX, u32::MAX, 4, Vec::new()).unwrap_err();
        assert!(matches!(err, VerifyError::Input(_)));
    }

    #[test]
    fn test_frame_luma_colour_average() {
        let frame = Frame::new(1, 1, 3, vec![30, 60, 90]).unwrap();
        assert!((frame.luma(0, 0) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_luma_region() {
        let mut pixels = vec![0u8; 16];
        pixels[5] = 100;
        pixels[6] = 100;
        pixels[9] = 100;
        pixels[10] = 100;
        let frame = Frame::gray(4, 4, pixels).unwrap();
        let inner = FaceBox::new(1, 1, 2, 2);
        assert!((frame.mean_luma(Some(&inner)) - 100.0).abs() < 1e-9);
        assert!((frame.mean_luma(None) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_capture_is_structurally_valid() {
        let capture = Capture::builder().build().unwrap();
        assert!(capture.frames().is_empty());
        assert!(capture.representative_frame().is_none());
    }

    #[test]
    fn test_face_box_outside_frame_rejected() {
        let err = Capture::builder()
            .frame(gray(8, 8, 10), Some(FaceBox::new(4, 4, 8, 8)))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn test_audio_without_rate_rejected() {
        let err = Capture::builder()
            .frame(gray(8, 8, 10), None)
            .audio(vec![0.1, 0.2], 0)
            .build()
            .unwrap_err();
        assert!(matches!(err, VerifyError::Input(_)));
    }

    #[test]
    fn test_deserialize_runs_validation() {
        let json = r#"{"frames":[{"width":2,"height":2,"channels":1,"pixels":[1,2,3]}]}"#;
        let result: Result<Capture, _> = serde_json::from_str(json);
        assert!(result.is_err());

        let json = r#"{"frames":[{"width":2,"height":2,"channels":1,"pixels":[1,2,3,4]}],
                       "metadata":{"user_id":"alice"}}"#;
        let capture: Capture = serde_json::from_str(json).unwrap();
        assert_eq!(capture.frames().len(), 1);
        assert_eq!(capture.metadata().user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_representative_frame_is_middle() {
        let capture = Capture::builder()
            .frame(gray(2, 2, 1), None)
            .frame(gray(2, 2, 2), None)
            .frame(gray(2, 2, 3), None)
            .build()
            .unwrap();
        let (idx, frame) = capture.representative_frame().unwrap();
        assert_eq!(idx, 1);
        assert_eq!(frame.pixels[0], 2);
    }

    #[test]
    fn test_empty_audio_reported_as_absent() {
        let capture = Capture::builder()
            .frame(gray(2, 2, 1), None)
            .audio(Vec::new(), 16_000)
            .build()
            .unwrap();
        assert!(capture.audio().is_none());
    }

    #[test]
    fn test_action_parse_and_display() {
        assert_eq!("high_value_tx".parse::<Action>().unwrap(), Action::HighValueTx);
        assert_eq!(Action::ProfileUpdate.to_string(), "profile_update");
        assert!("transfer".parse::<Action>().is_err());
        assert_eq!(Action::default(), Action::Login);
    }

    #[test]
    fn test_context_serde_defaults() {
        let ctx: Context = serde_json::from_str(r#"{"user_id":"bob"}"#).unwrap();
        assert_eq!(ctx.action, Action::Login);
        assert!(ctx.ip.is_none());
    }
}
