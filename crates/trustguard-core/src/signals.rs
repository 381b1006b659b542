//! Canonical signal names shared by providers, fusion and policy.

// Stage 1
pub const APP_INTEGRITY: &str = "app_integrity";
pub const SHARPNESS_VAR: &str = "sharpness_var";
pub const DOC_FORMAT_VALID: &str = "doc_format_valid";
pub const STAGE1_LATENCY: &str = "stage1_latency";

// Stage 2: video
pub const VIDEO_FAKE_PROB: &str = "video_fake_prob";
pub const DEEPFAKE_FRAMES_PROCESSED: &str = "deepfake_frames_processed";
pub const DEEPFAKE_PASS: &str = "deepfake_pass";
pub const RPPG_CONF: &str = "rppg_conf";
pub const FLOW_VARIANCE: &str = "flow_variance";
pub const JITTER_SCORE: &str = "jitter_score";

// Stage 2: audio
pub const AUDIO_SPOOF_SCORE: &str = "audio_spoof_score";
pub const VOICE_MISMATCH_SCORE: &str = "voice_mismatch_score";
pub const LIP_SYNC_SCORE: &str = "lip_sync_score";
pub const AUDIO_MISSING: &str = "audio_missing";
