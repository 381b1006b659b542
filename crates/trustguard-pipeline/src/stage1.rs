use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use trustguard_core::signals;
use trustguard_core::{
    Capture, Context, ProviderParams, SignalProvider, SignalReading, StageResult, VerifyResult,
};
use trustguard_policy::AccessLists;

use crate::config::Stage1Config;
use crate::providers::{DocumentFormatCheck, LaplacianSharpness};

pub const STAGE1: &str = "stage1";

// ---------------------------------------------------------------------------
// Stage 1: fast checks
//
// Ordered, each may fast-fail and stop the stage:
//   input integrity -> access lists -> app integrity -> sharpness
// followed by the non-fatal document pre-check.
// ---------------------------------------------------------------------------

pub struct Stage1 {
    config: Stage1Config,
    lists: Arc<AccessLists>,
    sharpness: Arc<dyn SignalProvider>,
    document: Arc<dyn SignalProvider>,
}

impl Stage1 {
    /// Stage 1 with the bundled heuristic sharpness and document checks.
    pub fn new(config: Stage1Config, lists: Arc<AccessLists>) -> Self {
        let document = Arc::new(DocumentFormatCheck::new(
            config.doc_min_width,
            config.doc_min_height,
        ));
        Self {
            config,
            lists,
            sharpness: Arc::new(LaplacianSharpness),
            document,
        }
    }

    pub fn with_sharpness(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.sharpness = provider;
        self
    }

    pub fn with_document_check(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.document = provider;
        self
    }

    fn fail(mut result: StageResult, reason: String, started: Instant) -> StageResult {
        info!(reason = %reason, "stage 1 fast fail");
        result.fast_fail = true;
        result.passed = false;
        result.reasons.push(reason);
        result.latency_ms = started.elapsed().as_millis() as u64;
        result
    }

    pub fn run(
        &self,
        capture: &Capture,
        context: &Context,
        params: &ProviderParams,
    ) -> VerifyResult<StageResult> {
        let started = Instant::now();
        let mut result = StageResult::default();

        if capture.frames().is_empty() {
            return Ok(Self::fail(
                result,
                "No video frames provided".to_string(),
                started,
            ));
        }

        if let Some(ip) = context.ip.as_deref() {
            if self.lists.is_ip_blocked(ip) {
                return Ok(Self::fail(
                    result,
                    format!("Source IP {} is blocklisted", ip),
                    started,
                ));
            }
        }
        let user_id = context
            .user_id
            .as_deref()
            .or(capture.metadata().user_id.as_deref());
        if let Some(user_id) = user_id {
            if self.lists.is_user_blocked(user_id) {
                return Ok(Self::fail(
                    result,
                    format!("User {} is blocklisted", user_id),
                    started,
                ));
            }
        }

        let claimed = context
            .claimed_app_id
            .as_deref()
            .or(capture.metadata().package_name.as_deref())
            .filter(|c| !c.is_empty());
        let expected = self
            .config
            .expected_app_id
            .as_deref()
            .filter(|e| !e.is_empty());
        match (claimed, expected) {
            (Some(claimed), Some(expected)) if claimed != expected => {
                result
                    .signals
                    .insert(signals::APP_INTEGRITY.into(), SignalReading::certain(0.0));
                return Ok(Self::fail(
                    result,
                    format!("Invalid Package Name: {} (Possible Fake App)", claimed),
                    started,
                ));
            }
            _ => {
                result
                    .signals
                    .insert(signals::APP_INTEGRITY.into(), SignalReading::certain(1.0));
            }
        }

        params.cancel.checkpoint(STAGE1)?;
        let sharpness = match self.sharpness.extract(capture, params) {
            Ok(reading) => reading,
            Err(e) => {
                return Ok(Self::fail(
                    result,
                    format!("Image quality could not be assessed: {}", e),
                    started,
                ));
            }
        };
        let blur = sharpness.value;
        let usable = sharpness.is_usable();
        result
            .signals
            .insert(signals::SHARPNESS_VAR.into(), sharpness);
        if !usable {
            return Ok(Self::fail(
                result,
                "Image quality could not be assessed: sharpness reading unusable".to_string(),
                started,
            ));
        }
        if blur < self.config.blur_floor {
            return Ok(Self::fail(
                result,
                "Image too blurry for verification. Please retake.".to_string(),
                started,
            ));
        } else if blur < self.config.blur_degraded {
            result
                .reasons
                .push("Image quality is low (blur detected)".to_string());
        }

        if capture.document().is_some() {
            params.cancel.checkpoint(STAGE1)?;
            let reading = self
                .document
                .extract(capture, params)
                .unwrap_or_else(|e| SignalReading::unavailable(e.to_string()));
            if reading.value < 1.0 || !reading.is_usable() {
                result
                    .reasons
                    .push("Document format (OCR) check failed".to_string());
            }
            result
                .signals
                .insert(signals::DOC_FORMAT_VALID.into(), reading);
        }

        result.passed = true;
        result.latency_ms = started.elapsed().as_millis() as u64;
        result.signals.insert(
            signals::STAGE1_LATENCY.into(),
            SignalReading::certain(result.latency_ms as f64),
        );
        debug!(
            latency_ms = result.latency_ms,
            sharpness = blur,
            "stage 1 passed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trustguard_core::{CancellationToken, Frame, ProviderKind, VerifyError};
    use trustguard_policy::ListConfig;

    use crate::providers::FnProvider;

    fn stage() -> Stage1 {
        Stage1::new(
            Stage1Config::default(),
            Arc::new(AccessLists::from_config(&ListConfig::default())),
        )
    }

    fn params() -> ProviderParams {
        ProviderParams::new(Duration::from_millis(500), CancellationToken::new())
    }

    fn sharp_frame() -> Frame {
        let pixels = (0..32u32)
            .flat_map(|y| (0..32u32).map(move |x| if (x + y) % 2 == 0 { 220 } else { 30 }))
            .collect();
        Frame::gray(32, 32, pixels).unwrap()
    }

    fn flat_frame() -> Frame {
        Frame::gray(32, 32, vec![128; 1024]).unwrap()
    }

    fn sharp_capture() -> Capture {
        Capture::builder().frame(sharp_frame(), None).build().unwrap()
    }

    fn fixed_sharpness(value: f64) -> Arc<dyn SignalProvider> {
        Arc::new(FnProvider::new(
            signals::SHARPNESS_VAR,
            ProviderKind::Heuristic,
            move |_c, _p| Ok(SignalReading::certain(value)),
        ))
    }

    #[test]
    fn test_no_frames_fast_fails() {
        let capture = Capture::builder().build().unwrap();
        let r = stage().run(&capture, &Context::default(), &params()).unwrap();
        assert!(r.fast_fail);
        assert!(!r.passed);
        assert_eq!(r.reasons, vec!["No video frames provided"]);
    }

    #[test]
    fn test_blocked_ip_fast_fails() {
        let ctx = Context::default().with_ip("10.0.0.99");
        let r = stage().run(&sharp_capture(), &ctx, &params()).unwrap();
        assert!(r.fast_fail);
        assert_eq!(r.reasons, vec!["Source IP 10.0.0.99 is blocklisted"]);
    }

    #[test]
    fn test_blocked_user_fast_fails() {
        let ctx = Context::for_user("banned_device_99");
        let r = stage().run(&sharp_capture(), &ctx, &params()).unwrap();
        assert!(r.fast_fail);
    }

    #[test]
    fn test_wrong_package_fast_fails() {
        let capture = Capture::builder()
            .frame(sharp_frame(), None)
            .package_name("com.evil.clone")
            .build()
            .unwrap();
        let r = stage().run(&capture, &Context::default(), &params()).unwrap();
        assert!(r.fast_fail);
        assert_eq!(r.signals[signals::APP_INTEGRITY].value, 0.0);
        assert!(r.reasons[0].contains("com.evil.clone"));
    }

    #[test]
    fn test_context_claim_overrides_metadata() {
        let capture = Capture::builder()
            .frame(sharp_frame(), None)
            .package_name("com.evil.clone")
            .build()
            .unwrap();
        let ctx = Context::default().with_claimed_app("com.trustguard.bank");
        let r = stage().run(&capture, &ctx, &params()).unwrap();
        assert!(r.passed);
        assert_eq!(r.signals[signals::APP_INTEGRITY].value, 1.0);
    }

    #[test]
    fn test_blurry_frame_fast_fails() {
        let capture = Capture::builder().frame(flat_frame(), None).build().unwrap();
        let r = stage().run(&capture, &Context::default(), &params()).unwrap();
        assert!(r.fast_fail);
        assert_eq!(r.signals[signals::SHARPNESS_VAR].value, 0.0);
        assert!(r.reasons[0].starts_with("Image too blurry"));
    }

    #[test]
    fn test_degraded_sharpness_warns() {
        let s = stage().with_sharpness(fixed_sharpness(75.0));
        let r = s.run(&sharp_capture(), &Context::default(), &params()).unwrap();
        assert!(r.passed);
        assert_eq!(r.reasons, vec!["Image quality is low (blur detected)"]);
    }

    #[test]
    fn test_sharpness_error_fast_fails() {
        let failing: Arc<dyn SignalProvider> = Arc::new(FnProvider::new(
            signals::SHARPNESS_VAR,
            ProviderKind::Model,
            |_c, _p| Err(VerifyError::provider("sharpness_var", "decoder crashed")),
        ));
        let s = stage().with_sharpness(failing);
        let r = s.run(&sharp_capture(), &Context::default(), &params()).unwrap();
        assert!(r.fast_fail);
        assert!(r.reasons[0].contains("decoder crashed"));
    }

    #[test]
    fn test_nan_sharpness_fast_fails() {
        let s = stage().with_sharpness(fixed_sharpness(f64::NAN));
        let r = s.run(&sharp_capture(), &Context::default(), &params()).unwrap();
        assert!(r.fast_fail);
        assert!(!r.passed);
        assert!(r.reasons[0].starts_with("Image quality could not be assessed"));
    }

    #[test]
    fn test_zero_confidence_sharpness_fast_fails() {
        let unavailable: Arc<dyn SignalProvider> = Arc::new(FnProvider::new(
            signals::SHARPNESS_VAR,
            ProviderKind::Model,
            |_c, _p| Ok(SignalReading::new(500.0, 0.0)),
        ));
        let s = stage().with_sharpness(unavailable);
        let r = s.run(&sharp_capture(), &Context::default(), &params()).unwrap();
        assert!(r.fast_fail);
        assert!(r.reasons[0].starts_with("Image quality could not be assessed"));
    }

    #[test]
    fn test_bad_document_is_not_fatal() {
        let capture = Capture::builder()
            .frame(sharp_frame(), None)
            .document(Frame::gray(400, 400, vec![0; 160_000]).unwrap())
            .build()
            .unwrap();
        let r = stage().run(&capture, &Context::default(), &params()).unwrap();
        assert!(r.passed);
        assert!(!r.fast_fail);
        assert_eq!(r.signals[signals::DOC_FORMAT_VALID].value, 0.0);
        assert_eq!(r.reasons, vec!["Document format (OCR) check failed"]);
    }

    #[test]
    fn test_pass_records_signals() {
        let r = stage()
            .run(&sharp_capture(), &Context::for_user("alice"), &params())
            .unwrap();
        assert!(r.passed);
        assert!(r.reasons.is_empty());
        assert!(r.signals.contains_key(signals::STAGE1_LATENCY));
        assert!(r.signals[signals::SHARPNESS_VAR].value > 100.0);
    }

    #[test]
    fn test_cancelled_stage_errors() {
        let p = params();
        p.cancel.cancel();
        let err = stage()
            .run(&sharp_capture(), &Context::default(), &p)
            .unwrap_err();
        assert!(matches!(err, VerifyError::Cancelled(_)));
    }
}
