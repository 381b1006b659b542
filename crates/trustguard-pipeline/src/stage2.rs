use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use trustguard_core::signals;
use trustguard_core::{
    CancellationToken, Capture, FrameClassifier, ProviderParams, SignalMap, SignalProvider,
    SignalReading, StageResult, VerifyResult,
};

use crate::aggregate::FrameAggregation;
use crate::config::PipelineConfig;
use crate::timeout::run_provider_with_budget;

pub const STAGE2: &str = "stage2";

const DEEPFAKE: &str = "deepfake_classifier";

/// Readings Stage 2 writes for bookkeeping; they are not evidence.
const BOOKKEEPING: [&str; 2] = [signals::DEEPFAKE_FRAMES_PROCESSED, signals::DEEPFAKE_PASS];

enum TaskOutput {
    Signal(String, SignalReading),
    Deepfake(VerifyResult<Vec<f64>>),
}

/// Classifies every `stride`-th frame that carries a usable face box.
/// Frames the classifier rejects are skipped.
fn classify_frames(
    classifier: &dyn FrameClassifier,
    capture: &Capture,
    stride: usize,
    cancel: &CancellationToken,
) -> VerifyResult<Vec<f64>> {
    let mut scores = Vec::new();
    for idx in (0..capture.frames().len()).step_by(stride.max(1)) {
        cancel.checkpoint(DEEPFAKE)?;
        let face = match capture.face_box(idx) {
            Some(b) if !b.is_degenerate() => b,
            _ => continue,
        };
        match classifier.classify(&capture.frames()[idx], face) {
            Ok(p) if p.is_finite() => scores.push(p.clamp(0.0, 1.0)),
            Ok(p) => debug!(frame = idx, score = p, "non-finite frame score dropped"),
            Err(e) => debug!(frame = idx, error = %e, "frame classification failed"),
        }
    }
    Ok(scores)
}

// ---------------------------------------------------------------------------
// Stage 2: heavy checks
// ---------------------------------------------------------------------------

/// Waits for a worker slot, warning when the pool is saturated.
async fn acquire(
    workers: &Arc<Semaphore>,
    name: &str,
) -> Result<OwnedSemaphorePermit, AcquireError> {
    if workers.available_permits() == 0 {
        warn!(provider = %name, "stage 2 worker pool exhausted, waiting for a slot");
    }
    Arc::clone(workers).acquire_owned().await
}

/// Runs every provider and the frame classifier concurrently on a bounded
/// worker pool. A failing provider becomes a zero-confidence reading; it
/// never fails the stage.
pub struct Stage2 {
    providers: Vec<Arc<dyn SignalProvider>>,
    classifier: Option<Arc<dyn FrameClassifier>>,
    workers: Arc<Semaphore>,
    provider_budget: Duration,
    frame_stride: usize,
    aggregation: FrameAggregation,
    min_deepfake_frames: usize,
    min_usable_signals: usize,
    deepfake_pass_threshold: f64,
}

impl Stage2 {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            providers: Vec::new(),
            classifier: None,
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
            provider_budget: config.provider_budget(),
            frame_stride: config.frame_stride,
            aggregation: config.frame_aggregation,
            min_deepfake_frames: config.min_deepfake_frames,
            min_usable_signals: config.min_usable_signals,
            deepfake_pass_threshold: config.deepfake_pass_threshold,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FrameClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn providers(&self) -> &[Arc<dyn SignalProvider>] {
        &self.providers
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn run(
        &self,
        capture: Arc<Capture>,
        cancel: CancellationToken,
    ) -> VerifyResult<StageResult> {
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let capture = Arc::clone(&capture);
            let workers = Arc::clone(&self.workers);
            let token = cancel.child();
            let budget = self.provider_budget;
            tasks.spawn(async move {
                let name = provider.name().to_string();
                let permit = match acquire(&workers, &name).await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return TaskOutput::Signal(name, SignalReading::unavailable("worker pool closed"))
                    }
                };
                let params = ProviderParams::new(budget, token.clone());
                let reading = run_provider_with_budget(&name, budget, token, move || {
                    provider.extract(&capture, &params)
                })
                .await
                .unwrap_or_else(|e| {
                    warn!(provider = %name, error = %e, "provider failed");
                    SignalReading::unavailable(e.to_string())
                });
                // Released on timeout too; an overrun thread no longer holds a slot.
                drop(permit);
                TaskOutput::Signal(name, reading)
            });
        }

        if let Some(classifier) = &self.classifier {
            let classifier = Arc::clone(classifier);
            let capture = Arc::clone(&capture);
            let workers = Arc::clone(&self.workers);
            let token = cancel.child();
            let budget = self.provider_budget;
            let stride = self.frame_stride;
            tasks.spawn(async move {
                let permit = match acquire(&workers, DEEPFAKE).await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return TaskOutput::Deepfake(Err(trustguard_core::VerifyError::provider(
                            DEEPFAKE,
                            "worker pool closed",
                        )))
                    }
                };
                let worker_token = token.clone();
                let result = run_provider_with_budget(DEEPFAKE, budget, token, move || {
                    classify_frames(classifier.as_ref(), &capture, stride, &worker_token)
                })
                .await;
                drop(permit);
                TaskOutput::Deepfake(result)
            });
        }

        // Results stay local until every task has reported.
        let mut provided = SignalMap::new();
        let mut deepfake = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutput::Signal(name, reading)) => {
                    provided.insert(name, reading);
                }
                Ok(TaskOutput::Deepfake(result)) => deepfake = Some(result),
                Err(e) => warn!(error = %e, "stage 2 task lost"),
            }
        }

        let mut result = StageResult::default();
        let deepfake_ok = match deepfake {
            Some(outcome) => self.record_deepfake(outcome, &mut result),
            None => true,
        };
        for (name, reading) in &provided {
            if !reading.is_usable() {
                let cause = reading
                    .debug
                    .as_ref()
                    .and_then(|d| d.get("error"))
                    .and_then(|e| e.as_str())
                    .unwrap_or("no confidence");
                result
                    .reasons
                    .push(format!("Signal {} unavailable: {}", name, cause));
            }
        }
        result.signals.extend(provided);

        let usable = result
            .signals
            .iter()
            .filter(|(k, r)| !BOOKKEEPING.contains(&k.as_str()) && r.is_usable())
            .count();
        if usable < self.min_usable_signals {
            result.reasons.push(format!(
                "Only {} usable signals, {} required",
                usable, self.min_usable_signals
            ));
        }
        result.passed = usable >= self.min_usable_signals && deepfake_ok;
        result.latency_ms = started.elapsed().as_millis() as u64;

        info!(
            usable,
            passed = result.passed,
            latency_ms = result.latency_ms,
            "stage 2 complete"
        );
        Ok(result)
    }

    /// Writes the deepfake signals; returns whether the evidence was sufficient.
    fn record_deepfake(&self, outcome: VerifyResult<Vec<f64>>, result: &mut StageResult) -> bool {
        let scores = match outcome {
            Ok(scores) => scores,
            Err(e) => {
                warn!(error = %e, "deepfake classifier failed");
                result.reasons.push(format!(
                    "Insufficient evidence: deepfake classifier failed ({})",
                    e
                ));
                result.signals.insert(
                    signals::VIDEO_FAKE_PROB.into(),
                    SignalReading::unavailable(e.to_string()),
                );
                result.signals.insert(
                    signals::DEEPFAKE_FRAMES_PROCESSED.into(),
                    SignalReading::certain(0.0),
                );
                result
                    .signals
                    .insert(signals::DEEPFAKE_PASS.into(), SignalReading::certain(0.0));
                return false;
            }
        };

        let processed = scores.len();
        result.signals.insert(
            signals::DEEPFAKE_FRAMES_PROCESSED.into(),
            SignalReading::certain(processed as f64),
        );
        let aggregated = self.aggregation.aggregate(&scores);
        match aggregated {
            Some(prob) if processed >= self.min_deepfake_frames => {
                let pass = prob < self.deepfake_pass_threshold;
                debug!(prob, processed, pass, "deepfake scored");
                result.signals.insert(
                    signals::VIDEO_FAKE_PROB.into(),
                    SignalReading::certain(prob).with_debug(json!({
                        "frames": processed,
                        "aggregation": self.aggregation,
                        "sample": scores.iter().take(5).collect::<Vec<_>>(),
                    })),
                );
                result.signals.insert(
                    signals::DEEPFAKE_PASS.into(),
                    SignalReading::certain(if pass { 1.0 } else { 0.0 }),
                );
                true
            }
            _ => {
                let reason = format!(
                    "Insufficient evidence: {} face frames classified, {} required",
                    processed, self.min_deepfake_frames
                );
                result.signals.insert(
                    signals::VIDEO_FAKE_PROB.into(),
                    SignalReading::unavailable(reason.clone()),
                );
                result
                    .signals
                    .insert(signals::DEEPFAKE_PASS.into(), SignalReading::certain(0.0));
                result.reasons.push(reason);
                false
            }
        }
    }
}
