use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use trustguard_core::{
    AuditRecord, AuditRecorder, CancellationToken, Capture, Context, DecisionRule,
    FrameClassifier, PendingAudit, PipelineState, PolicyDecision, ProviderParams, SignalMap,
    SignalProvider, StageResult, VerifyError, VerifyResult,
};
use trustguard_fusion::{FusionConfig, FusionScorer};
use trustguard_policy::{AccessLists, PolicyConfig, PolicyEngine};

use crate::config::PipelineConfig;
use crate::providers::{AudioPresence, FlowConsistency};
use crate::stage1::{Stage1, STAGE1};
use crate::stage2::{Stage2, STAGE2};
use crate::timeout::{join_failure, run_with_budget, Deadline};

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives a capture through both stages, fusion and policy.
///
/// Every call returns exactly one decision and one audit record. Stage
/// errors, panics and timeouts are converted into a forced BLOCK; nothing
/// fails open.
pub struct Orchestrator {
    config: PipelineConfig,
    stage1: Arc<Stage1>,
    stage2: Arc<Stage2>,
    fusion: Arc<FusionScorer>,
    policy: Arc<PolicyEngine>,
    recorders: Vec<Arc<dyn AuditRecorder>>,
}

impl Orchestrator {
    pub fn builder(config: PipelineConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn fusion(&self) -> &FusionScorer {
        &self.fusion
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Shared allow/deny lists, for runtime list management.
    pub fn lists(&self) -> &Arc<AccessLists> {
        self.policy.lists()
    }

    pub async fn assess_verification(
        &self,
        capture: impl Into<Arc<Capture>>,
        context: Context,
    ) -> (PolicyDecision, AuditRecord) {
        let capture = capture.into();
        let context = resolve_user(context, &capture);
        let mut audit = PendingAudit::start(&self.config.audit_prefix, &context);
        let span = info_span!(
            "verify",
            audit_id = %audit.audit_id(),
            action = %context.action
        );

        let (decision, signals) = self
            .drive(capture, &context, &mut audit)
            .instrument(span.clone())
            .await;

        let record = audit.finalize(&decision, &signals);
        span.in_scope(|| {
            self.dispatch(&record);
            info!(
                decision = %record.decision,
                score = record.score,
                rule = %record.rule,
                status = %record.status,
                latency_ms = record.latency_ms,
                "verification complete"
            );
        });
        (decision, record)
    }

    async fn drive(
        &self,
        capture: Arc<Capture>,
        context: &Context,
        audit: &mut PendingAudit,
    ) -> (PolicyDecision, SignalMap) {
        let deadline = Deadline::new(self.config.total_budget());
        let request = CancellationToken::new();
        let mut signals = SignalMap::new();

        audit.enter(PipelineState::Stage1);
        let stage1 = match self.run_stage1(&capture, context, &deadline, &request).await {
            Ok(result) => result,
            Err(e) => return (self.stage_failure(audit, &request, e), signals),
        };
        signals.extend(stage1.signals.clone());
        if stage1.fast_fail {
            audit.enter(PipelineState::FastFailExit);
            return (
                PolicyDecision::forced_block(DecisionRule::FastFail, stage1.reasons),
                signals,
            );
        }

        audit.enter(PipelineState::Stage2);
        let stage2 = match self.run_stage2(&capture, &deadline, &request).await {
            Ok(result) => result,
            Err(e) => return (self.stage_failure(audit, &request, e), signals),
        };
        signals.extend(stage2.signals);

        audit.enter(PipelineState::Fusion);
        let breakdown = self.fusion.score(&signals);

        audit.enter(PipelineState::Policy);
        let mut decision = self.policy.evaluate(&breakdown, &signals, context);

        // List decisions stand on their own; everything else carries the
        // fusion call-outs and stage notes.
        if !matches!(decision.rule, DecisionRule::Allowlist | DecisionRule::Blocklist) {
            let notes = self
                .fusion
                .explain(&breakdown, self.config.explain_top_n)
                .into_iter()
                .chain(stage1.reasons)
                .chain(stage2.reasons);
            for note in notes {
                if !decision.reasons.contains(&note) {
                    decision.reasons.push(note);
                }
            }
        }
        debug!(
            score = breakdown.final_score,
            remaining_ms = deadline.remaining().as_millis() as u64,
            "policy applied"
        );
        (decision, signals)
    }

    async fn run_stage1(
        &self,
        capture: &Arc<Capture>,
        context: &Context,
        deadline: &Deadline,
        request: &CancellationToken,
    ) -> VerifyResult<StageResult> {
        let budget = deadline.stage_budget(self.config.stage1_budget());
        let token = request.child();
        let params = ProviderParams::new(budget, token.clone());
        let stage = Arc::clone(&self.stage1);
        let capture = Arc::clone(capture);
        let context = context.clone();
        run_with_budget(STAGE1, budget, token, async move {
            match tokio::task::spawn_blocking(move || stage.run(&capture, &context, &params)).await
            {
                Ok(result) => result,
                Err(e) => Err(join_failure(STAGE1, e)),
            }
        })
        .await
    }

    async fn run_stage2(
        &self,
        capture: &Arc<Capture>,
        deadline: &Deadline,
        request: &CancellationToken,
    ) -> VerifyResult<StageResult> {
        let budget = deadline.stage_budget(self.config.stage2_budget());
        let token = request.child();
        let worker_token = token.clone();
        let stage = Arc::clone(&self.stage2);
        let capture = Arc::clone(capture);
        run_with_budget(STAGE2, budget, token, async move {
            stage.run(capture, worker_token).await
        })
        .await
    }

    fn stage_failure(
        &self,
        audit: &mut PendingAudit,
        request: &CancellationToken,
        err: VerifyError,
    ) -> PolicyDecision {
        request.cancel();
        audit.enter(PipelineState::StageFailure);
        error!(error = %err, "stage failed, blocking request");
        PolicyDecision::forced_block(
            DecisionRule::StageFailure,
            vec![format!("Stage failure/timeout: {}", err)],
        )
    }

    fn dispatch(&self, record: &AuditRecord) {
        for recorder in &self.recorders {
            if let Err(e) = recorder.record_verification(record) {
                error!(error = %e, "audit recorder failed");
            }
        }
    }
}

/// Falls back to the capture's metadata when the caller named no user, so
/// Stage 1, policy lists and the audit record all see the same id.
fn resolve_user(mut context: Context, capture: &Capture) -> Context {
    if context.user_id.is_none() {
        context.user_id = capture.metadata().user_id.clone();
    }
    context
}

// ---------------------------------------------------------------------------
// OrchestratorBuilder
// ---------------------------------------------------------------------------

pub struct OrchestratorBuilder {
    config: PipelineConfig,
    fusion: FusionConfig,
    policy: PolicyConfig,
    lists: Option<Arc<AccessLists>>,
    providers: Vec<Arc<dyn SignalProvider>>,
    classifier: Option<Arc<dyn FrameClassifier>>,
    sharpness: Option<Arc<dyn SignalProvider>>,
    document: Option<Arc<dyn SignalProvider>>,
    recorders: Vec<Arc<dyn AuditRecorder>>,
}

impl OrchestratorBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            fusion: FusionConfig::default(),
            policy: PolicyConfig::default(),
            lists: None,
            providers: Vec::new(),
            classifier: None,
            sharpness: None,
            document: None,
            recorders: Vec::new(),
        }
    }

    pub fn fusion(mut self, config: FusionConfig) -> Self {
        self.fusion = config;
        self
    }

    pub fn policy(mut self, config: PolicyConfig) -> Self {
        self.policy = config;
        self
    }

    /// Shares existing lists instead of building them from the policy config.
    pub fn lists(mut self, lists: Arc<AccessLists>) -> Self {
        self.lists = Some(lists);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Adds the bundled Stage 2 heuristics (temporal flow, audio presence).
    pub fn heuristics(self) -> Self {
        self.provider(Arc::new(FlowConsistency))
            .provider(Arc::new(AudioPresence::default()))
    }

    pub fn classifier(mut self, classifier: Arc<dyn FrameClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn sharpness(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.sharpness = Some(provider);
        self
    }

    pub fn document_check(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.document = Some(provider);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn AuditRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }

    pub fn build(self) -> VerifyResult<Orchestrator> {
        self.config.validate()?;
        let lists = self
            .lists
            .unwrap_or_else(|| Arc::new(AccessLists::from_config(&self.policy.lists)));
        let policy = PolicyEngine::new(self.policy, Arc::clone(&lists))?;
        let fusion = FusionScorer::new(self.fusion)?;

        let mut stage1 = Stage1::new(self.config.stage1.clone(), lists);
        if let Some(provider) = self.sharpness {
            stage1 = stage1.with_sharpness(provider);
        }
        if let Some(provider) = self.document {
            stage1 = stage1.with_document_check(provider);
        }

        let mut stage2 = Stage2::new(&self.config);
        for provider in self.providers {
            stage2 = stage2.with_provider(provider);
        }
        if let Some(classifier) = self.classifier {
            stage2 = stage2.with_classifier(classifier);
        }
        if stage2.providers().is_empty() && !stage2.has_classifier() {
            warn!("no stage 2 providers configured; fusion will rely on stage 1 signals");
        }

        info!(
            providers = stage2.providers().len(),
            classifier = stage2.has_classifier(),
            recorders = self.recorders.len(),
            max_workers = self.config.max_workers,
            "orchestrator ready"
        );
        Ok(Orchestrator {
            config: self.config,
            stage1: Arc::new(stage1),
            stage2: Arc::new(stage2),
            fusion: Arc::new(fusion),
            policy: Arc::new(policy),
            recorders: self.recorders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustguard_core::{Decision, Frame};

    fn sharp_capture() -> Capture {
        let pixels = (0..32u32)
            .flat_map(|y| (0..32u32).map(move |x| if (x + y) % 2 == 0 { 220 } else { 30 }))
            .collect();
        Capture::builder()
            .frame(Frame::gray(32, 32, pixels).unwrap(), None)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = PipelineConfig {
            max_workers: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Orchestrator::builder(config).build(),
            Err(VerifyError::Config(_))
        ));
    }

    #[test]
    fn test_build_rejects_bad_fusion_weights() {
        let mut fusion = FusionConfig::default();
        fusion.weights.insert("deepfake".into(), 0.9);
        assert!(Orchestrator::builder(PipelineConfig::default())
            .fusion(fusion)
            .build()
            .is_err());
    }

    #[tokio::test]
    async fn test_fast_fail_trail() {
        let orchestrator = Orchestrator::builder(PipelineConfig::default())
            .build()
            .unwrap();
        let empty = Capture::builder().build().unwrap();
        let (decision, record) = orchestrator
            .assess_verification(empty, Context::default())
            .await;
        assert_eq!(decision.decision, Decision::Block);
        assert_eq!(decision.rule, DecisionRule::FastFail);
        assert_eq!(record.status, PipelineState::FastFailExit);
        assert_eq!(
            record.trail,
            vec![
                PipelineState::Initiated,
                PipelineState::Stage1,
                PipelineState::FastFailExit,
                PipelineState::Complete
            ]
        );
    }

    #[tokio::test]
    async fn test_complete_trail() {
        let orchestrator = Orchestrator::builder(PipelineConfig::default())
            .build()
            .unwrap();
        let (_, record) = orchestrator
            .assess_verification(sharp_capture(), Context::for_user("alice"))
            .await;
        assert_eq!(record.status, PipelineState::Complete);
        assert_eq!(record.trail.len(), 6);
        assert!(record.audit_id.as_str().starts_with("REQ-"));
        assert!(record.sanitized_signals.contains_key("sharpness_var"));
    }

    #[tokio::test]
    async fn test_metadata_user_reaches_policy_lists() {
        let orchestrator = Orchestrator::builder(PipelineConfig::default())
            .build()
            .unwrap();
        let pixels = (0..32u32)
            .flat_map(|y| (0..32u32).map(move |x| if (x + y) % 2 == 0 { 220 } else { 30 }))
            .collect();
        let capture = Capture::builder()
            .frame(Frame::gray(32, 32, pixels).unwrap(), None)
            .user_id("admin_superuser")
            .build()
            .unwrap();
        let (decision, record) = orchestrator
            .assess_verification(capture, Context::default())
            .await;
        assert_eq!(decision.decision, Decision::Trusted);
        assert_eq!(decision.rule, DecisionRule::Allowlist);
        assert_eq!(record.user_id.as_deref(), Some("admin_superuser"));
    }

    #[test]
    fn test_caller_user_wins_over_metadata() {
        let capture = Capture::builder().user_id("from_device").build().unwrap();
        let resolved = resolve_user(Context::for_user("from_session"), &capture);
        assert_eq!(resolved.user_id.as_deref(), Some("from_session"));
        let resolved = resolve_user(Context::default(), &capture);
        assert_eq!(resolved.user_id.as_deref(), Some("from_device"));
    }

    #[tokio::test]
    async fn test_shared_lists_take_effect_at_runtime() {
        let orchestrator = Orchestrator::builder(PipelineConfig::default())
            .build()
            .unwrap();
        orchestrator.lists().block_ip("203.0.113.7");
        let ctx = Context::for_user("alice").with_ip("203.0.113.7");
        let (decision, _) = orchestrator.assess_verification(sharp_capture(), ctx).await;
        assert_eq!(decision.decision, Decision::Block);
        assert_eq!(decision.reasons, vec!["Source IP 203.0.113.7 is blocklisted"]);
    }
}
