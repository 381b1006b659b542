//! End-to-end: configuration on disk through the root wiring to every
//! audit sink.
//!
//! 1. An operator writes a config and loads it back
//! 2. The root initializes an orchestrator with all audit sinks attached
//! 3. The synthetic scenarios run through the full pipeline
//! 4. Every sink saw every request: JSONL trail, hash chain, drift counters,
//!    and the review queue holds exactly the REVIEW case

use std::path::PathBuf;
use std::sync::Arc;

use trustguard::{demo, initialize, initialize_with, RootConfig};
use trustguard_core::signals;
use trustguard_core::{
    Capture, Context, Decision, DecisionRule, ProviderKind, SignalReading,
};
use trustguard_pipeline::FnProvider;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trustguard-e2e-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn config_in(dir: &PathBuf) -> RootConfig {
    let mut config = RootConfig::default();
    config.audit.log_path = dir.join("logs").join("audit_trail.jsonl");
    config.audit.evidence_root = dir.join("evidence");
    config
}

#[test]
fn chapter_1_config_round_trip() {
    let dir = temp_dir("config");
    let path = dir.join("config.toml");
    let mut config = config_in(&dir);
    config.pipeline.stage2_timeout_ms = 3_000;
    config.save(&path).unwrap();

    let loaded = RootConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn chapter_2_demo_scenarios_reach_every_sink() {
    let dir = temp_dir("demo");
    let state = initialize(config_in(&dir)).unwrap();

    let outcomes = demo::run(&state, 7).await.unwrap();
    let decision_of = |name: &str| {
        outcomes
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, d)| d.clone())
            .unwrap()
    };

    assert_eq!(decision_of("genuine").decision, Decision::Trusted);
    assert_eq!(decision_of("spliced").decision, Decision::Review);
    assert!(decision_of("spliced")
        .reasons
        .contains(&"Optical Flow indicated high risk (1.00)".to_string()));
    assert_eq!(
        decision_of("no_frames").reasons,
        vec!["No video frames provided"]
    );
    assert_eq!(decision_of("blurry").decision, Decision::Block);
    assert_eq!(decision_of("blurry").rule, DecisionRule::FastFail);
    assert!(decision_of("cloned_app").reasons[0].contains("com.evil.clone"));
    assert_eq!(decision_of("blocklisted").decision, Decision::Block);
    assert_eq!(decision_of("allowlisted").decision, Decision::Trusted);

    // JSONL trail
    let written = state.audit_log.read_all().unwrap();
    assert_eq!(written.len(), outcomes.len());
    assert_eq!(state.audit_log.read_recent(3).unwrap().len(), 3);

    // Hash chain
    assert_eq!(state.chain.len(), outcomes.len());
    assert!(state.chain.verify_chain().unwrap());

    // Drift counters
    let stats = state.drift.stats().unwrap();
    assert_eq!(stats.total, outcomes.len() as u64);
    assert_eq!(stats.blocked, 4);
    assert_eq!(stats.reviewed, 1);
    assert_eq!(stats.trusted, 2);
    assert_eq!(stats.fast_fail, 4);
    assert!(!stats.score_alarm);

    // Review queue
    let pending = state.review.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].user_id.as_deref(), Some("bob"));
    assert!(pending[0]
        .evidence_path
        .as_ref()
        .unwrap()
        .starts_with(dir.join("evidence")));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn chapter_3_capture_from_json() {
    let dir = temp_dir("json");
    let state = initialize(config_in(&dir)).unwrap();

    let original = demo::scenarios(11).unwrap().remove(0).capture;
    let json = serde_json::to_string(&original).unwrap();
    let parsed: Capture = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, original);

    let (decision, record) = state
        .orchestrator
        .assess_verification(parsed, Context::for_user("alice"))
        .await;
    assert_eq!(decision.decision, Decision::Trusted);
    assert_eq!(
        state.audit_log.read_all().unwrap()[0].audit_id,
        record.audit_id
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn chapter_4_extra_providers_through_hook() {
    let dir = temp_dir("hook");
    let deepfake_model = Arc::new(
        |_f: &trustguard_core::Frame,
         _b: &trustguard_core::FaceBox|
         -> trustguard_core::VerifyResult<f64> { Ok(0.97) },
    );
    let pulse = Arc::new(FnProvider::new(
        signals::RPPG_CONF,
        ProviderKind::Model,
        |_c, _p| Ok(SignalReading::certain(0.9)),
    ));
    let state = initialize_with(config_in(&dir), |builder| {
        builder.classifier(deepfake_model).provider(pulse)
    })
    .unwrap();

    let capture = demo::scenarios(3).unwrap().remove(0).capture;
    let (decision, _) = state
        .orchestrator
        .assess_verification(capture, Context::for_user("alice"))
        .await;
    assert_eq!(decision.decision, Decision::Block);
    assert_eq!(decision.rule, DecisionRule::HardOverride);
    assert_eq!(state.drift.stats().unwrap().deepfake_detections, 1);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn chapter_5_invalid_config_refused() {
    let dir = temp_dir("invalid");
    let mut config = config_in(&dir);
    config.pipeline.frame_stride = 0;
    assert!(initialize(config).is_err());
}
