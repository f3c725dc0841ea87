//! End-to-end scenarios for the hybrid investigation executor, driven
//! entirely through mock ports.

use std::sync::Arc;

use inquest_config::{EvidenceConfig, Mode};
use inquest_contracts::{
    ConfidenceLevel, Domain, FraudLikelihood, InquestError, InvestigationState,
    InvestigationStatus, ProviderErrorKind, RecommendedAction, SafetyConcernType, Severity,
    Strategy,
};
use inquest_orchestration::testkit::{
    make_decision, sequential_recommendation, test_seed, FnAssessor, MockAgentRunner,
    MockAssistant, MockBootstrapper, MockToolInvoker, RecordingSink,
};
use inquest_orchestration::{ExecutorPorts, GraphExecutor, MemoryCheckpointer};

fn executor_with(
    assessor: Arc<FnAssessor>,
    agents: Arc<MockAgentRunner>,
    assistant: Arc<MockAssistant>,
    bootstrapper: Arc<MockBootstrapper>,
    sink: Arc<RecordingSink>,
    checkpointer: Arc<MemoryCheckpointer>,
) -> GraphExecutor {
    GraphExecutor::new(
        Mode::Mock,
        EvidenceConfig::default(),
        ExecutorPorts {
            bootstrapper,
            assistant,
            agents,
            tools: Arc::new(MockToolInvoker::default()),
            assessor,
            checkpointer,
            sink,
            monitor: None,
        },
    )
}

fn snowflake_bootstrapper(indicators: &[&str]) -> Arc<MockBootstrapper> {
    Arc::new(MockBootstrapper {
        init_result: serde_json::json!({
            "snowflake_data": {"transactions": 64, "distinct_devices": 5, "chargebacks": 2},
            "snowflake_quality": 0.9,
            "snowflake_completed": true,
            "risk_indicators": indicators,
        }),
        ..Default::default()
    })
}

fn sequential_low_assessor() -> Arc<FnAssessor> {
    Arc::new(FnAssessor::new(|_, snapshot| {
        Ok(make_decision(
            0.3,
            ConfidenceLevel::Low,
            Strategy::Adaptive,
            sequential_recommendation(snapshot),
        ))
    }))
}

#[tokio::test]
async fn high_confidence_critical_path_completes_via_risk_agent() {
    let sink = Arc::new(RecordingSink::default());
    let assessor = Arc::new(FnAssessor::new(|_, snapshot: &InvestigationState| {
        let action = if snapshot.domains_completed.contains(&Domain::Risk) {
            RecommendedAction::Summary
        } else {
            RecommendedAction::Agent(Domain::Risk)
        };
        Ok(make_decision(
            0.9,
            ConfidenceLevel::High,
            Strategy::CriticalPath,
            action,
        ))
    }));
    let executor = executor_with(
        assessor,
        Arc::new(MockAgentRunner::healthy()),
        Arc::new(MockAssistant {
            tools_to_request: Vec::new(),
            ..Default::default()
        }),
        snowflake_bootstrapper(&["device_spoof"]),
        sink.clone(),
        Arc::new(MemoryCheckpointer::new()),
    );

    let state = InvestigationState::create_initial(test_seed("it-critical-path", 12));
    let outcome = executor.run(state).await.unwrap();

    assert_eq!(outcome.status, InvestigationStatus::Completed);
    assert!(outcome.success);

    let final_state = sink.last_state().unwrap();
    assert!(final_state.domains_completed.contains(&Domain::Risk));
    assert_eq!(final_state.domains_completed.len(), 1);

    let score = outcome.risk_assessment.final_risk_score.unwrap();
    if score >= 0.7 {
        assert!(matches!(
            outcome.risk_assessment.fraud_likelihood,
            FraudLikelihood::High | FraudLikelihood::VeryHigh
        ));
    }
    // Routing history shows the shortcut: risk agent, then summary.
    let routed: Vec<&str> = final_state
        .routing_decisions
        .iter()
        .map(|r| r.decision.as_str())
        .collect();
    assert_eq!(routed, vec!["risk_agent", "summary"]);
}

#[tokio::test]
async fn insufficient_evidence_gates_the_risk_score() {
    let sink = Arc::new(RecordingSink::default());
    let executor = executor_with(
        sequential_low_assessor(),
        Arc::new(MockAgentRunner::insufficient()),
        Arc::new(MockAssistant::default()),
        Arc::new(MockBootstrapper::default()),
        sink.clone(),
        Arc::new(MemoryCheckpointer::new()),
    );

    let state = InvestigationState::create_initial(test_seed("it-evidence-gated", 12));
    let outcome = executor.run(state).await.unwrap();

    assert_eq!(outcome.risk_assessment.final_risk_score, None);
    assert_eq!(outcome.status, InvestigationStatus::CompletedWithWarnings);
    assert!(outcome.success);

    let final_state = sink.last_state().unwrap();
    assert_eq!(final_state.domain_findings.len(), 5);
    assert!(final_state
        .safety_concerns
        .iter()
        .any(|c| c.concern_type == SafetyConcernType::EvidenceInsufficient));
    // The audit trail records the gated summary.
    assert!(final_state
        .decision_audit_trail
        .iter()
        .any(|e| e.decision_type == "investigation_summary"));
}

#[tokio::test]
async fn stalled_investigation_terminates_at_the_loop_limit() {
    let sink = Arc::new(RecordingSink::default());
    let assessor = Arc::new(FnAssessor::new(|_, _: &InvestigationState| {
        Ok(make_decision(
            0.3,
            ConfidenceLevel::Low,
            Strategy::Adaptive,
            RecommendedAction::Tools,
        ))
    }));
    let executor = executor_with(
        assessor,
        Arc::new(MockAgentRunner::healthy()),
        Arc::new(MockAssistant {
            tools_to_request: Vec::new(),
            ..Default::default()
        }),
        snowflake_bootstrapper(&[]),
        sink.clone(),
        Arc::new(MemoryCheckpointer::new()),
    );

    let state = InvestigationState::create_initial(test_seed("it-loop-limit", 12));
    let outcome = executor.run(state).await.unwrap();

    assert_eq!(outcome.status, InvestigationStatus::TerminatedBySafety);
    assert!(!outcome.success);

    let final_state = sink.last_state().unwrap();
    assert!(final_state.safety_concerns.iter().any(|c| {
        c.concern_type == SafetyConcernType::LoopRisk && c.severity == Severity::Critical
    }));
    assert!(
        final_state.orchestrator_loops >= final_state.dynamic_limits.max_orchestrator_loops,
        "terminated at {} loops with limit {}",
        final_state.orchestrator_loops,
        final_state.dynamic_limits.max_orchestrator_loops
    );
    // The deviation from the AI's recommendation was recorded every loop.
    assert!(!final_state.safety_overrides.is_empty());
}

#[tokio::test]
async fn provider_context_length_error_surfaces_without_synthesis() {
    let sink = Arc::new(RecordingSink::default());
    let assessor = Arc::new(FnAssessor::new(|call, snapshot: &InvestigationState| {
        if call >= 3 {
            Err(InquestError::Provider {
                kind: ProviderErrorKind::ContextLengthExceeded,
                message: "prompt exceeds the model context window".into(),
            })
        } else {
            Ok(make_decision(
                0.3,
                ConfidenceLevel::Low,
                Strategy::Adaptive,
                sequential_recommendation(snapshot),
            ))
        }
    }));
    let executor = executor_with(
        assessor,
        Arc::new(MockAgentRunner::healthy()),
        Arc::new(MockAssistant::default()),
        Arc::new(MockBootstrapper::default()),
        sink.clone(),
        Arc::new(MemoryCheckpointer::new()),
    );

    let state = InvestigationState::create_initial(test_seed("it-provider-error", 12));
    let result = executor.run(state).await;

    match result {
        Err(InquestError::Provider { kind, .. }) => {
            assert_eq!(kind, ProviderErrorKind::ContextLengthExceeded);
        }
        other => panic!("expected provider error, got {:?}", other.map(|o| o.status)),
    }
    assert!(!sink.outcomes.lock().iter().any(|o| o.success));
}

#[tokio::test]
async fn denied_ai_control_records_overrides_with_concern_types() {
    let sink = Arc::new(RecordingSink::default());
    // Always recommends tools; sequential routing deviates immediately.
    let assessor = Arc::new(FnAssessor::new(|_, _: &InvestigationState| {
        Ok(make_decision(
            0.3,
            ConfidenceLevel::Low,
            Strategy::Adaptive,
            RecommendedAction::Tools,
        ))
    }));
    let executor = executor_with(
        assessor,
        Arc::new(MockAgentRunner::healthy()),
        Arc::new(MockAssistant::default()),
        Arc::new(MockBootstrapper::default()),
        sink.clone(),
        Arc::new(MemoryCheckpointer::new()),
    );

    let state = InvestigationState::create_initial(test_seed("it-override", 12));
    let outcome = executor.run(state).await.unwrap();

    let final_state = sink.last_state().unwrap();
    assert!(!final_state.safety_overrides.is_empty());
    let first = &final_state.safety_overrides[0];
    assert_eq!(first.original_ai_decision, "tools");
    assert!(!first.reasoning.is_empty());
    // Override reasons propagate into the intelligence metrics.
    assert_eq!(
        outcome.ai_intelligence.safety_overrides,
        final_state.safety_overrides.len()
    );
}

#[tokio::test]
async fn ab_arms_produce_schema_identical_outcomes() {
    use inquest_orchestration::{
        rollout_hash, DeploymentMode, FeatureFlags, GraphKind, GraphSelector,
    };

    let mut flags = FeatureFlags::with_defaults();
    flags.enable(
        inquest_orchestration::flags::AB_TEST_HYBRID_VS_CLEAN,
        100,
        DeploymentMode::AbTest,
    );
    let selector = GraphSelector::new(flags);

    let hybrid_id = (0..10_000)
        .map(|i| format!("case-{}", i))
        .find(|id| rollout_hash(id) < 50)
        .unwrap();
    let sequential_id = (0..10_000)
        .map(|i| format!("case-{}", i))
        .find(|id| rollout_hash(id) >= 50)
        .unwrap();

    assert_eq!(
        selector.choose(&hybrid_id, "ip_address", None),
        GraphKind::Hybrid
    );
    assert_eq!(
        selector.choose(&sequential_id, "ip_address", None),
        GraphKind::Sequential
    );

    let mut keysets = Vec::new();
    for id in [&hybrid_id, &sequential_id] {
        let sink = Arc::new(RecordingSink::default());
        let executor = executor_with(
            sequential_low_assessor(),
            Arc::new(MockAgentRunner::healthy()),
            Arc::new(MockAssistant::default()),
            Arc::new(MockBootstrapper::default()),
            sink,
            Arc::new(MemoryCheckpointer::new()),
        );
        let state = InvestigationState::create_initial(test_seed(id, 12));
        let outcome = executor.run(state).await.unwrap();

        let value = serde_json::to_value(&outcome).unwrap();
        let keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keysets.push(keys);
    }
    assert_eq!(keysets[0], keysets[1]);
}

#[tokio::test]
async fn failing_agent_marks_domain_and_run_continues() {
    let sink = Arc::new(RecordingSink::default());
    let mut agents = MockAgentRunner::healthy();
    agents.failing_domain = Some(Domain::Device);
    let executor = executor_with(
        sequential_low_assessor(),
        Arc::new(agents),
        Arc::new(MockAssistant::default()),
        Arc::new(MockBootstrapper::default()),
        sink.clone(),
        Arc::new(MemoryCheckpointer::new()),
    );

    let state = InvestigationState::create_initial(test_seed("it-agent-failure", 12));
    let outcome = executor.run(state).await.unwrap();

    // The failure is recorded and the outcome reflects it, but every
    // terminal state still carries a canonical outcome.
    assert_eq!(outcome.status, InvestigationStatus::Failed);
    assert!(!outcome.success);
    assert!(!outcome.completion_reason.is_empty());

    let final_state = sink.last_state().unwrap();
    assert!(final_state
        .errors
        .iter()
        .any(|e| e.error_type == "agent_error"));
    let device = final_state.domain_findings.get(&Domain::Device).unwrap();
    assert_eq!(device.status, inquest_contracts::FindingStatus::Error);
    // The other domains were still analyzed.
    assert!(final_state.domains_completed.len() >= 5);
}
