//! Cross-cutting properties of the executor: monotonicity, resume,
//! message-sequence integrity, and transaction-score filtering.

use std::sync::Arc;

use inquest_config::{EvidenceConfig, Mode};
use inquest_contracts::{ConfidenceLevel, InvestigationState, Strategy};
use inquest_orchestration::context::validate_message_sequence;
use inquest_orchestration::testkit::{
    make_decision, sequential_recommendation, test_seed, FnAssessor, MockAgentRunner,
    MockAssistant, MockBootstrapper, MockToolInvoker, RecordingSink,
};
use inquest_orchestration::{ExecutorPorts, GraphExecutor, MemoryCheckpointer};

fn standard_executor(
    sink: Arc<RecordingSink>,
    checkpointer: Arc<MemoryCheckpointer>,
    bootstrapper: Arc<MockBootstrapper>,
) -> GraphExecutor {
    let assessor = Arc::new(FnAssessor::new(|_, snapshot: &InvestigationState| {
        Ok(make_decision(
            0.3,
            ConfidenceLevel::Low,
            Strategy::Adaptive,
            sequential_recommendation(snapshot),
        ))
    }));
    GraphExecutor::new(
        Mode::Mock,
        EvidenceConfig::default(),
        ExecutorPorts {
            bootstrapper,
            assistant: Arc::new(MockAssistant::default()),
            agents: Arc::new(MockAgentRunner::healthy()),
            tools: Arc::new(MockToolInvoker::default()),
            assessor,
            checkpointer,
            sink,
            monitor: None,
        },
    )
}

#[tokio::test]
async fn counters_and_append_only_lists_never_shrink() {
    let sink = Arc::new(RecordingSink::default());
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let executor = standard_executor(
        sink,
        checkpointer.clone(),
        Arc::new(MockBootstrapper::default()),
    );

    let state = InvestigationState::create_initial(test_seed("it-monotonic", 12));
    executor.run(state).await.unwrap();

    let history = checkpointer.history("it-monotonic");
    assert!(history.len() > 5, "expected a real node history");

    for window in history.windows(2) {
        let (_, before) = &window[0];
        let (_, after) = &window[1];
        assert!(after.orchestrator_loops >= before.orchestrator_loops);
        assert!(after.tool_execution_attempts >= before.tool_execution_attempts);
        assert!(after.ai_decisions.len() >= before.ai_decisions.len());
        assert!(after.confidence_evolution.len() >= before.confidence_evolution.len());
        assert!(after.safety_overrides.len() >= before.safety_overrides.len());
        assert!(after.routing_decisions.len() >= before.routing_decisions.len());
        assert!(after.decision_audit_trail.len() >= before.decision_audit_trail.len());
        assert!(after.errors.len() >= before.errors.len());
    }
}

#[tokio::test]
async fn one_decision_per_assessment_node_execution() {
    let sink = Arc::new(RecordingSink::default());
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let executor = standard_executor(
        sink.clone(),
        checkpointer.clone(),
        Arc::new(MockBootstrapper::default()),
    );

    let state = InvestigationState::create_initial(test_seed("it-one-decision", 12));
    executor.run(state).await.unwrap();

    let assessment_runs = checkpointer
        .history("it-one-decision")
        .iter()
        .filter(|(node, _)| node.name() == "ai_confidence_assessment")
        .count();
    let final_state = sink.last_state().unwrap();
    // The seeding decision plus exactly one per assessment execution.
    assert_eq!(final_state.ai_decisions.len(), assessment_runs + 1);
}

#[tokio::test]
async fn message_sequence_survives_guidance_injection() {
    let sink = Arc::new(RecordingSink::default());
    let executor = standard_executor(
        sink.clone(),
        Arc::new(MemoryCheckpointer::new()),
        Arc::new(MockBootstrapper::default()),
    );

    let state = InvestigationState::create_initial(test_seed("it-messages", 12));
    executor.run(state).await.unwrap();

    let final_state = sink.last_state().unwrap();
    assert!(
        validate_message_sequence(&final_state.messages),
        "tool_use/tool_result adjacency broken"
    );
    // Tools ran, so the sequence really contains tool messages.
    assert!(final_state
        .messages
        .iter()
        .any(|m| m.kind == inquest_contracts::MessageKind::ToolUse));
}

#[tokio::test]
async fn out_of_range_transaction_scores_are_filtered() {
    let bootstrapper = Arc::new(MockBootstrapper {
        init_result: serde_json::json!({
            "transaction_scores": {
                "tx-ok-low": 0.0,
                "tx-ok-high": 1.0,
                "tx-ok-mid": 0.42,
                "tx-bad-over": 1.5,
                "tx-bad-under": -0.2,
            },
        }),
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let executor = standard_executor(sink.clone(), Arc::new(MemoryCheckpointer::new()), bootstrapper);

    let state = InvestigationState::create_initial(test_seed("it-tx-scores", 12));
    executor.run(state).await.unwrap();

    let stored = sink.transaction_scores.lock();
    let scores = stored.last().unwrap();
    assert_eq!(scores.len(), 3);
    assert!(scores.values().all(|s| (0.0..=1.0).contains(s)));
    assert!(!scores.contains_key("tx-bad-over"));
    assert!(!scores.contains_key("tx-bad-under"));
}

#[tokio::test]
async fn protected_fields_survive_initialization_merge() {
    let bootstrapper = Arc::new(MockBootstrapper {
        init_result: serde_json::json!({
            "ai_confidence": 0.99,
            "investigation_strategy": "minimal",
            "snowflake_completed": true,
            "snowflake_data": {"transactions": 5},
        }),
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let executor = standard_executor(sink, checkpointer.clone(), bootstrapper);

    let state = InvestigationState::create_initial(test_seed("it-protected", 12));
    executor.run(state).await.unwrap();

    // The first checkpoint is the post-initialization state: protected
    // writes were dropped and recorded.
    let history = checkpointer.history("it-protected");
    let (_, after_start) = &history[0];
    assert_eq!(after_start.ai_confidence, 0.5);
    assert_eq!(after_start.investigation_strategy, Strategy::Adaptive);
    assert!(after_start.snowflake_completed);
    assert_eq!(
        after_start
            .errors
            .iter()
            .filter(|e| e.error_type == "state_merge_error")
            .count(),
        2
    );
}

#[tokio::test]
async fn resume_from_checkpoint_reaches_the_same_outcome() {
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let sink = Arc::new(RecordingSink::default());
    let executor = standard_executor(
        sink,
        checkpointer.clone(),
        Arc::new(MockBootstrapper::default()),
    );

    let state = InvestigationState::create_initial(test_seed("it-resume", 12));
    let first = executor.run(state).await.unwrap();

    // A second executor sharing the checkpointer resumes from the last
    // non-terminal node and must converge on the same result.
    let resume_sink = Arc::new(RecordingSink::default());
    let resumer = standard_executor(
        resume_sink,
        checkpointer.clone(),
        Arc::new(MockBootstrapper::default()),
    );
    let second = resumer.resume("it-resume").await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(
        first.risk_assessment.final_risk_score,
        second.risk_assessment.final_risk_score
    );
    assert_eq!(
        first.risk_assessment.fraud_likelihood,
        second.risk_assessment.fraud_likelihood
    );
    assert_eq!(first.investigation_id, second.investigation_id);
}

#[tokio::test]
async fn cancellation_routes_to_summary_with_an_outcome() {
    let sink = Arc::new(RecordingSink::default());
    let executor = standard_executor(
        sink.clone(),
        Arc::new(MemoryCheckpointer::new()),
        Arc::new(MockBootstrapper::default()),
    );
    // Cancel before the run even starts; the executor must still produce
    // a canonical outcome through the summary path.
    executor.cancellation_token().cancel();

    let state = InvestigationState::create_initial(test_seed("it-cancel", 12));
    let outcome = executor.run(state).await.unwrap();

    assert_eq!(
        outcome.status,
        inquest_contracts::InvestigationStatus::TerminatedBySafety
    );
    assert!(!outcome.completion_reason.is_empty());
    assert!(sink.last_state().is_some());
}
