//! Graph executor: drives nodes to completion under a checkpointed state
//! machine.
//!
//! The loop is explicit: check cancellation, run the current node, merge
//! its effects, persist a checkpoint, compute the next node from the edge
//! table or the router's decision. Recoverable failures fall back to the
//! summary path; provider errors propagate untouched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use inquest_config::{recursion_base, EvidenceConfig, Mode};
use inquest_contracts::{
    AgentResult, Domain, DomainFinding, FindingStatus, FrameKind, InquestError, InquestResult,
    InvestigationState, Message, MonitorFrame, Phase, ProgressUpdate, RoutingRecord,
    SafetyConcernType, Severity, TimeoutScope, PROTECTED_FIELDS,
};

use crate::confidence::ConfidenceEngine;
use crate::context;
use crate::evidence::{apply_evidence_gating, finalize_risk, GatingResult};
use crate::graph::{edge_of, raw_data_or_investigation, tools_or_assessment, Edge, Node};
use crate::outcome::OutcomeBuilder;
use crate::ports::{
    Bootstrapper, Checkpointer, ConfidenceAssessor, DomainAgentRunner, InvestigationAssistant,
    MonitorSink, ResultSink, ToolInvoker,
};
use crate::router;
use crate::safety::SafetyManager;
use inquest_resilience::{retry, RetryConfig};

const DEFAULT_COMPLETION_REASON: &str = "Investigation completed successfully";
const ERROR_COMPLETION_REASON: &str = "Investigation completed with processing errors";

/// External collaborators wired into the executor.
pub struct ExecutorPorts {
    pub bootstrapper: Arc<dyn Bootstrapper>,
    pub assistant: Arc<dyn InvestigationAssistant>,
    pub agents: Arc<dyn DomainAgentRunner>,
    pub tools: Arc<dyn ToolInvoker>,
    pub assessor: Arc<dyn ConfidenceAssessor>,
    pub checkpointer: Arc<dyn Checkpointer>,
    pub sink: Arc<dyn ResultSink>,
    pub monitor: Option<Arc<dyn MonitorSink>>,
}

/// Per-run bookkeeping threaded through the loop.
struct RunContext {
    routed: Option<Node>,
    outcome: Option<inquest_contracts::CanonicalFinalOutcome>,
    completion_reason: String,
    steps: u32,
}

impl RunContext {
    fn new() -> Self {
        RunContext {
            routed: None,
            outcome: None,
            completion_reason: DEFAULT_COMPLETION_REASON.to_string(),
            steps: 0,
        }
    }

    fn note_error(&mut self) {
        if self.completion_reason == DEFAULT_COMPLETION_REASON {
            self.completion_reason = ERROR_COMPLETION_REASON.to_string();
        }
    }
}

/// The hybrid investigation executor.
pub struct GraphExecutor {
    mode: Mode,
    evidence: EvidenceConfig,
    safety: SafetyManager,
    outcome_builder: OutcomeBuilder,
    ports: ExecutorPorts,
    cancel: CancellationToken,
    checkpoint_retry: RetryConfig,
}

impl GraphExecutor {
    pub fn new(mode: Mode, evidence: EvidenceConfig, ports: ExecutorPorts) -> Self {
        GraphExecutor {
            mode,
            safety: SafetyManager::new(mode, evidence.clone()),
            outcome_builder: OutcomeBuilder::new(evidence.clone()),
            evidence,
            ports,
            cancel: CancellationToken::new(),
            checkpoint_retry: RetryConfig::default(),
        }
    }

    /// Token observed between nodes; cancel it to terminate cooperatively.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs an investigation from its initial state to completion.
    pub async fn run(
        &self,
        state: InvestigationState,
    ) -> InquestResult<inquest_contracts::CanonicalFinalOutcome> {
        info!(
            investigation_id = %state.investigation_id,
            entity_id = %state.entity_id,
            "investigation starting"
        );
        self.drive(state, Node::StartInvestigation).await
    }

    /// Resumes an investigation from its last checkpoint.
    pub async fn resume(
        &self,
        investigation_id: &str,
    ) -> InquestResult<inquest_contracts::CanonicalFinalOutcome> {
        let (node, state) = self
            .ports
            .checkpointer
            .load_latest(investigation_id)
            .await?
            .ok_or_else(|| {
                InquestError::Checkpoint(format!(
                    "no checkpoint for investigation {}",
                    investigation_id
                ))
            })?;
        info!(investigation_id, node = %node, "resuming from checkpoint");
        self.drive(state, node).await
    }

    async fn drive(
        &self,
        mut state: InvestigationState,
        start_node: Node,
    ) -> InquestResult<inquest_contracts::CanonicalFinalOutcome> {
        let mut ctx = RunContext::new();
        let mut node = start_node;
        // Backstop for cycles that never pass the orchestrator. The
        // orchestrator enforces the unified loop limit itself.
        let step_backstop = recursion_base(self.mode) * 2;

        loop {
            if self.cancel.is_cancelled() && !node.is_terminal() {
                warn!(investigation_id = %state.investigation_id, "cancellation observed");
                state.record_concern(
                    SafetyConcernType::TimeoutRisk,
                    Severity::Critical,
                    "termination signal received",
                    0.0,
                );
                ctx.completion_reason =
                    "Investigation terminated by safety: cancellation requested".to_string();
                node = Node::Summary;
            }

            ctx.steps += 1;
            if ctx.steps > step_backstop && !node.is_terminal() {
                error!(
                    investigation_id = %state.investigation_id,
                    steps = ctx.steps,
                    "recursion backstop reached"
                );
                state.record_concern(
                    SafetyConcernType::LoopRisk,
                    Severity::Critical,
                    &format!("executor recursion backstop reached at {} steps", ctx.steps),
                    1.0,
                );
                ctx.completion_reason =
                    "Investigation terminated by safety: recursion limit reached".to_string();
                node = Node::Summary;
            }

            debug!(investigation_id = %state.investigation_id, node = %node, "executing node");
            match self.execute_node(node, &mut state, &mut ctx).await {
                Ok(()) => {}
                Err(err) if err.is_unrecoverable() => {
                    error!(
                        investigation_id = %state.investigation_id,
                        error = %err,
                        "unrecoverable provider error; surfacing"
                    );
                    state.current_phase = Phase::Error;
                    // Best-effort checkpoint so the failure is inspectable.
                    let _ = self.checkpoint(node, &state).await;
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        investigation_id = %state.investigation_id,
                        node = %node,
                        error = %err,
                        "node failed; falling back to summary"
                    );
                    state.record_error(err.kind_label(), &err.to_string(), Some("fallback_to_summary"));
                    if let InquestError::Timeout { .. } = &err {
                        state.record_concern(
                            SafetyConcernType::TimeoutRisk,
                            Severity::High,
                            &err.to_string(),
                            0.0,
                        );
                    }
                    ctx.note_error();
                    match node {
                        Node::Summary => {
                            // Summary itself failed; emit a minimal outcome.
                            state.messages.push(Message::assistant("Investigation completed"));
                            if state.end_time.is_none() {
                                state.end_time = Some(Utc::now());
                            }
                            ctx.outcome = Some(
                                self.outcome_builder
                                    .build(&state, ERROR_COMPLETION_REASON),
                            );
                        }
                        Node::Complete => {
                            // Persistence trouble is recorded; the outcome
                            // still exists for the caller.
                        }
                        _ => {
                            self.checkpoint(Node::Summary, &state).await?;
                            node = Node::Summary;
                            continue;
                        }
                    }
                }
            }

            if node == Node::Complete {
                self.checkpoint(Node::Complete, &state).await?;
                break;
            }
            // Checkpoints carry the node to enter next, so a resume
            // continues exactly where the run left off.
            let next = self.next_node(node, &state, &mut ctx);
            self.checkpoint(next, &state).await?;
            node = next;
        }

        let outcome = match ctx.outcome {
            Some(outcome) => outcome,
            // Only reachable when both summary and its fallback failed.
            None => self.outcome_builder.build(&state, ERROR_COMPLETION_REASON),
        };
        info!(
            investigation_id = %state.investigation_id,
            status = ?outcome.status,
            "investigation finished"
        );
        Ok(outcome)
    }

    fn next_node(&self, current: Node, state: &InvestigationState, ctx: &mut RunContext) -> Node {
        match edge_of(current) {
            Edge::Direct(next) => next,
            Edge::RawDataRouting => raw_data_or_investigation(state),
            Edge::ToolsCondition => tools_or_assessment(state),
            Edge::Router => ctx.routed.take().unwrap_or(Node::Summary),
            Edge::End => Node::Complete,
        }
    }

    async fn checkpoint(&self, node: Node, state: &InvestigationState) -> InquestResult<()> {
        let id = state.investigation_id.clone();
        retry(&self.checkpoint_retry, "checkpoint_save", || {
            self.ports.checkpointer.save(&id, node, state)
        })
        .await
        .map_err(|err| {
            error!(investigation_id = %id, error = %err, "checkpointing failed after retry");
            InquestError::Checkpoint(err.to_string())
        })
    }

    async fn execute_node(
        &self,
        node: Node,
        state: &mut InvestigationState,
        ctx: &mut RunContext,
    ) -> InquestResult<()> {
        match node {
            Node::StartInvestigation => self.start_investigation(state).await,
            Node::RawData => self.raw_data(state).await,
            Node::FraudInvestigation => self.fraud_investigation(state).await,
            Node::Tools => self.tools(state).await,
            Node::AiConfidenceAssessment => self.ai_confidence_assessment(state).await,
            Node::SafetyValidation => self.safety_validation(state).await,
            Node::HybridOrchestrator => self.hybrid_orchestrator(state, ctx).await,
            Node::Agent(domain) => self.domain_agent(domain, state).await,
            Node::Summary => self.summary(state, ctx).await,
            Node::Complete => self.complete(state, ctx).await,
        }
    }

    async fn start_investigation(&self, state: &mut InvestigationState) -> InquestResult<()> {
        let init = self.ports.bootstrapper.start_investigation(state).await?;
        merge_initialization(state, init);

        if state.graph_selection_reason.is_empty() {
            state.graph_selection_reason = "Hybrid investigation graph selected".to_string();
        }
        state.append_audit(
            "investigation_start",
            serde_json::json!({
                "system": "hybrid_investigation_graph",
                "version": state.system_version,
                "entity_type": state.entity_type.as_str(),
            }),
        );
        self.emit(
            state,
            FrameKind::Audit,
            serde_json::json!({"event": "investigation_start"}),
        )
        .await;
        Ok(())
    }

    async fn raw_data(&self, state: &mut InvestigationState) -> InquestResult<()> {
        state.current_phase = Phase::RawData;
        let messages = self.ports.bootstrapper.raw_data(state).await?;
        state.messages.extend(messages);

        let volume = state.messages.last().map(|m| m.content.len()).unwrap_or(0);
        let completeness = (volume as f64 / 500.0).min(1.0);
        state
            .confidence_factors
            .insert("data_completeness".to_string(), completeness);
        debug!(completeness, "raw data processed");
        Ok(())
    }

    async fn fraud_investigation(&self, state: &mut InvestigationState) -> InquestResult<()> {
        state.current_phase = Phase::Investigation;

        let guidance = context::guidance_context(state);
        context::inject_guidance(&mut state.messages, &guidance);

        let deadline = self.remaining_deadline(state);
        let turn = tokio::time::timeout(deadline, self.ports.assistant.step(state, deadline))
            .await
            .map_err(|_| InquestError::Timeout {
                scope: TimeoutScope::Investigation,
                message: "assistant step exceeded the investigation deadline".into(),
            })??;

        if let Some(update) = turn.snowflake {
            state.snowflake_data = Some(update.data);
            state.snowflake_quality = update.quality;
            state.snowflake_completed = true;
            debug!(quality = update.quality, "initial dataset recorded");
        }
        state.messages.push(turn.message);

        *state
            .performance_metrics
            .entry("investigation_velocity".to_string())
            .or_insert(0.0) += 0.1;
        Ok(())
    }

    async fn tools(&self, state: &mut InvestigationState) -> InquestResult<()> {
        let requested = requested_tools(state);
        state.tool_execution_attempts += 1;

        let deadline = self.remaining_deadline(state);
        let invocation =
            tokio::time::timeout(deadline, self.ports.tools.invoke_tools(&requested, state, deadline))
                .await;

        match invocation {
            Ok(Ok(batch)) => {
                let names: Vec<String> = batch.tool_results.keys().cloned().collect();
                state
                    .messages
                    .push(Message::tool_result(serde_json::json!(names).to_string()));
                for (name, value) in batch.tool_results {
                    state.tool_results.insert(name, value);
                }
                for tool in batch.tools_used {
                    state.tools_used.insert(tool);
                }
            }
            Ok(Err(err)) => {
                // A failed batch is recorded; the investigation continues.
                warn!(error = %err, "tool invocation failed");
                state.record_error(err.kind_label(), &err.to_string(), Some("continue_without_tools"));
                state
                    .messages
                    .push(Message::tool_result("{\"error\": \"tool invocation failed\"}"));
            }
            Err(_) => {
                warn!("tool invocation deadline exceeded; results discarded");
                state.record_error(
                    "timeout_error",
                    "tool invocation exceeded its deadline",
                    Some("continue_without_tools"),
                );
                state.record_concern(
                    SafetyConcernType::TimeoutRisk,
                    Severity::Medium,
                    "tool invocation exceeded its deadline",
                    0.0,
                );
                state
                    .messages
                    .push(Message::tool_result("{\"error\": \"tool invocation timed out\"}"));
            }
        }

        let efficiency =
            state.tool_results.len() as f64 / state.tools_used.len().max(1) as f64;
        state
            .performance_metrics
            .insert("tool_execution_efficiency".to_string(), efficiency);

        state.append_audit(
            "tool_execution",
            serde_json::json!({
                "tools_requested": requested,
                "execution_attempt": state.tool_execution_attempts,
                "results_obtained": state.tool_results.len(),
            }),
        );
        self.emit(
            state,
            FrameKind::ToolResult,
            serde_json::json!({
                "tools_used": state.tools_used.len(),
                "results": state.tool_results.len(),
            }),
        )
        .await;
        Ok(())
    }

    async fn ai_confidence_assessment(&self, state: &mut InvestigationState) -> InquestResult<()> {
        let deadline = self.remaining_deadline(state);
        let assessment =
            tokio::time::timeout(deadline, self.ports.assessor.assess(state)).await;

        let decision = match assessment {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) if err.is_unrecoverable() => return Err(err),
            Ok(Err(err)) => {
                warn!(error = %err, "confidence assessment failed; using fallback");
                state.record_error(err.kind_label(), &err.to_string(), Some("fallback_to_safety_mode"));
                ConfidenceEngine::fallback_decision(&err.to_string())
            }
            Err(_) => {
                warn!("confidence assessment deadline exceeded; using fallback");
                state.record_error(
                    "timeout_error",
                    "confidence assessment exceeded its deadline",
                    Some("fallback_to_safety_mode"),
                );
                state.record_concern(
                    SafetyConcernType::TimeoutRisk,
                    Severity::Medium,
                    "confidence assessment exceeded its deadline",
                    0.0,
                );
                ConfidenceEngine::fallback_decision("assessment deadline exceeded")
            }
        };

        let summary = serde_json::json!({
            "confidence": decision.confidence,
            "confidence_level": decision.confidence_level.as_str(),
            "strategy": decision.strategy.as_str(),
            "recommended_action": decision.recommended_action.label(),
        });
        state.update_ai_confidence(decision, "confidence_assessment");
        state.append_audit("confidence_assessment", summary);
        Ok(())
    }

    async fn safety_validation(&self, state: &mut InvestigationState) -> InquestResult<()> {
        let status = self.safety.validate(state);
        self.safety.apply_validation(state, &status);
        self.emit(
            state,
            FrameKind::Safety,
            serde_json::json!({
                "safety_level": status.safety_level.as_str(),
                "allows_ai_control": status.allows_ai_control,
                "resource_pressure": status.resource_pressure,
                "concerns": status.safety_concerns.len(),
            }),
        )
        .await;
        Ok(())
    }

    async fn hybrid_orchestrator(
        &self,
        state: &mut InvestigationState,
        ctx: &mut RunContext,
    ) -> InquestResult<()> {
        state.orchestrator_loops += 1;

        let decision = match state.ai_decisions.last() {
            Some(decision) => decision.clone(),
            None => ConfidenceEngine::fallback_decision("no assessment available"),
        };
        let status = self.safety.validate(state);
        if status.requires_immediate_termination {
            // Terminations bypass the validation node, so the concerns
            // driving them are recorded here.
            for concern in &status.safety_concerns {
                if concern.severity == Severity::Critical {
                    state.record_concern(
                        concern.concern_type,
                        concern.severity,
                        &concern.message,
                        status.resource_pressure,
                    );
                }
            }
        }
        let mut routing = router::decide(state, &decision, &status);

        // Unified recursion guard: the smaller of the recursion base and
        // the effective loop limit is the single termination threshold.
        let unified_limit = status
            .current_limits
            .max_orchestrator_loops
            .min(recursion_base(self.mode));
        if routing.next_node != Node::Summary && state.orchestrator_loops >= unified_limit {
            state.record_concern(
                SafetyConcernType::LoopRisk,
                Severity::Critical,
                &format!(
                    "orchestrator loop limit reached: {}/{}",
                    state.orchestrator_loops, unified_limit
                ),
                status.resource_pressure,
            );
            routing = router::RoutingDecision {
                next_node: Node::Summary,
                reasoning: vec![format!(
                    "Loop limit reached at {} loops; forcing summary",
                    state.orchestrator_loops
                )],
                safety_override: true,
                override_reason: Some("emergency_termination".to_string()),
                pending_override: Some(router::PendingOverride {
                    original: decision.recommended_action.label(),
                    chosen: Node::Summary.name(),
                    concern_type: SafetyConcernType::LoopRisk,
                    reasoning: vec!["orchestrator loop limit reached".to_string()],
                }),
            };
        }

        if routing.safety_override
            && routing.next_node == Node::Summary
            && routing.override_reason.as_deref() == Some("emergency_termination")
        {
            ctx.completion_reason = match status.critical_concern_type() {
                Some(SafetyConcernType::TimeoutRisk) => {
                    "Investigation timeout: time limit exceeded".to_string()
                }
                _ => "Investigation terminated by safety manager".to_string(),
            };
        }

        if let Some(pending) = routing.pending_override.take() {
            state.add_safety_override(
                &pending.original,
                &pending.chosen,
                pending.concern_type,
                pending.reasoning,
            );
        }

        state.routing_decisions.push(RoutingRecord {
            timestamp: Utc::now(),
            decision: routing.next_node.name(),
            confidence: decision.confidence,
            reasoning: routing.reasoning.clone(),
            safety_override: routing.safety_override,
        });
        state.append_audit(
            "hybrid_orchestration",
            serde_json::json!({
                "next_node": routing.next_node.name(),
                "safety_override": routing.safety_override,
                "override_reason": routing.override_reason,
                "reasoning": routing.reasoning,
                "loop": state.orchestrator_loops,
            }),
        );
        self.emit(
            state,
            FrameKind::Routing,
            serde_json::json!({
                "next_node": routing.next_node.name(),
                "safety_override": routing.safety_override,
                "loop": state.orchestrator_loops,
            }),
        )
        .await;

        info!(
            investigation_id = %state.investigation_id,
            next = %routing.next_node,
            loops = state.orchestrator_loops,
            safety_override = routing.safety_override,
            "orchestrator decision"
        );
        ctx.routed = Some(routing.next_node);
        Ok(())
    }

    async fn domain_agent(&self, domain: Domain, state: &mut InvestigationState) -> InquestResult<()> {
        state.current_phase = Phase::DomainAnalysis;
        let started = std::time::Instant::now();
        let deadline = self.remaining_deadline(state);

        let finding = match tokio::time::timeout(
            deadline,
            self.ports.agents.run_agent(domain, state, deadline),
        )
        .await
        {
            Ok(Ok(finding)) => finding,
            Ok(Err(err)) => {
                // The domain is marked errored and the investigation
                // continues with the remaining agents.
                warn!(domain = %domain, error = %err, "domain agent failed");
                state.record_error(err.kind_label(), &err.to_string(), Some("continue_with_next_domain"));
                error_finding(domain, &err.to_string())
            }
            Err(_) => {
                warn!(domain = %domain, "domain agent deadline exceeded");
                state.record_error(
                    "timeout_error",
                    &format!("{} agent exceeded its deadline", domain),
                    Some("continue_with_next_domain"),
                );
                state.record_concern(
                    SafetyConcernType::TimeoutRisk,
                    Severity::Medium,
                    &format!("{} agent exceeded its deadline", domain),
                    0.0,
                );
                error_finding(domain, "agent deadline exceeded")
            }
        };

        state.performance_metrics.insert(
            format!("{}_duration_ms", domain),
            started.elapsed().as_millis() as f64,
        );
        state
            .confidence_factors
            .insert(format!("{}_analysis", domain), finding.confidence);
        state.agent_results.insert(
            domain,
            AgentResult {
                risk_score: finding.risk_score,
                confidence: Some(finding.confidence),
                evidence: finding.evidence.clone(),
                indicators: Vec::new(),
                analysis: Vec::new(),
                summary: Some(finding.summary.clone()),
            },
        );
        let findings_available = finding.status == FindingStatus::Ok;
        state.domain_findings.insert(domain, finding);
        state.domains_completed.insert(domain);

        state.append_audit(
            "domain_completion",
            serde_json::json!({
                "domain": domain.as_str(),
                "findings_available": findings_available,
                "total_domains_completed": state.domains_completed.len(),
            }),
        );
        self.emit(
            state,
            FrameKind::AgentResult,
            serde_json::json!({
                "domain": domain.as_str(),
                "status": findings_available,
                "domains_completed": state.domains_completed.len(),
            }),
        )
        .await;
        Ok(())
    }

    async fn summary(&self, state: &mut InvestigationState, ctx: &mut RunContext) -> InquestResult<()> {
        state.current_phase = Phase::Summary;

        consolidate_source_qualities(state);
        if apply_evidence_gating(state, &self.evidence) == GatingResult::Passed {
            state.quality_gates_passed.push("evidence_validation".to_string());
            finalize_risk(state, &self.evidence);
        }
        finalize_efficiency(state);

        if state.end_time.is_none() {
            state.end_time = Some(Utc::now());
        }
        if let Some(end) = state.end_time {
            state.total_duration_ms =
                Some((end - state.start_time).num_milliseconds().max(0) as u64);
        }

        state.append_audit(
            "investigation_summary",
            serde_json::json!({
                "total_duration_ms": state.total_duration_ms,
                "orchestrator_loops": state.orchestrator_loops,
                "domains_completed": state.domains_completed.len(),
                "tools_used": state.tools_used.len(),
                "safety_overrides": state.safety_overrides.len(),
                "final_confidence": state.ai_confidence,
            }),
        );

        // Status derivation distinguishes a finished investigation from one
        // that died mid-summary, so the phase advances before building.
        state.current_phase = Phase::Complete;
        let outcome = self.outcome_builder.build(state, &ctx.completion_reason);
        state
            .messages
            .push(Message::assistant(outcome.summary_text.clone()));
        ctx.outcome = Some(outcome);
        Ok(())
    }

    async fn complete(&self, state: &mut InvestigationState, ctx: &mut RunContext) -> InquestResult<()> {
        state.current_phase = Phase::Complete;
        if state.end_time.is_none() {
            state.end_time = Some(Utc::now());
            state.total_duration_ms = Some(
                (state.end_time.unwrap() - state.start_time)
                    .num_milliseconds()
                    .max(0) as u64,
            );
        }

        let outcome = match &ctx.outcome {
            Some(outcome) => outcome.clone(),
            None => {
                let outcome = self.outcome_builder.build(state, &ctx.completion_reason);
                ctx.outcome = Some(outcome.clone());
                outcome
            }
        };

        if let Err(err) = self
            .ports
            .sink
            .persist(&state.investigation_id, &outcome, Some(state))
            .await
        {
            warn!(error = %err, "result persistence failed");
            state.record_error(err.kind_label(), &err.to_string(), None);
        }

        let progress = ProgressUpdate {
            risk_score: state.risk_score,
            overall_risk_score: state.risk_score,
            status: format!("{:?}", outcome.status),
            current_phase: "complete".to_string(),
            progress_percentage: 100.0,
        };
        if let Err(err) = self
            .ports
            .sink
            .update_progress(&state.investigation_id, &progress)
            .await
        {
            warn!(error = %err, "progress update failed");
        }

        let (valid_scores, dropped) = filter_transaction_scores(state);
        if dropped > 0 {
            warn!(dropped, "excluded transaction scores outside [0, 1]");
        }
        if let Err(err) = self
            .ports
            .sink
            .store_transaction_scores(&state.investigation_id, &valid_scores)
            .await
        {
            warn!(error = %err, "transaction score persistence failed");
        }

        self.emit(
            state,
            FrameKind::Completion,
            serde_json::json!({
                "status": format!("{:?}", outcome.status),
                "risk_score": state.risk_score,
                "duration_ms": state.total_duration_ms,
            }),
        )
        .await;

        info!(
            investigation_id = %state.investigation_id,
            duration_ms = state.total_duration_ms,
            loops = state.orchestrator_loops,
            domains = state.domains_completed.len(),
            tools = state.tools_used.len(),
            overrides = state.safety_overrides.len(),
            "final investigation statistics"
        );
        Ok(())
    }

    /// Time budget remaining before the investigation limit, floored at
    /// one second so in-flight calls can finish reporting.
    fn remaining_deadline(&self, state: &InvestigationState) -> Duration {
        let limit = state.dynamic_limits.max_investigation_time_minutes as f64 * 60.0;
        let elapsed = state.elapsed_minutes() * 60.0;
        Duration::from_secs_f64((limit - elapsed).max(1.0))
    }

    async fn emit(&self, state: &InvestigationState, kind: FrameKind, payload: serde_json::Value) {
        if let Some(monitor) = &self.ports.monitor {
            monitor
                .emit(MonitorFrame::new(kind, &state.investigation_id, payload))
                .await;
        }
    }
}

/// Merges an external initialization object into the state, dropping
/// writes to protected fields.
fn merge_initialization(state: &mut InvestigationState, init: serde_json::Value) {
    let serde_json::Value::Object(map) = init else {
        return;
    };
    for (key, value) in map {
        if PROTECTED_FIELDS.contains(&key.as_str()) {
            warn!(field = %key, "initialization attempted to overwrite protected field; write dropped");
            state.record_error(
                "state_merge_error",
                &format!("write to protected field '{}' dropped", key),
                None,
            );
            continue;
        }
        match key.as_str() {
            "snowflake_data" => state.snowflake_data = Some(value),
            "snowflake_quality" => {
                if let Some(quality) = value.as_f64() {
                    state.snowflake_quality = quality;
                }
            }
            "snowflake_completed" => {
                if let Some(flag) = value.as_bool() {
                    state.snowflake_completed = flag;
                }
            }
            "risk_indicators" => {
                if let Ok(indicators) = serde_json::from_value::<Vec<String>>(value) {
                    state.risk_indicators.extend(indicators);
                }
            }
            "risk_factors" => {
                if let Ok(factors) = serde_json::from_value::<Vec<String>>(value) {
                    state.risk_factors.extend(factors);
                }
            }
            "transaction_scores" => {
                if let Ok(scores) =
                    serde_json::from_value::<std::collections::BTreeMap<String, f64>>(value)
                {
                    state.transaction_scores.extend(scores);
                }
            }
            "messages" => {
                if let Ok(messages) = serde_json::from_value::<Vec<Message>>(value) {
                    state.messages.extend(messages);
                }
            }
            other => debug!(field = other, "unrecognized initialization field ignored"),
        }
    }
}

/// Tool names from the last tool_use message, falling back to the latest
/// decision's recommendations.
fn requested_tools(state: &InvestigationState) -> Vec<String> {
    let from_message = state
        .messages
        .iter()
        .rev()
        .find(|m| m.kind == inquest_contracts::MessageKind::ToolUse)
        .and_then(|m| serde_json::from_str::<Vec<String>>(&m.content).ok());
    match from_message {
        Some(tools) if !tools.is_empty() => tools,
        _ => state
            .ai_decisions
            .last()
            .map(|d| d.tools_recommended.clone())
            .unwrap_or_default(),
    }
}

fn error_finding(domain: Domain, message: &str) -> DomainFinding {
    DomainFinding {
        risk_score: None,
        confidence: 0.0,
        evidence: Vec::new(),
        summary: format!("{} agent failed: {}", domain, message),
        status: FindingStatus::Error,
    }
}

/// Per-source quality figures used by the outcome builder.
fn consolidate_source_qualities(state: &mut InvestigationState) {
    let attempts = state
        .tools_used
        .len()
        .max(state.tool_execution_attempts as usize);
    state.tools_quality = if attempts == 0 {
        0.0
    } else {
        (state.tool_results.len() as f64 / attempts as f64).clamp(0.0, 1.0)
    };

    let confidences: Vec<f64> = state
        .ok_findings()
        .map(|(_, finding)| finding.confidence)
        .collect();
    state.domains_quality = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };
}

/// Multi-factor investigation efficiency: time, loops, coverage, safety.
fn finalize_efficiency(state: &mut InvestigationState) {
    let duration_ms = state
        .total_duration_ms
        .unwrap_or_else(|| (Utc::now() - state.start_time).num_milliseconds().max(0) as u64);

    let time_efficiency = if duration_ms > 0 {
        let ratio = duration_ms as f64 / 30_000.0;
        (1.0 / (1.0 + (ratio - 1.0).abs())).clamp(0.1, 1.0)
    } else {
        1.0
    };
    let loop_efficiency =
        (1.0 / (1.0 + (state.orchestrator_loops as f64 - 8.0).max(0.0))).clamp(0.1, 1.0);
    let coverage_efficiency = (state.domains_completed.len() as f64 / 6.0) * 0.7
        + (state.tools_used.len() as f64 / 5.0).min(1.0) * 0.3;
    let safety_efficiency = (1.0 - state.safety_overrides.len() as f64 * 0.2).max(0.5);

    let efficiency = (time_efficiency * 0.25
        + loop_efficiency * 0.25
        + coverage_efficiency * 0.25
        + safety_efficiency * 0.25)
        .clamp(0.0, 1.0);

    state
        .performance_metrics
        .insert("final_efficiency".to_string(), efficiency);
    state.investigation_efficiency = Some(efficiency);
}

/// Splits transaction scores into persistable values and a dropped count.
fn filter_transaction_scores(
    state: &InvestigationState,
) -> (std::collections::BTreeMap<String, f64>, usize) {
    let mut valid = std::collections::BTreeMap::new();
    let mut dropped = 0;
    for (tx_id, score) in &state.transaction_scores {
        if (0.0..=1.0).contains(score) {
            valid.insert(tx_id.clone(), *score);
        } else {
            dropped += 1;
        }
    }
    (valid, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::test_seed;

    #[test]
    fn protected_fields_are_dropped_on_merge() {
        let mut state = InvestigationState::create_initial(test_seed("inv-merge", 12));
        let audit_before = state.decision_audit_trail.len();
        let confidence_before = state.ai_confidence;

        merge_initialization(
            &mut state,
            serde_json::json!({
                "ai_confidence": 0.99,
                "decision_audit_trail": [],
                "snowflake_completed": true,
                "risk_indicators": ["device_spoof"],
            }),
        );

        assert_eq!(state.ai_confidence, confidence_before);
        assert_eq!(state.decision_audit_trail.len(), audit_before);
        assert!(state.snowflake_completed);
        assert_eq!(state.risk_indicators, vec!["device_spoof".to_string()]);
        // Each dropped write leaves an error record.
        assert_eq!(
            state
                .errors
                .iter()
                .filter(|e| e.error_type == "state_merge_error")
                .count(),
            2
        );
    }

    #[test]
    fn transaction_score_filter_drops_out_of_range() {
        let mut state = InvestigationState::create_initial(test_seed("inv-tx", 12));
        state.transaction_scores.insert("tx-1".into(), 0.5);
        state.transaction_scores.insert("tx-2".into(), 1.7);
        state.transaction_scores.insert("tx-3".into(), -0.1);
        state.transaction_scores.insert("tx-4".into(), 1.0);

        let (valid, dropped) = filter_transaction_scores(&state);
        assert_eq!(valid.len(), 2);
        assert_eq!(dropped, 2);
        assert!(valid.contains_key("tx-1"));
        assert!(valid.contains_key("tx-4"));
    }

    #[test]
    fn requested_tools_prefers_last_tool_use_message() {
        let mut state = InvestigationState::create_initial(test_seed("inv-req", 12));
        state
            .messages
            .push(Message::tool_use("[\"ip_reputation\",\"geo_velocity_check\"]"));
        assert_eq!(
            requested_tools(&state),
            vec!["ip_reputation".to_string(), "geo_velocity_check".to_string()]
        );
    }

    #[test]
    fn efficiency_penalizes_overrides_and_loops() {
        let mut state = InvestigationState::create_initial(test_seed("inv-eff", 12));
        state.total_duration_ms = Some(30_000);
        state.orchestrator_loops = 8;
        for domain in Domain::SEQUENTIAL_ORDER {
            state.domains_completed.insert(domain);
        }
        finalize_efficiency(&mut state);
        let clean = state.investigation_efficiency.unwrap();

        state.orchestrator_loops = 20;
        for _ in 0..3 {
            state.add_safety_override(
                "tools",
                "summary",
                SafetyConcernType::ResourcePressure,
                vec!["pressure".into()],
            );
        }
        finalize_efficiency(&mut state);
        let stressed = state.investigation_efficiency.unwrap();
        assert!(stressed < clean);
    }
}
