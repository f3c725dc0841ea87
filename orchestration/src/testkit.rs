//! Mock ports for the scenario harness and tests.
//!
//! Every external collaborator has a deterministic stand-in here so full
//! investigations can run without a network, a warehouse, or a model
//! provider.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use inquest_contracts::{
    AiDecision, CanonicalFinalOutcome, ConfidenceLevel, Domain, DomainFinding, DynamicLimits,
    EntityType, FindingStatus, InquestError, InquestResult, InvestigationState, Message,
    ProgressUpdate, RecommendedAction, ResourceImpact, StateSeed, Strategy,
};

use crate::ports::{
    AssistantTurn, Bootstrapper, ConfidenceAssessor, DomainAgentRunner, InvestigationAssistant,
    ResultSink, SnowflakeUpdate, ToolBatch, ToolInvoker,
};

/// State seed with mock-grade limits and an adjustable loop budget.
pub fn test_seed(investigation_id: &str, max_loops: u32) -> StateSeed {
    StateSeed {
        investigation_id: investigation_id.to_string(),
        entity_id: "203.0.113.7".to_string(),
        entity_type: EntityType::IpAddress,
        parallel_execution: true,
        max_tools: 52,
        tool_count: 5,
        date_range_days: 7,
        custom_user_prompt: None,
        initial_strategy: Strategy::Adaptive,
        force_confidence_level: None,
        dynamic_limits: DynamicLimits {
            max_orchestrator_loops: max_loops,
            max_tool_executions: 8,
            max_domain_attempts: 6,
            max_investigation_time_minutes: 10,
            confidence_threshold_for_override: 0.3,
            resource_pressure_threshold: 0.8,
        },
    }
}

/// Decision with sensible defaults for scripting assessors.
pub fn make_decision(
    confidence: f64,
    level: ConfidenceLevel,
    strategy: Strategy,
    action: RecommendedAction,
) -> AiDecision {
    AiDecision {
        confidence,
        confidence_level: level,
        recommended_action: action,
        reasoning: vec!["scripted assessment".into()],
        evidence_quality: confidence,
        investigation_completeness: 0.0,
        strategy,
        agents_to_activate: Vec::new(),
        tools_recommended: Vec::new(),
        required_safety_checks: vec!["loop_prevention".into()],
        resource_impact: ResourceImpact::Low,
        estimated_completion_time: None,
        timestamp: Utc::now(),
        model_used: None,
        calculation_time_ms: None,
    }
}

/// Bootstrapper returning a fixed initialization object and raw-data
/// messages.
pub struct MockBootstrapper {
    pub init_result: serde_json::Value,
    pub raw_messages: Vec<Message>,
}

impl Default for MockBootstrapper {
    fn default() -> Self {
        MockBootstrapper {
            init_result: serde_json::json!({}),
            raw_messages: vec![Message::system(
                "Fraud investigation context: entity activity collected for review.",
            )],
        }
    }
}

#[async_trait]
impl Bootstrapper for MockBootstrapper {
    async fn start_investigation(
        &self,
        _snapshot: &InvestigationState,
    ) -> InquestResult<serde_json::Value> {
        Ok(self.init_result.clone())
    }

    async fn raw_data(&self, _snapshot: &InvestigationState) -> InquestResult<Vec<Message>> {
        Ok(self.raw_messages.clone())
    }
}

/// Assistant with three scripted behaviors: produce the initial dataset on
/// the first pass, optionally request tools once, then idle.
pub struct MockAssistant {
    pub snowflake_data: serde_json::Value,
    pub snowflake_quality: f64,
    /// Tools requested once after the dataset is in, when non-empty.
    pub tools_to_request: Vec<String>,
}

impl Default for MockAssistant {
    fn default() -> Self {
        MockAssistant {
            snowflake_data: serde_json::json!({
                "transactions": 42,
                "distinct_devices": 3,
                "distinct_locations": 2,
                "login_failures": 7,
                "chargebacks": 1,
            }),
            snowflake_quality: 0.85,
            tools_to_request: vec!["ip_reputation".into(), "geo_velocity_check".into()],
        }
    }
}

#[async_trait]
impl InvestigationAssistant for MockAssistant {
    async fn step(
        &self,
        snapshot: &InvestigationState,
        _deadline: Duration,
    ) -> InquestResult<AssistantTurn> {
        if snapshot.snowflake_data.is_none() {
            return Ok(AssistantTurn {
                message: Message::assistant("Initial dataset collected and summarized."),
                snowflake: Some(SnowflakeUpdate {
                    data: self.snowflake_data.clone(),
                    quality: self.snowflake_quality,
                }),
            });
        }
        if snapshot.tool_results.is_empty() && !self.tools_to_request.is_empty() {
            let payload = serde_json::to_string(&self.tools_to_request)
                .unwrap_or_else(|_| "[]".to_string());
            return Ok(AssistantTurn {
                message: Message::tool_use(payload),
                snowflake: None,
            });
        }
        Ok(AssistantTurn {
            message: Message::assistant("Continuing analysis with available evidence."),
            snowflake: None,
        })
    }
}

/// Agent runner serving per-domain findings with an optional failing
/// domain.
pub struct MockAgentRunner {
    pub findings: BTreeMap<Domain, DomainFinding>,
    pub default_finding: DomainFinding,
    pub failing_domain: Option<Domain>,
}

impl MockAgentRunner {
    /// Same finding for every domain.
    pub fn uniform(finding: DomainFinding) -> Self {
        MockAgentRunner {
            findings: BTreeMap::new(),
            default_finding: finding,
            failing_domain: None,
        }
    }

    pub fn healthy() -> Self {
        Self::uniform(DomainFinding {
            risk_score: Some(0.72),
            confidence: 0.8,
            evidence: vec![
                "velocity anomaly across sessions".into(),
                "device fingerprint reuse".into(),
            ],
            summary: "Elevated risk signals for the entity".into(),
            status: FindingStatus::Ok,
        })
    }

    pub fn insufficient() -> Self {
        Self::uniform(DomainFinding {
            risk_score: None,
            confidence: 0.1,
            evidence: Vec::new(),
            summary: "Not enough data to assess the domain".into(),
            status: FindingStatus::InsufficientEvidence,
        })
    }
}

#[async_trait]
impl DomainAgentRunner for MockAgentRunner {
    async fn run_agent(
        &self,
        domain: Domain,
        _snapshot: &InvestigationState,
        _deadline: Duration,
    ) -> InquestResult<DomainFinding> {
        if self.failing_domain == Some(domain) {
            return Err(InquestError::Agent {
                domain,
                cause: inquest_contracts::AgentErrorCause::ProviderError,
                message: "scripted agent failure".into(),
            });
        }
        Ok(self
            .findings
            .get(&domain)
            .cloned()
            .unwrap_or_else(|| self.default_finding.clone()))
    }
}

/// Tool invoker returning one synthetic result per requested tool.
#[derive(Default)]
pub struct MockToolInvoker {
    pub failing_tool: Option<String>,
}

#[async_trait]
impl ToolInvoker for MockToolInvoker {
    async fn invoke_tools(
        &self,
        requested: &[String],
        _snapshot: &InvestigationState,
        _deadline: Duration,
    ) -> InquestResult<ToolBatch> {
        if let Some(failing) = &self.failing_tool {
            if requested.iter().any(|t| t == failing) {
                return Err(InquestError::Tool {
                    tool: failing.clone(),
                    message: "scripted tool failure".into(),
                });
            }
        }
        let mut batch = ToolBatch::default();
        for tool in requested {
            batch
                .tool_results
                .insert(tool.clone(), serde_json::json!({"tool": tool, "score": 0.6}));
            batch.tools_used.push(tool.clone());
        }
        Ok(batch)
    }
}

type AssessFn =
    Box<dyn Fn(u32, &InvestigationState) -> InquestResult<AiDecision> + Send + Sync>;

/// Assessor driven by a closure receiving the call index (1-based).
pub struct FnAssessor {
    calls: AtomicU32,
    assess: AssessFn,
}

impl FnAssessor {
    pub fn new(
        assess: impl Fn(u32, &InvestigationState) -> InquestResult<AiDecision> + Send + Sync + 'static,
    ) -> Self {
        FnAssessor {
            calls: AtomicU32::new(0),
            assess: Box::new(assess),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfidenceAssessor for FnAssessor {
    async fn assess(&self, snapshot: &InvestigationState) -> InquestResult<AiDecision> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.assess)(call, snapshot)
    }
}

/// Recommendation mirroring the safety-first sequential ladder, for
/// assessors that should agree with conservative routing.
pub fn sequential_recommendation(snapshot: &InvestigationState) -> RecommendedAction {
    if !snapshot.snowflake_completed {
        return RecommendedAction::SnowflakeAnalysis;
    }
    if snapshot.tool_results.is_empty() {
        return RecommendedAction::Tools;
    }
    if snapshot.domain_findings.len() < 5 {
        for domain in Domain::SEQUENTIAL_ORDER {
            if !snapshot.domains_completed.contains(&domain)
                && !snapshot.domain_findings.contains_key(&domain)
            {
                return RecommendedAction::Agent(domain);
            }
        }
    }
    RecommendedAction::Summary
}

/// Result sink recording everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub outcomes: Mutex<Vec<CanonicalFinalOutcome>>,
    pub states: Mutex<Vec<InvestigationState>>,
    pub progress: Mutex<Vec<ProgressUpdate>>,
    pub transaction_scores: Mutex<Vec<BTreeMap<String, f64>>>,
}

impl RecordingSink {
    pub fn last_outcome(&self) -> Option<CanonicalFinalOutcome> {
        self.outcomes.lock().last().cloned()
    }

    pub fn last_state(&self) -> Option<InvestigationState> {
        self.states.lock().last().cloned()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn persist(
        &self,
        _investigation_id: &str,
        outcome: &CanonicalFinalOutcome,
        raw_state: Option<&InvestigationState>,
    ) -> InquestResult<()> {
        self.outcomes.lock().push(outcome.clone());
        if let Some(state) = raw_state {
            self.states.lock().push(state.clone());
        }
        Ok(())
    }

    async fn update_progress(
        &self,
        _investigation_id: &str,
        progress: &ProgressUpdate,
    ) -> InquestResult<()> {
        self.progress.lock().push(progress.clone());
        Ok(())
    }

    async fn store_transaction_scores(
        &self,
        _investigation_id: &str,
        scores: &BTreeMap<String, f64>,
    ) -> InquestResult<()> {
        self.transaction_scores.lock().push(scores.clone());
        Ok(())
    }
}
