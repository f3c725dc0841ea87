//! Investigation state: the single typed record owned by the executor for
//! the lifetime of an investigation.
//!
//! All audit, confidence, and override collections are append-only buffers.
//! Scalar progress fields change only through the dedicated update
//! operations below; nodes never reach inside the record directly.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity kinds an investigation can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    IpAddress,
    UserId,
    DeviceId,
    TransactionId,
}

impl EntityType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ip_address" => Some(EntityType::IpAddress),
            "user_id" => Some(EntityType::UserId),
            "device_id" => Some(EntityType::DeviceId),
            "transaction_id" => Some(EntityType::TransactionId),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::IpAddress => "ip_address",
            EntityType::UserId => "user_id",
            EntityType::DeviceId => "device_id",
            EntityType::TransactionId => "transaction_id",
        }
    }
}

/// Lifecycle phases of an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    RawData,
    Investigation,
    DomainAnalysis,
    Summary,
    Complete,
    Error,
}

/// Coarse confidence buckets used for routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Unknown,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Unknown => "unknown",
        }
    }
}

/// Investigation execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Execute all domain agents sequentially.
    Comprehensive,
    /// Target specific domains based on evidence.
    Focused,
    /// Decide from intermediate findings.
    Adaptive,
    /// Direct to the most important analysis.
    CriticalPath,
    /// Risk assessment only.
    Minimal,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Comprehensive => "comprehensive",
            Strategy::Focused => "focused",
            Strategy::Adaptive => "adaptive",
            Strategy::CriticalPath => "critical_path",
            Strategy::Minimal => "minimal",
        }
    }
}

/// Safety concerns that can trigger overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyConcernType {
    LoopRisk,
    ResourcePressure,
    ConfidenceDrop,
    EvidenceInsufficient,
    TimeoutRisk,
}

impl SafetyConcernType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyConcernType::LoopRisk => "loop_risk",
            SafetyConcernType::ResourcePressure => "resource_pressure",
            SafetyConcernType::ConfidenceDrop => "confidence_drop",
            SafetyConcernType::EvidenceInsufficient => "evidence_insufficient",
            SafetyConcernType::TimeoutRisk => "timeout_risk",
        }
    }
}

/// Severity attached to a safety concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Analysis domains covered by the external agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Network,
    Device,
    Location,
    Logs,
    Authentication,
    Risk,
}

impl Domain {
    /// Fixed sequential execution order used by safety-first routing.
    pub const SEQUENTIAL_ORDER: [Domain; 6] = [
        Domain::Network,
        Domain::Device,
        Domain::Location,
        Domain::Logs,
        Domain::Authentication,
        Domain::Risk,
    ];

    /// The five evidence-bearing domains. Risk is an aggregation agent,
    /// not a domain finding source.
    pub const EVIDENCE_DOMAINS: [Domain; 5] = [
        Domain::Device,
        Domain::Network,
        Domain::Location,
        Domain::Logs,
        Domain::Authentication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Network => "network",
            Domain::Device => "device",
            Domain::Location => "location",
            Domain::Logs => "logs",
            Domain::Authentication => "authentication",
            Domain::Risk => "risk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim_end_matches("_agent") {
            "network" => Some(Domain::Network),
            "device" => Some(Domain::Device),
            "location" => Some(Domain::Location),
            "logs" => Some(Domain::Logs),
            "authentication" => Some(Domain::Authentication),
            "risk" => Some(Domain::Risk),
            _ => None,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conversation message kinds tracked for sequence integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    User,
    Assistant,
    ToolUse,
    ToolResult,
}

/// One entry in the investigation conversation.
///
/// Invariant: every `ToolUse` message is immediately followed by its
/// matching `ToolResult` entries before any assistant message of a
/// different kind appears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub kind: MessageKind,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: "system".into(),
            content: content.into(),
            kind: MessageKind::System,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: "assistant".into(),
            content: content.into(),
            kind: MessageKind::Assistant,
        }
    }

    pub fn tool_use(content: impl Into<String>) -> Self {
        Message {
            role: "assistant".into(),
            content: content.into(),
            kind: MessageKind::ToolUse,
        }
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Message {
            role: "tool".into(),
            content: content.into(),
            kind: MessageKind::ToolResult,
        }
    }
}

/// Status of a single domain finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "INSUFFICIENT_EVIDENCE")]
    InsufficientEvidence,
    #[serde(rename = "ERROR")]
    Error,
}

/// Per-domain result returned by an agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainFinding {
    pub risk_score: Option<f64>,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub summary: String,
    pub status: FindingStatus,
}

/// Raw agent output kept alongside findings so the finalizer can project
/// it back into `domain_findings` when a completion path skipped the
/// structured form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub risk_score: Option<f64>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub analysis: Vec<String>,
    pub summary: Option<String>,
}

/// Per-run limits derived from base limits, safety level, and strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicLimits {
    pub max_orchestrator_loops: u32,
    pub max_tool_executions: u32,
    pub max_domain_attempts: u32,
    pub max_investigation_time_minutes: u32,
    pub confidence_threshold_for_override: f64,
    pub resource_pressure_threshold: f64,
}

/// Recommended next action emitted by the confidence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "domain")]
pub enum RecommendedAction {
    SnowflakeAnalysis,
    Tools,
    Agent(Domain),
    Summary,
}

impl RecommendedAction {
    pub fn label(&self) -> String {
        match self {
            RecommendedAction::SnowflakeAnalysis => "snowflake_analysis".into(),
            RecommendedAction::Tools => "tools".into(),
            RecommendedAction::Agent(d) => format!("{}_agent", d.as_str()),
            RecommendedAction::Summary => "summary".into(),
        }
    }
}

/// Resource impact estimate attached to an AI decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceImpact {
    Low,
    Medium,
    High,
}

/// The assessor's structured output at a confidence checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDecision {
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub recommended_action: RecommendedAction,
    pub reasoning: Vec<String>,
    pub evidence_quality: f64,
    pub investigation_completeness: f64,
    pub strategy: Strategy,
    pub agents_to_activate: Vec<Domain>,
    pub tools_recommended: Vec<String>,
    pub required_safety_checks: Vec<String>,
    pub resource_impact: ResourceImpact,
    /// Minutes to completion, when the assessor can estimate it.
    pub estimated_completion_time: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub model_used: Option<String>,
    pub calculation_time_ms: Option<u64>,
}

/// One point in the confidence evolution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSample {
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub level: ConfidenceLevel,
    pub trigger: String,
    pub previous_confidence: Option<f64>,
    pub confidence_delta: f64,
}

/// Metrics captured at the moment a safety override was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideMetrics {
    pub orchestrator_loops: u32,
    pub tools_used: usize,
    pub ai_confidence: f64,
    pub investigation_completeness: f64,
}

/// Record of the safety manager overriding an AI decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyOverride {
    pub timestamp: DateTime<Utc>,
    pub original_ai_decision: String,
    pub safety_decision: String,
    pub concern_type: SafetyConcernType,
    pub reasoning: Vec<String>,
    pub metrics_at_override: OverrideMetrics,
}

/// An active safety concern recorded on the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcernRecord {
    pub timestamp: DateTime<Utc>,
    pub concern_type: SafetyConcernType,
    pub severity: Severity,
    pub message: String,
    pub resource_pressure: f64,
}

/// One entry in the decision audit trail. Never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub decision_type: String,
    pub details: serde_json::Value,
}

/// Routing decision as recorded on the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRecord {
    pub timestamp: DateTime<Utc>,
    pub decision: String,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub safety_override: bool,
}

/// Recoverable failure recorded on the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub message: String,
    pub recovery_action: Option<String>,
}

/// Fields that external initialization results must never overwrite.
pub const PROTECTED_FIELDS: [&str; 8] = [
    "decision_audit_trail",
    "ai_confidence",
    "ai_confidence_level",
    "investigation_strategy",
    "safety_overrides",
    "dynamic_limits",
    "performance_metrics",
    "system_version",
];

/// Inputs for constructing the initial state.
#[derive(Debug, Clone)]
pub struct StateSeed {
    pub investigation_id: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub parallel_execution: bool,
    pub max_tools: u32,
    pub tool_count: u32,
    pub date_range_days: u32,
    pub custom_user_prompt: Option<String>,
    pub initial_strategy: Strategy,
    /// Forces a specific confidence level, for testing.
    pub force_confidence_level: Option<ConfidenceLevel>,
    pub dynamic_limits: DynamicLimits,
}

/// Complete per-investigation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationState {
    // Identity
    pub investigation_id: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_ms: Option<u64>,

    // Progress
    pub current_phase: Phase,
    pub orchestrator_loops: u32,
    pub domains_completed: BTreeSet<Domain>,
    pub tools_used: BTreeSet<String>,
    pub tool_execution_attempts: u32,
    pub snowflake_completed: bool,

    // Messages
    pub messages: Vec<Message>,

    // Evidence
    pub domain_findings: BTreeMap<Domain, DomainFinding>,
    pub agent_results: BTreeMap<Domain, AgentResult>,
    pub tool_results: BTreeMap<String, serde_json::Value>,
    pub snowflake_data: Option<serde_json::Value>,
    pub snowflake_quality: f64,
    pub tools_quality: f64,
    pub domains_quality: f64,

    // Risk
    pub risk_score: Option<f64>,
    pub confidence_score: f64,
    pub evidence_strength: f64,
    pub risk_factors: Vec<String>,
    pub risk_indicators: Vec<String>,
    pub transaction_scores: BTreeMap<String, f64>,

    // AI tracking
    pub ai_confidence: f64,
    pub ai_confidence_level: ConfidenceLevel,
    pub ai_decisions: Vec<AiDecision>,
    pub confidence_evolution: Vec<ConfidenceSample>,
    pub investigation_strategy: Strategy,
    pub strategy_reasoning: Vec<String>,
    pub planned_agent_sequence: Vec<Domain>,
    pub confidence_factors: BTreeMap<String, f64>,

    // Safety
    pub dynamic_limits: DynamicLimits,
    pub safety_overrides: Vec<SafetyOverride>,
    pub safety_concerns: Vec<ConcernRecord>,
    pub ai_override_reasons: Vec<String>,

    // Audit
    pub decision_audit_trail: Vec<AuditEntry>,
    pub routing_decisions: Vec<RoutingRecord>,
    pub routing_explanations: Vec<String>,
    pub errors: Vec<ErrorRecord>,

    // Performance
    pub performance_metrics: BTreeMap<String, f64>,
    pub investigation_efficiency: Option<f64>,
    pub quality_gates_passed: Vec<String>,

    // Config
    pub max_tools: u32,
    pub tool_count: u32,
    pub date_range_days: u32,
    pub parallel_execution: bool,
    pub custom_user_prompt: Option<String>,

    // System metadata
    pub system_version: String,
    pub graph_selection_reason: String,
    pub feature_flags_active: Vec<String>,
}

impl InvestigationState {
    /// Creates the initial state for a hybrid investigation.
    ///
    /// Confidence starts at 0.5 / `Unknown` unless a level is forced, the
    /// strategy defaults to adaptive, and a seeding AI decision pointing at
    /// the initial dataset collection is recorded together with the first
    /// audit entry. Confidence factors are pre-initialized to zero so they
    /// can be read before any node writes them.
    pub fn create_initial(seed: StateSeed) -> Self {
        let now = Utc::now();

        let (confidence, level) = match seed.force_confidence_level {
            Some(ConfidenceLevel::High) => (0.85, ConfidenceLevel::High),
            Some(ConfidenceLevel::Medium) => (0.6, ConfidenceLevel::Medium),
            Some(ConfidenceLevel::Low) => (0.3, ConfidenceLevel::Low),
            Some(ConfidenceLevel::Unknown) | None => (0.5, ConfidenceLevel::Unknown),
        };

        let initial_decision = AiDecision {
            confidence,
            confidence_level: level,
            recommended_action: RecommendedAction::SnowflakeAnalysis,
            reasoning: vec![
                "Initial investigation setup".into(),
                "Initial dataset collection provides essential context".into(),
            ],
            evidence_quality: 0.0,
            investigation_completeness: 0.0,
            strategy: seed.initial_strategy,
            agents_to_activate: Vec::new(),
            tools_recommended: Vec::new(),
            required_safety_checks: vec!["loop_prevention".into(), "resource_monitoring".into()],
            resource_impact: ResourceImpact::Low,
            estimated_completion_time: None,
            timestamp: now,
            model_used: None,
            calculation_time_ms: None,
        };

        let mut confidence_factors = BTreeMap::new();
        for key in [
            "evidence_quality",
            "pattern_recognition",
            "risk_indicators",
            "data_completeness",
        ] {
            confidence_factors.insert(key.to_string(), 0.0);
        }

        let mut performance_metrics = BTreeMap::new();
        performance_metrics.insert("investigation_velocity".into(), 0.0);
        performance_metrics.insert("resource_efficiency".into(), 1.0);

        let audit_details = serde_json::json!({
            "strategy": seed.initial_strategy.as_str(),
            "confidence": confidence,
            "limits": seed.dynamic_limits,
        });

        InvestigationState {
            investigation_id: seed.investigation_id,
            entity_id: seed.entity_id,
            entity_type: seed.entity_type,
            start_time: now,
            end_time: None,
            total_duration_ms: None,

            current_phase: Phase::Initialization,
            orchestrator_loops: 0,
            domains_completed: BTreeSet::new(),
            tools_used: BTreeSet::new(),
            tool_execution_attempts: 0,
            snowflake_completed: false,

            messages: Vec::new(),

            domain_findings: BTreeMap::new(),
            agent_results: BTreeMap::new(),
            tool_results: BTreeMap::new(),
            snowflake_data: None,
            snowflake_quality: 0.0,
            tools_quality: 0.0,
            domains_quality: 0.0,

            risk_score: None,
            confidence_score: 0.0,
            evidence_strength: 0.0,
            risk_factors: Vec::new(),
            risk_indicators: Vec::new(),
            transaction_scores: BTreeMap::new(),

            ai_confidence: confidence,
            ai_confidence_level: level,
            ai_decisions: vec![initial_decision],
            confidence_evolution: vec![ConfidenceSample {
                timestamp: now,
                confidence,
                level,
                trigger: "initial_state_creation".into(),
                previous_confidence: None,
                confidence_delta: 0.0,
            }],
            investigation_strategy: seed.initial_strategy,
            strategy_reasoning: vec![format!(
                "Initial strategy set to {}",
                seed.initial_strategy.as_str()
            )],
            planned_agent_sequence: Vec::new(),
            confidence_factors,

            dynamic_limits: seed.dynamic_limits,
            safety_overrides: Vec::new(),
            safety_concerns: Vec::new(),
            ai_override_reasons: Vec::new(),

            decision_audit_trail: vec![AuditEntry {
                timestamp: now,
                decision_type: "initial_state_creation".into(),
                details: audit_details,
            }],
            routing_decisions: Vec::new(),
            routing_explanations: vec!["Investigation initialized with hybrid intelligence".into()],
            errors: Vec::new(),

            performance_metrics,
            investigation_efficiency: None,
            quality_gates_passed: vec!["initial_state_validation".into()],

            max_tools: seed.max_tools,
            tool_count: seed.tool_count,
            date_range_days: seed.date_range_days,
            parallel_execution: seed.parallel_execution,
            custom_user_prompt: seed.custom_user_prompt,

            system_version: "1.0.0".into(),
            graph_selection_reason: String::new(),
            feature_flags_active: Vec::new(),
        }
    }

    /// Applies a new confidence assessment.
    ///
    /// Appends the decision, an evolution sample with the delta against the
    /// previous confidence, an audit entry, and a routing explanation, then
    /// updates the scalar confidence fields and strategy.
    pub fn update_ai_confidence(&mut self, decision: AiDecision, trigger: &str) {
        let now = Utc::now();
        let previous = self.ai_confidence;

        self.confidence_evolution.push(ConfidenceSample {
            timestamp: now,
            confidence: decision.confidence,
            level: decision.confidence_level,
            trigger: trigger.to_string(),
            previous_confidence: Some(previous),
            confidence_delta: decision.confidence - previous,
        });

        self.decision_audit_trail.push(AuditEntry {
            timestamp: now,
            decision_type: "confidence_update".into(),
            details: serde_json::json!({
                "trigger": trigger,
                "new_confidence": decision.confidence,
                "recommended_action": decision.recommended_action.label(),
                "strategy": decision.strategy.as_str(),
                "reasoning": decision.reasoning,
            }),
        });

        self.routing_explanations.push(format!(
            "AI confidence updated to {:.2} ({}) - {}",
            decision.confidence,
            decision.confidence_level.as_str(),
            trigger
        ));

        self.ai_confidence = decision.confidence;
        self.ai_confidence_level = decision.confidence_level;
        if self.investigation_strategy != decision.strategy {
            self.strategy_reasoning.push(format!(
                "Strategy changed from {} to {} ({})",
                self.investigation_strategy.as_str(),
                decision.strategy.as_str(),
                trigger
            ));
            self.investigation_strategy = decision.strategy;
        }
        self.ai_decisions.push(decision);
    }

    /// Records the safety manager overriding an AI decision.
    pub fn add_safety_override(
        &mut self,
        original_ai_decision: &str,
        safety_decision: &str,
        concern_type: SafetyConcernType,
        reasoning: Vec<String>,
    ) {
        let now = Utc::now();
        let completeness = self
            .ai_decisions
            .last()
            .map(|d| d.investigation_completeness)
            .unwrap_or(0.0);

        self.safety_overrides.push(SafetyOverride {
            timestamp: now,
            original_ai_decision: original_ai_decision.to_string(),
            safety_decision: safety_decision.to_string(),
            concern_type,
            reasoning: reasoning.clone(),
            metrics_at_override: OverrideMetrics {
                orchestrator_loops: self.orchestrator_loops,
                tools_used: self.tools_used.len(),
                ai_confidence: self.ai_confidence,
                investigation_completeness: completeness,
            },
        });

        self.ai_override_reasons.push(format!(
            "{}: {}",
            concern_type.as_str(),
            reasoning.first().cloned().unwrap_or_else(|| "No reason provided".into())
        ));

        self.decision_audit_trail.push(AuditEntry {
            timestamp: now,
            decision_type: "safety_override".into(),
            details: serde_json::json!({
                "concern_type": concern_type.as_str(),
                "original_decision": original_ai_decision,
                "safety_decision": safety_decision,
                "reasoning": reasoning,
            }),
        });
    }

    /// Appends an audit entry.
    pub fn append_audit(&mut self, decision_type: &str, details: serde_json::Value) {
        self.decision_audit_trail.push(AuditEntry {
            timestamp: Utc::now(),
            decision_type: decision_type.to_string(),
            details,
        });
    }

    /// Records a recoverable error.
    pub fn record_error(&mut self, error_type: &str, message: &str, recovery_action: Option<&str>) {
        self.errors.push(ErrorRecord {
            timestamp: Utc::now(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            recovery_action: recovery_action.map(str::to_string),
        });
    }

    /// Records an active safety concern.
    pub fn record_concern(
        &mut self,
        concern_type: SafetyConcernType,
        severity: Severity,
        message: &str,
        resource_pressure: f64,
    ) {
        self.safety_concerns.push(ConcernRecord {
            timestamp: Utc::now(),
            concern_type,
            severity,
            message: message.to_string(),
            resource_pressure,
        });
    }

    /// Wall-clock minutes since the investigation started.
    pub fn elapsed_minutes(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 60_000.0
    }

    /// Total evidence items across structured findings and tool results.
    pub fn evidence_item_count(&self) -> usize {
        let finding_items: usize = self
            .domain_findings
            .values()
            .map(|f| f.evidence.len())
            .sum();
        finding_items + self.tool_results.len()
    }

    /// Domains with an OK structured finding.
    pub fn ok_findings(&self) -> impl Iterator<Item = (&Domain, &DomainFinding)> {
        self.domain_findings
            .iter()
            .filter(|(_, f)| f.status == FindingStatus::Ok)
    }
}
