//! Typed contracts for the hybrid investigation orchestrator.
//!
//! Everything that crosses a port boundary lives here: the investigation
//! state with its append-only sub-structures, AI decisions, safety
//! overrides, domain findings, the canonical final outcome, monitor
//! frames, and the error taxonomy.

pub mod error;
pub mod monitor;
pub mod outcome;
pub mod state;

pub use error::{
    AgentErrorCause, InquestError, InquestResult, ProviderErrorKind, TimeoutScope,
};
pub use monitor::{FrameKind, MonitorFrame};
pub use outcome::{
    AiIntelligenceMetrics, CanonicalFinalOutcome, EvidenceAssessment, EvidenceQualityLevel,
    FraudLikelihood, InvestigationStatus, OutcomePerformanceMetrics, ProgressUpdate,
    QualityAssurance, RiskAssessment,
};
pub use state::{
    AgentResult, AiDecision, AuditEntry, ConcernRecord, ConfidenceLevel, ConfidenceSample, Domain,
    DomainFinding, DynamicLimits, EntityType, ErrorRecord, FindingStatus, InvestigationState,
    Message, MessageKind, OverrideMetrics, Phase, RecommendedAction, ResourceImpact,
    RoutingRecord, SafetyConcernType, SafetyOverride, Severity, StateSeed, Strategy,
    PROTECTED_FIELDS,
};
