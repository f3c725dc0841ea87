//! Hybrid investigation orchestration core.
//!
//! Drives autonomous fraud investigations through a checkpointed state
//! machine: a confidence engine and safety manager feed an intelligent
//! router, the executor runs agents and tools through ports, evidence
//! gating decides whether a risk score may be emitted, and every
//! terminal path produces one canonical outcome.

pub mod confidence;
pub mod context;
pub mod evidence;
pub mod executor;
pub mod flags;
pub mod graph;
pub mod live_guard;
pub mod outcome;
pub mod ports;
pub mod router;
pub mod safety;
pub mod stream;
pub mod testkit;

pub use confidence::{ConfidenceEngine, ConfidenceWeights};
pub use evidence::{apply_evidence_gating, evidence_strength, finalize_risk, GatingResult};
pub use executor::{ExecutorPorts, GraphExecutor};
pub use flags::{
    graph_selector, init_graph_selector, rollout_hash, DeploymentMode, FeatureFlags, FlagState,
    GraphKind, GraphSelector, RollbackTriggers,
};
pub use graph::{edge_of, Edge, Node};
pub use live_guard::{
    CostSource, EmergencyStopReason, GuardStatus, LiveModeGuard, QuotaKind,
};
pub use outcome::OutcomeBuilder;
pub use ports::{
    AssistantTurn, Bootstrapper, Checkpointer, ConfidenceAssessor, DomainAgentRunner,
    InvestigationAssistant, MemoryCheckpointer, MonitorSink, NullResultSink, ResultSink,
    SnowflakeUpdate, ToolBatch, ToolInvoker,
};
pub use router::{decide, PendingOverride, RoutingDecision};
pub use safety::{RemainingResources, SafetyConcern, SafetyManager, SafetyStatus};
pub use stream::ChannelMonitor;
