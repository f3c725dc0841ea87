//! Ports to external collaborators.
//!
//! The orchestrator core never talks to a database, a tool, an agent, or a
//! language model directly; everything goes through these traits. Every
//! call that leaves the process takes a deadline and observes cooperative
//! cancellation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use inquest_contracts::{
    AiDecision, CanonicalFinalOutcome, Domain, DomainFinding, InquestResult, InvestigationState,
    Message, MonitorFrame, ProgressUpdate,
};

use crate::graph::Node;

/// Result of one tool-invocation batch.
#[derive(Debug, Clone, Default)]
pub struct ToolBatch {
    pub tool_results: BTreeMap<String, serde_json::Value>,
    pub tools_used: Vec<String>,
}

/// One assistant turn during the fraud-investigation phase.
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    /// Message appended to the conversation. A `ToolUse` message carries
    /// the requested tool names as a JSON array in its content.
    pub message: Message,
    /// Initial-dataset update produced by this turn, if any.
    pub snowflake: Option<SnowflakeUpdate>,
}

/// Initial-dataset result attached to an assistant turn.
#[derive(Debug, Clone)]
pub struct SnowflakeUpdate {
    pub data: serde_json::Value,
    pub quality: f64,
}

/// External initialization of a new investigation.
///
/// Both results are JSON objects merged field-by-field into the state,
/// subject to the protected-field rule.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn start_investigation(
        &self,
        snapshot: &InvestigationState,
    ) -> InquestResult<serde_json::Value>;

    /// Collects raw entity data; returned messages are appended.
    async fn raw_data(&self, snapshot: &InvestigationState) -> InquestResult<Vec<Message>>;
}

/// The investigation assistant driving data collection and tool selection.
#[async_trait]
pub trait InvestigationAssistant: Send + Sync {
    async fn step(
        &self,
        snapshot: &InvestigationState,
        deadline: Duration,
    ) -> InquestResult<AssistantTurn>;
}

/// Domain agent invocation. Must not mutate the snapshot.
#[async_trait]
pub trait DomainAgentRunner: Send + Sync {
    async fn run_agent(
        &self,
        domain: Domain,
        snapshot: &InvestigationState,
        deadline: Duration,
    ) -> InquestResult<DomainFinding>;
}

/// Tool invocation. Returns only when all requested tools complete or the
/// deadline fires.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke_tools(
        &self,
        requested: &[String],
        snapshot: &InvestigationState,
        deadline: Duration,
    ) -> InquestResult<ToolBatch>;
}

/// Confidence assessment. Implementations may use an LLM or pure
/// heuristics; provider failures surface as typed provider errors.
#[async_trait]
pub trait ConfidenceAssessor: Send + Sync {
    async fn assess(&self, snapshot: &InvestigationState) -> InquestResult<AiDecision>;
}

/// Checkpoint persistence. Implementations must be atomic per call.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(
        &self,
        investigation_id: &str,
        node: Node,
        state: &InvestigationState,
    ) -> InquestResult<()>;

    async fn load_latest(
        &self,
        investigation_id: &str,
    ) -> InquestResult<Option<(Node, InvestigationState)>>;
}

/// Terminal result persistence.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(
        &self,
        investigation_id: &str,
        outcome: &CanonicalFinalOutcome,
        raw_state: Option<&InvestigationState>,
    ) -> InquestResult<()>;

    async fn update_progress(
        &self,
        investigation_id: &str,
        progress: &ProgressUpdate,
    ) -> InquestResult<()>;

    async fn store_transaction_scores(
        &self,
        investigation_id: &str,
        scores: &BTreeMap<String, f64>,
    ) -> InquestResult<()>;
}

/// Observer channel for per-investigation monitor frames.
#[async_trait]
pub trait MonitorSink: Send + Sync {
    async fn emit(&self, frame: MonitorFrame);
}

/// In-memory checkpointer keeping the full checkpoint history per
/// investigation. Saves are atomic under a single lock.
#[derive(Default)]
pub struct MemoryCheckpointer {
    checkpoints: Mutex<BTreeMap<String, Vec<(Node, String)>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints saved for an investigation.
    pub fn count(&self, investigation_id: &str) -> usize {
        self.checkpoints
            .lock()
            .get(investigation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Full checkpoint history, oldest first.
    pub fn history(&self, investigation_id: &str) -> Vec<(Node, InvestigationState)> {
        self.checkpoints
            .lock()
            .get(investigation_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(node, encoded)| {
                        serde_json::from_str(encoded).ok().map(|state| (*node, state))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(
        &self,
        investigation_id: &str,
        node: Node,
        state: &InvestigationState,
    ) -> InquestResult<()> {
        let encoded = serde_json::to_string(state)
            .map_err(|e| inquest_contracts::InquestError::Checkpoint(e.to_string()))?;
        self.checkpoints
            .lock()
            .entry(investigation_id.to_string())
            .or_default()
            .push((node, encoded));
        Ok(())
    }

    async fn load_latest(
        &self,
        investigation_id: &str,
    ) -> InquestResult<Option<(Node, InvestigationState)>> {
        let checkpoints = self.checkpoints.lock();
        let Some(entries) = checkpoints.get(investigation_id) else {
            return Ok(None);
        };
        // Resume re-enters the last non-terminal node.
        let latest = entries
            .iter()
            .rev()
            .find(|(node, _)| !node.is_terminal())
            .or_else(|| entries.last());
        match latest {
            Some((node, encoded)) => {
                let state = serde_json::from_str(encoded)
                    .map_err(|e| inquest_contracts::InquestError::Checkpoint(e.to_string()))?;
                Ok(Some((*node, state)))
            }
            None => Ok(None),
        }
    }
}

/// Result sink that discards everything, for harness runs without storage.
#[derive(Default)]
pub struct NullResultSink;

#[async_trait]
impl ResultSink for NullResultSink {
    async fn persist(
        &self,
        _investigation_id: &str,
        _outcome: &CanonicalFinalOutcome,
        _raw_state: Option<&InvestigationState>,
    ) -> InquestResult<()> {
        Ok(())
    }

    async fn update_progress(
        &self,
        _investigation_id: &str,
        _progress: &ProgressUpdate,
    ) -> InquestResult<()> {
        Ok(())
    }

    async fn store_transaction_scores(
        &self,
        _investigation_id: &str,
        scores: &BTreeMap<String, f64>,
    ) -> InquestResult<()> {
        if !scores.is_empty() {
            warn!(count = scores.len(), "transaction scores discarded by null sink");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::test_seed;

    #[tokio::test]
    async fn memory_checkpointer_round_trips() {
        let cp = MemoryCheckpointer::new();
        let state = InvestigationState::create_initial(test_seed("inv-cp", 12));
        cp.save("inv-cp", Node::StartInvestigation, &state)
            .await
            .unwrap();
        cp.save("inv-cp", Node::RawData, &state).await.unwrap();

        let (node, loaded) = cp.load_latest("inv-cp").await.unwrap().unwrap();
        assert_eq!(node, Node::RawData);
        assert_eq!(loaded.investigation_id, "inv-cp");
        assert_eq!(cp.count("inv-cp"), 2);
    }

    #[tokio::test]
    async fn load_latest_skips_terminal_nodes() {
        let cp = MemoryCheckpointer::new();
        let state = InvestigationState::create_initial(test_seed("inv-term", 12));
        cp.save("inv-term", Node::HybridOrchestrator, &state)
            .await
            .unwrap();
        cp.save("inv-term", Node::Summary, &state).await.unwrap();

        let (node, _) = cp.load_latest("inv-term").await.unwrap().unwrap();
        assert_eq!(node, Node::HybridOrchestrator);
    }

    #[tokio::test]
    async fn missing_investigation_loads_none() {
        let cp = MemoryCheckpointer::new();
        assert!(cp.load_latest("absent").await.unwrap().is_none());
    }
}
