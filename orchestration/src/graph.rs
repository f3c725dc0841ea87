//! The investigation graph: a closed node set and a data edge table.
//!
//! Routing out of the orchestrator node is computed by the router; every
//! other transition is static data so the executor stays trivially
//! inspectable.

use inquest_contracts::{Domain, InvestigationState, MessageKind};

/// Nodes of the investigation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "node", content = "domain")]
pub enum Node {
    StartInvestigation,
    RawData,
    FraudInvestigation,
    Tools,
    AiConfidenceAssessment,
    SafetyValidation,
    HybridOrchestrator,
    Agent(Domain),
    Summary,
    Complete,
}

impl Node {
    pub fn name(&self) -> String {
        match self {
            Node::StartInvestigation => "start_investigation".into(),
            Node::RawData => "raw_data".into(),
            Node::FraudInvestigation => "fraud_investigation".into(),
            Node::Tools => "tools".into(),
            Node::AiConfidenceAssessment => "ai_confidence_assessment".into(),
            Node::SafetyValidation => "safety_validation".into(),
            Node::HybridOrchestrator => "hybrid_orchestrator".into(),
            Node::Agent(d) => format!("{}_agent", d.as_str()),
            Node::Summary => "summary".into(),
            Node::Complete => "complete".into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Summary | Node::Complete)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outgoing edge of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Unconditional transition.
    Direct(Node),
    /// `start_investigation` splits on whether raw data is still needed.
    RawDataRouting,
    /// `fraud_investigation` splits on whether the assistant requested tools.
    ToolsCondition,
    /// The orchestrator's next node comes from the routing decision.
    Router,
    /// End of the graph.
    End,
}

/// The static edge table.
pub fn edge_of(node: Node) -> Edge {
    match node {
        Node::StartInvestigation => Edge::RawDataRouting,
        Node::RawData => Edge::Direct(Node::FraudInvestigation),
        Node::FraudInvestigation => Edge::ToolsCondition,
        Node::Tools => Edge::Direct(Node::FraudInvestigation),
        Node::AiConfidenceAssessment => Edge::Direct(Node::SafetyValidation),
        Node::SafetyValidation => Edge::Direct(Node::HybridOrchestrator),
        Node::HybridOrchestrator => Edge::Router,
        Node::Agent(_) => Edge::Direct(Node::HybridOrchestrator),
        Node::Summary => Edge::Direct(Node::Complete),
        Node::Complete => Edge::End,
    }
}

/// Raw-data routing condition: collect raw data first unless the initial
/// dataset is already present.
pub fn raw_data_or_investigation(state: &InvestigationState) -> Node {
    if state.snowflake_data.is_none() && !state.snowflake_completed {
        Node::RawData
    } else {
        Node::FraudInvestigation
    }
}

/// Tools condition: the assistant's last message carrying tool calls routes
/// to tool execution, otherwise to confidence assessment.
pub fn tools_or_assessment(state: &InvestigationState) -> Node {
    match state.messages.last() {
        Some(m) if m.kind == MessageKind::ToolUse => Node::Tools,
        _ => Node::AiConfidenceAssessment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inquest_contracts::Message;

    #[test]
    fn every_agent_returns_to_orchestrator() {
        for domain in Domain::SEQUENTIAL_ORDER {
            assert_eq!(
                edge_of(Node::Agent(domain)),
                Edge::Direct(Node::HybridOrchestrator)
            );
        }
    }

    #[test]
    fn summary_flows_to_complete_and_ends() {
        assert_eq!(edge_of(Node::Summary), Edge::Direct(Node::Complete));
        assert_eq!(edge_of(Node::Complete), Edge::End);
    }

    #[test]
    fn node_names_are_stable() {
        assert_eq!(Node::Agent(Domain::Network).name(), "network_agent");
        assert_eq!(Node::HybridOrchestrator.name(), "hybrid_orchestrator");
    }

    #[test]
    fn tools_condition_follows_last_message_kind() {
        let seed = crate::testkit::test_seed("inv-t", 12);
        let mut state = InvestigationState::create_initial(seed);
        assert_eq!(tools_or_assessment(&state), Node::AiConfidenceAssessment);

        state.messages.push(Message::tool_use("[\"ip_reputation\"]"));
        assert_eq!(tools_or_assessment(&state), Node::Tools);

        state.messages.push(Message::tool_result("{}"));
        assert_eq!(tools_or_assessment(&state), Node::AiConfidenceAssessment);
    }
}
