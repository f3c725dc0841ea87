//! Intelligent router: merges the AI decision and the safety status into
//! the next-node choice.
//!
//! `decide` is a pure function of `(state, decision, safety)` so routing is
//! deterministic and testable in isolation. Deviations from the AI
//! recommendation are returned as a pending override for the orchestrator
//! node to record through the state operation.

use tracing::debug;

use inquest_contracts::{
    AiDecision, ConfidenceLevel, Domain, InvestigationState, SafetyConcernType, Severity, Strategy,
};

use crate::graph::Node;
use crate::safety::SafetyStatus;

/// A safety override the orchestrator node must record on the state.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOverride {
    pub original: String,
    pub chosen: String,
    pub concern_type: SafetyConcernType,
    pub reasoning: Vec<String>,
}

/// The router's output.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub next_node: Node,
    pub reasoning: Vec<String>,
    pub safety_override: bool,
    pub override_reason: Option<String>,
    pub pending_override: Option<PendingOverride>,
}

/// Computes the next node. Pure over its inputs.
pub fn decide(
    state: &InvestigationState,
    decision: &AiDecision,
    safety: &SafetyStatus,
) -> RoutingDecision {
    // Emergency termination dominates everything.
    if safety.requires_immediate_termination {
        let mut reasoning = vec!["Emergency termination required by safety manager".to_string()];
        reasoning.extend(safety.override_reasoning.clone());
        let concern_type = safety
            .critical_concern_type()
            .unwrap_or(SafetyConcernType::ResourcePressure);
        return with_override(
            state,
            decision,
            Node::Summary,
            reasoning,
            "emergency_termination",
            concern_type,
            safety,
        );
    }

    // AI keeps control when authorized and confident enough.
    if safety.allows_ai_control
        && matches!(
            decision.confidence_level,
            ConfidenceLevel::High | ConfidenceLevel::Medium
        )
    {
        let mut routed = route_by_strategy(state, decision);
        if decision.confidence_level == ConfidenceLevel::Medium
            && matches!(
                decision.strategy,
                Strategy::CriticalPath | Strategy::Minimal
            )
        {
            // Validation annotation only; the chosen node stands.
            routed
                .reasoning
                .push("Medium confidence validation applied".to_string());
        }
        routed
            .reasoning
            .push("AI control granted by safety validation".to_string());
        debug!(next = %routed.next_node, "router: AI-controlled transition");
        return routed;
    }

    // Safety-first sequential fallback. Critical concerns and exhausted
    // limits were already translated into termination above.
    let (next, mut reasoning) = sequential(state);
    reasoning.insert(0, "Safety-first routing applied".to_string());
    reasoning.extend(safety.override_reasoning.clone());
    let routed = with_override(
        state,
        decision,
        next,
        reasoning,
        "ai_control_denied",
        denial_concern(safety),
        safety,
    );
    debug!(next = %routed.next_node, "router: safety-first transition");
    routed
}

fn with_override(
    _state: &InvestigationState,
    decision: &AiDecision,
    next: Node,
    reasoning: Vec<String>,
    reason: &str,
    concern_type: SafetyConcernType,
    safety: &SafetyStatus,
) -> RoutingDecision {
    let recommended = decision.recommended_action.label();
    let pending = if recommended != next.name() {
        Some(PendingOverride {
            original: recommended,
            chosen: next.name(),
            concern_type,
            reasoning: if safety.override_reasoning.is_empty() {
                reasoning.clone()
            } else {
                safety.override_reasoning.clone()
            },
        })
    } else {
        None
    };
    RoutingDecision {
        next_node: next,
        reasoning,
        safety_override: true,
        override_reason: Some(reason.to_string()),
        pending_override: pending,
    }
}

/// Concern type matching the reason AI control was denied.
fn denial_concern(safety: &SafetyStatus) -> SafetyConcernType {
    if safety.resource_pressure >= safety.current_limits.resource_pressure_threshold {
        return SafetyConcernType::ResourcePressure;
    }
    for concern in &safety.safety_concerns {
        if matches!(concern.severity, Severity::Critical | Severity::High) {
            return concern.concern_type;
        }
    }
    safety
        .safety_concerns
        .first()
        .map(|c| c.concern_type)
        .unwrap_or(SafetyConcernType::ResourcePressure)
}

fn route_by_strategy(state: &InvestigationState, decision: &AiDecision) -> RoutingDecision {
    let (next, reasoning) = match decision.strategy {
        Strategy::CriticalPath => critical_path(state),
        Strategy::Minimal => minimal(state),
        Strategy::Focused => focused(state, decision),
        Strategy::Adaptive => adaptive(state, decision),
        Strategy::Comprehensive => {
            let (node, mut reasons) = sequential(state);
            reasons.insert(0, "Comprehensive strategy: full analysis required".to_string());
            (node, reasons)
        }
    };
    RoutingDecision {
        next_node: next,
        reasoning,
        safety_override: false,
        override_reason: None,
        pending_override: None,
    }
}

fn critical_path(state: &InvestigationState) -> (Node, Vec<String>) {
    if state.domains_completed.contains(&Domain::Risk) {
        (
            Node::Summary,
            vec!["Critical path complete".into(), "Risk assessment finished".into()],
        )
    } else {
        (
            Node::Agent(Domain::Risk),
            vec![
                "Critical path: direct to risk assessment".into(),
                "High confidence fraud indicators detected".into(),
            ],
        )
    }
}

fn minimal(state: &InvestigationState) -> (Node, Vec<String>) {
    if state.domains_completed.contains(&Domain::Risk) {
        (Node::Summary, vec!["Minimal investigation complete".into()])
    } else {
        (
            Node::Agent(Domain::Risk),
            vec![
                "Minimal strategy: risk assessment only".into(),
                "Low fraud indicators detected".into(),
            ],
        )
    }
}

fn focused(state: &InvestigationState, decision: &AiDecision) -> (Node, Vec<String>) {
    for domain in &decision.agents_to_activate {
        if !state.domains_completed.contains(domain) {
            return (
                Node::Agent(*domain),
                vec![format!("Focused strategy: {} analysis priority", domain)],
            );
        }
    }
    (
        Node::Summary,
        vec![
            "Focused investigation complete".into(),
            "Priority domains analyzed".into(),
        ],
    )
}

fn adaptive(state: &InvestigationState, decision: &AiDecision) -> (Node, Vec<String>) {
    if !state.snowflake_completed {
        return (
            Node::FraudInvestigation,
            vec!["Adaptive: complete initial dataset analysis first".into()],
        );
    }
    if state.tools_used.len() < 2 && !decision.tools_recommended.is_empty() {
        return (
            Node::Tools,
            vec![
                "Adaptive: additional tools recommended".into(),
                format!("Tools to use: {}", decision.tools_recommended.join(", ")),
            ],
        );
    }
    if state.domains_completed.len() < 3 {
        for domain in &decision.agents_to_activate {
            if !state.domains_completed.contains(domain) {
                return (
                    Node::Agent(*domain),
                    vec![format!("Adaptive: {} analysis recommended", domain)],
                );
            }
        }
        return next_sequential_domain(state);
    }
    (
        Node::Summary,
        vec![format!(
            "Adaptive investigation sufficient: {} domains completed",
            state.domains_completed.len()
        )],
    )
}

/// Standard sequential phases, for safety-first operation.
fn sequential(state: &InvestigationState) -> (Node, Vec<String>) {
    if !state.snowflake_completed {
        return (
            Node::FraudInvestigation,
            vec!["Initial dataset collection required".into()],
        );
    }
    if state.tool_results.is_empty() {
        return (
            Node::FraudInvestigation,
            vec!["Execute analysis tools with collected data".into()],
        );
    }
    if state.domain_findings.is_empty() {
        let (node, mut reasons) = next_sequential_domain(state);
        reasons.insert(0, "Start domain analysis with tool results".to_string());
        return (node, reasons);
    }
    if state.domain_findings.len() < 5 {
        let (node, reasons) = next_sequential_domain(state);
        if node != Node::Summary {
            return (node, reasons);
        }
    }
    (
        Node::Summary,
        vec![format!(
            "Sequential analysis complete: {} domains analyzed",
            state.domain_findings.len()
        )],
    )
}

/// Next uncompleted domain in the fixed order. Domains with findings count
/// as completed even when the completion set was not updated.
fn next_sequential_domain(state: &InvestigationState) -> (Node, Vec<String>) {
    for domain in Domain::SEQUENTIAL_ORDER {
        let completed = state.domains_completed.contains(&domain)
            || state.domain_findings.contains_key(&domain);
        if !completed {
            return (
                Node::Agent(domain),
                vec![format!("Sequential domain analysis: {}", domain)],
            );
        }
    }
    (
        Node::Summary,
        vec!["All domains completed sequentially".into()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceEngine;
    use crate::safety::SafetyManager;
    use crate::testkit::test_seed;
    use inquest_config::{EvidenceConfig, Mode};
    use inquest_contracts::{
        DomainFinding, FindingStatus, InvestigationState, RecommendedAction,
    };

    fn fixture() -> (InvestigationState, AiDecision, SafetyManager) {
        let state = InvestigationState::create_initial(test_seed("inv-router", 12));
        let decision = state.ai_decisions[0].clone();
        let manager = SafetyManager::new(Mode::Mock, EvidenceConfig::default());
        (state, decision, manager)
    }

    fn high_confidence(decision: &mut AiDecision) {
        decision.confidence = 0.9;
        decision.confidence_level = ConfidenceLevel::High;
    }

    #[test]
    fn termination_forces_summary_with_override() {
        let (mut state, mut decision, manager) = fixture();
        state.orchestrator_loops = 12;
        decision.recommended_action = RecommendedAction::Tools;
        let safety = manager.validate(&state);
        assert!(safety.requires_immediate_termination);

        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::Summary);
        assert!(routed.safety_override);
        let pending = routed.pending_override.expect("override recorded");
        assert_eq!(pending.original, "tools");
        assert_eq!(pending.chosen, "summary");
    }

    #[test]
    fn critical_path_goes_straight_to_risk_agent() {
        let (mut state, mut decision, manager) = fixture();
        state.snowflake_completed = true;
        high_confidence(&mut decision);
        decision.strategy = Strategy::CriticalPath;
        let safety = manager.validate(&state);
        assert!(safety.allows_ai_control);

        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::Agent(Domain::Risk));
        assert!(!routed.safety_override);

        state.domains_completed.insert(Domain::Risk);
        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::Summary);
    }

    #[test]
    fn adaptive_orders_snowflake_tools_domains_summary() {
        let (mut state, mut decision, manager) = fixture();
        high_confidence(&mut decision);
        decision.strategy = Strategy::Adaptive;
        decision.tools_recommended = vec!["ip_reputation".into()];
        decision.agents_to_activate = vec![Domain::Network, Domain::Device, Domain::Location];
        let safety = manager.validate(&state);

        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::FraudInvestigation);

        state.snowflake_completed = true;
        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::Tools);

        state.tools_used.insert("a".into());
        state.tools_used.insert("b".into());
        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::Agent(Domain::Network));

        for d in [Domain::Network, Domain::Device, Domain::Location] {
            state.domains_completed.insert(d);
        }
        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::Summary);
    }

    #[test]
    fn focused_walks_activation_list() {
        let (mut state, mut decision, manager) = fixture();
        state.snowflake_completed = true;
        high_confidence(&mut decision);
        decision.strategy = Strategy::Focused;
        decision.agents_to_activate = vec![Domain::Device, Domain::Logs];
        state.domains_completed.insert(Domain::Device);
        let safety = manager.validate(&state);

        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::Agent(Domain::Logs));
    }

    #[test]
    fn low_confidence_takes_sequential_path() {
        let (mut state, mut decision, manager) = fixture();
        decision.confidence = 0.2;
        decision.confidence_level = ConfidenceLevel::Low;
        decision.recommended_action = RecommendedAction::Tools;
        state.ai_confidence_level = ConfidenceLevel::Low;
        // Past warm-up with meaningful pressure so control is denied, but
        // under the strict-mode hard limits (8 loops, 6 tools).
        state.orchestrator_loops = 6;
        state.tool_execution_attempts = 5;
        for t in ["t1", "t2", "t3", "t4", "t5"] {
            state.tools_used.insert(t.into());
        }
        let safety = manager.validate(&state);
        assert!(!safety.allows_ai_control);
        assert!(!safety.requires_immediate_termination);

        let routed = decide(&state, &decision, &safety);
        assert!(routed.safety_override);
        assert_eq!(routed.next_node, Node::FraudInvestigation);
        assert!(routed.pending_override.is_some());
    }

    #[test]
    fn sequential_prefers_first_uncompleted_domain() {
        let (mut state, mut decision, manager) = fixture();
        state.snowflake_completed = true;
        state
            .tool_results
            .insert("ip_reputation".into(), serde_json::json!({}));
        state.domain_findings.insert(
            Domain::Network,
            DomainFinding {
                risk_score: Some(0.4),
                confidence: 0.6,
                evidence: vec!["e".into()],
                summary: "s".into(),
                status: FindingStatus::Ok,
            },
        );
        decision.confidence_level = ConfidenceLevel::Low;
        state.ai_confidence_level = ConfidenceLevel::Low;
        state.orchestrator_loops = 5;
        state.tool_execution_attempts = 5;
        for t in ["t1", "t2", "t3", "t4", "t5"] {
            state.tools_used.insert(t.into());
        }
        let safety = manager.validate(&state);
        assert!(!safety.requires_immediate_termination);

        let routed = decide(&state, &decision, &safety);
        assert_eq!(routed.next_node, Node::Agent(Domain::Device));
    }

    #[test]
    fn routing_is_deterministic() {
        let (mut state, mut decision, manager) = fixture();
        state.snowflake_completed = true;
        high_confidence(&mut decision);
        decision.strategy = Strategy::Adaptive;
        let safety = manager.validate(&state);

        let first = decide(&state, &decision, &safety);
        for _ in 0..10 {
            let again = decide(&state, &decision, &safety);
            assert_eq!(again.next_node, first.next_node);
            assert_eq!(again.safety_override, first.safety_override);
        }
    }

    #[test]
    fn engine_decision_routes_consistently() {
        // The heuristic engine's output must be routable without panics.
        let (mut state, _, manager) = fixture();
        state.snowflake_completed = true;
        state.snowflake_quality = 0.9;
        let decision = ConfidenceEngine::new().evaluate(&state);
        let safety = manager.validate(&state);
        let routed = decide(&state, &decision, &safety);
        assert!(matches!(
            routed.next_node,
            Node::Tools | Node::Agent(_) | Node::FraudInvestigation | Node::Summary
        ));
    }
}
