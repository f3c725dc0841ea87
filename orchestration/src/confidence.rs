//! Confidence engine: weighted multi-factor confidence scoring and the
//! routing recommendation derived from it.
//!
//! This is the deterministic implementation of the assessor port. An
//! LLM-backed assessor plugs in behind the same trait; the router never
//! sees the difference.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use inquest_contracts::{
    AiDecision, ConfidenceLevel, Domain, FindingStatus, InquestResult, InvestigationState,
    RecommendedAction, ResourceImpact, Strategy,
};

use crate::ports::ConfidenceAssessor;

/// Factor weights. Must sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceWeights {
    pub snowflake_quality: f64,
    pub tools_quality: f64,
    pub domains_quality: f64,
    pub pattern_recognition: f64,
    pub investigation_velocity: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        ConfidenceWeights {
            snowflake_quality: 0.35,
            tools_quality: 0.25,
            domains_quality: 0.20,
            pattern_recognition: 0.15,
            investigation_velocity: 0.05,
        }
    }
}

/// Individual factor values feeding the weighted score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceFactors {
    pub snowflake_quality: f64,
    pub tools_quality: f64,
    pub domains_quality: f64,
    pub pattern_recognition: f64,
    pub investigation_velocity: f64,
}

/// Weighted multi-factor confidence engine.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceEngine {
    weights: ConfidenceWeights,
}

impl ConfidenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assesses the current state and produces a routing recommendation.
    pub fn evaluate(&self, state: &InvestigationState) -> AiDecision {
        let started = std::time::Instant::now();
        let factors = self.compute_factors(state);

        let no_inputs = !state.snowflake_completed
            && state.snowflake_data.is_none()
            && state.domain_findings.is_empty()
            && state.tool_results.is_empty();

        let (confidence, level) = if no_inputs {
            // Nothing to score yet; keep the neutral prior.
            (0.5, ConfidenceLevel::Unknown)
        } else {
            let score = self.weighted_score(&factors);
            (score, level_for(score))
        };

        let evidence_quality = factors.snowflake_quality * 0.4
            + factors.tools_quality * 0.3
            + factors.domains_quality * 0.3;
        let completeness = investigation_completeness(state);

        let strategy = select_strategy(state, confidence, level, evidence_quality);
        let agents_to_activate = agents_for_strategy(state, strategy);
        let tools_recommended = recommend_tools(state);
        let recommended_action =
            recommend_action(state, strategy, &agents_to_activate, &tools_recommended);

        let reasoning = build_reasoning(&self.weights, &factors, strategy, recommended_action);

        debug!(
            confidence,
            level = level.as_str(),
            strategy = strategy.as_str(),
            action = %recommended_action.label(),
            "confidence assessed"
        );

        let remaining_domains = Domain::SEQUENTIAL_ORDER
            .iter()
            .filter(|d| !state.domains_completed.contains(d))
            .count() as u32;

        AiDecision {
            confidence,
            confidence_level: level,
            recommended_action,
            reasoning,
            evidence_quality,
            investigation_completeness: completeness,
            strategy,
            agents_to_activate,
            tools_recommended,
            required_safety_checks: vec!["loop_prevention".into(), "resource_monitoring".into()],
            resource_impact: impact_for(strategy),
            estimated_completion_time: Some(remaining_domains * 2),
            timestamp: Utc::now(),
            model_used: None,
            calculation_time_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    /// Fallback decision when an assessment fails for a recoverable reason.
    pub fn fallback_decision(why: &str) -> AiDecision {
        AiDecision {
            confidence: 0.5,
            confidence_level: ConfidenceLevel::Unknown,
            recommended_action: RecommendedAction::Summary,
            reasoning: vec![format!("assessment_failed: {}", why)],
            evidence_quality: 0.0,
            investigation_completeness: 0.0,
            strategy: Strategy::Comprehensive,
            agents_to_activate: Vec::new(),
            tools_recommended: Vec::new(),
            required_safety_checks: vec!["loop_prevention".into(), "resource_monitoring".into()],
            resource_impact: ResourceImpact::Low,
            estimated_completion_time: None,
            timestamp: Utc::now(),
            model_used: None,
            calculation_time_ms: None,
        }
    }

    fn weighted_score(&self, f: &ConfidenceFactors) -> f64 {
        let score = self.weights.snowflake_quality * f.snowflake_quality
            + self.weights.tools_quality * f.tools_quality
            + self.weights.domains_quality * f.domains_quality
            + self.weights.pattern_recognition * f.pattern_recognition
            + self.weights.investigation_velocity * f.investigation_velocity;
        score.clamp(0.0, 1.0)
    }

    fn compute_factors(&self, state: &InvestigationState) -> ConfidenceFactors {
        ConfidenceFactors {
            snowflake_quality: snowflake_quality(state),
            tools_quality: tools_quality(state),
            domains_quality: domains_quality(state),
            pattern_recognition: pattern_recognition(state),
            investigation_velocity: investigation_velocity(state),
        }
    }
}

#[async_trait]
impl ConfidenceAssessor for ConfidenceEngine {
    async fn assess(&self, snapshot: &InvestigationState) -> InquestResult<AiDecision> {
        Ok(self.evaluate(snapshot))
    }
}

fn level_for(score: f64) -> ConfidenceLevel {
    if score >= 0.8 {
        ConfidenceLevel::High
    } else if score >= 0.4 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Presence and completeness of the initial dataset.
fn snowflake_quality(state: &InvestigationState) -> f64 {
    if state.snowflake_quality > 0.0 {
        return state.snowflake_quality.clamp(0.0, 1.0);
    }
    match &state.snowflake_data {
        Some(serde_json::Value::Object(map)) => (map.len() as f64 / 10.0).min(1.0),
        Some(other) => (other.to_string().len() as f64 / 500.0).min(1.0),
        None => 0.0,
    }
}

/// Fraction of attempted tools that returned usable output.
fn tools_quality(state: &InvestigationState) -> f64 {
    let attempts = state
        .tools_used
        .len()
        .max(state.tool_execution_attempts as usize);
    if attempts == 0 {
        return 0.0;
    }
    (state.tool_results.len() as f64 / attempts as f64).clamp(0.0, 1.0)
}

/// Mean finding confidence over completed domains with usable findings.
fn domains_quality(state: &InvestigationState) -> f64 {
    let confidences: Vec<f64> = state
        .domain_findings
        .values()
        .filter(|f| f.status == FindingStatus::Ok)
        .map(|f| f.confidence)
        .collect();
    if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    }
}

/// Heuristic pattern factor: saturates at five risk indicators.
fn pattern_recognition(state: &InvestigationState) -> f64 {
    (state.risk_indicators.len() as f64 / 5.0).min(1.0)
}

/// Evidence gathered per orchestrator loop, clamped to [0, 1].
fn investigation_velocity(state: &InvestigationState) -> f64 {
    if state.orchestrator_loops == 0 {
        return 0.0;
    }
    let items = state.evidence_item_count() as f64;
    (items / (state.orchestrator_loops as f64 * 2.0)).min(1.0)
}

fn investigation_completeness(state: &InvestigationState) -> f64 {
    let domain_share = state.domains_completed.len() as f64 / 6.0;
    let snowflake_share = if state.snowflake_completed { 1.0 } else { 0.0 };
    let tool_share = (state.tool_results.len() as f64 / 2.0).min(1.0);
    (domain_share * 0.6 + snowflake_share * 0.2 + tool_share * 0.2).clamp(0.0, 1.0)
}

/// Strategy selection, first match wins.
fn select_strategy(
    state: &InvestigationState,
    confidence: f64,
    level: ConfidenceLevel,
    evidence_quality: f64,
) -> Strategy {
    if level == ConfidenceLevel::Unknown || evidence_quality < 0.3 {
        return Strategy::Comprehensive;
    }
    if confidence >= 0.85 && dominant_domain(state).is_some() {
        return Strategy::CriticalPath;
    }
    if confidence >= 0.75 && state.risk_score.unwrap_or(0.0) < 0.2 {
        return Strategy::Minimal;
    }
    if confidence >= 0.6 && top_two_evidence_share(state) >= 0.7 {
        return Strategy::Focused;
    }
    Strategy::Adaptive
}

/// A domain named by the majority of risk indicators, if any.
fn dominant_domain(state: &InvestigationState) -> Option<Domain> {
    let mut counts: BTreeMap<Domain, usize> = BTreeMap::new();
    let mut total = 0;
    for indicator in &state.risk_indicators {
        for domain in Domain::SEQUENTIAL_ORDER {
            if indicator.contains(domain.as_str()) {
                *counts.entry(domain).or_default() += 1;
                total += 1;
            }
        }
    }
    let (domain, count) = counts.into_iter().max_by_key(|(_, c)| *c)?;
    if total > 0 && count * 2 >= total {
        Some(domain)
    } else {
        None
    }
}

/// Share of total evidence weight carried by the two heaviest domains.
fn top_two_evidence_share(state: &InvestigationState) -> f64 {
    let mut weights: Vec<f64> = state
        .domain_findings
        .values()
        .map(|f| f.confidence * f.evidence.len() as f64)
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    weights.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    weights.iter().take(2).sum::<f64>() / total
}

/// Uncompleted domains ordered by how much evidence points at them, falling
/// back to the sequential order.
fn agents_for_strategy(state: &InvestigationState, strategy: Strategy) -> Vec<Domain> {
    match strategy {
        Strategy::CriticalPath | Strategy::Minimal => vec![Domain::Risk],
        Strategy::Focused => {
            let mut weighted: Vec<(Domain, f64)> = state
                .domain_findings
                .iter()
                .map(|(d, f)| (*d, f.confidence * f.evidence.len() as f64))
                .collect();
            weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let mut agents: Vec<Domain> = weighted.into_iter().map(|(d, _)| d).collect();
            for domain in Domain::SEQUENTIAL_ORDER {
                if !agents.contains(&domain) {
                    agents.push(domain);
                }
            }
            agents.retain(|d| !state.domains_completed.contains(d));
            agents
        }
        _ => Domain::SEQUENTIAL_ORDER
            .into_iter()
            .filter(|d| !state.domains_completed.contains(d))
            .collect(),
    }
}

/// Tool suggestions keyed off the indicators already on file.
fn recommend_tools(state: &InvestigationState) -> Vec<String> {
    if !state.snowflake_completed || state.tool_results.len() >= 2 {
        return Vec::new();
    }
    let mut tools = Vec::new();
    for indicator in &state.risk_indicators {
        if indicator.contains("network") || indicator.contains("ip") {
            tools.push("ip_reputation".to_string());
        }
        if indicator.contains("device") {
            tools.push("device_fingerprint_lookup".to_string());
        }
        if indicator.contains("location") || indicator.contains("geo") {
            tools.push("geo_velocity_check".to_string());
        }
    }
    if tools.is_empty() {
        tools.push("threat_intel_lookup".to_string());
    }
    tools.dedup();
    tools
}

fn recommend_action(
    state: &InvestigationState,
    strategy: Strategy,
    agents: &[Domain],
    tools: &[String],
) -> RecommendedAction {
    if !state.snowflake_completed {
        return RecommendedAction::SnowflakeAnalysis;
    }
    match strategy {
        Strategy::CriticalPath | Strategy::Minimal => {
            if state.domains_completed.contains(&Domain::Risk) {
                RecommendedAction::Summary
            } else {
                RecommendedAction::Agent(Domain::Risk)
            }
        }
        _ => {
            if state.tools_used.len() < 2 && !tools.is_empty() {
                return RecommendedAction::Tools;
            }
            match agents.first() {
                Some(domain) if state.domains_completed.len() < 5 => {
                    RecommendedAction::Agent(*domain)
                }
                _ => RecommendedAction::Summary,
            }
        }
    }
}

fn impact_for(strategy: Strategy) -> ResourceImpact {
    match strategy {
        Strategy::Comprehensive => ResourceImpact::High,
        Strategy::Adaptive | Strategy::Focused => ResourceImpact::Medium,
        Strategy::CriticalPath | Strategy::Minimal => ResourceImpact::Low,
    }
}

/// Human-readable breakdown of the dominant factors, for audit.
fn build_reasoning(
    weights: &ConfidenceWeights,
    factors: &ConfidenceFactors,
    strategy: Strategy,
    action: RecommendedAction,
) -> Vec<String> {
    let mut contributions = [
        (
            "snowflake_quality",
            factors.snowflake_quality,
            weights.snowflake_quality,
        ),
        ("tools_quality", factors.tools_quality, weights.tools_quality),
        (
            "domains_quality",
            factors.domains_quality,
            weights.domains_quality,
        ),
        (
            "pattern_recognition",
            factors.pattern_recognition,
            weights.pattern_recognition,
        ),
        (
            "investigation_velocity",
            factors.investigation_velocity,
            weights.investigation_velocity,
        ),
    ];
    contributions.sort_by(|a, b| {
        (b.1 * b.2)
            .partial_cmp(&(a.1 * a.2))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut reasoning: Vec<String> = contributions
        .iter()
        .take(3)
        .map(|(name, value, weight)| format!("{}={:.2} (weight {:.2})", name, value, weight))
        .collect();
    reasoning.push(format!(
        "strategy {} -> {}",
        strategy.as_str(),
        action.label()
    ));
    reasoning
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::test_seed;
    use inquest_contracts::DomainFinding;

    fn state_with_findings() -> InvestigationState {
        let mut state = InvestigationState::create_initial(test_seed("inv-conf", 12));
        state.snowflake_completed = true;
        state.snowflake_quality = 0.9;
        state.tool_execution_attempts = 2;
        state.tools_used.insert("ip_reputation".into());
        state.tools_used.insert("geo_velocity_check".into());
        state
            .tool_results
            .insert("ip_reputation".into(), serde_json::json!({"score": 80}));
        state
            .tool_results
            .insert("geo_velocity_check".into(), serde_json::json!({"ok": true}));
        for domain in [Domain::Network, Domain::Device] {
            state.domain_findings.insert(
                domain,
                DomainFinding {
                    risk_score: Some(0.8),
                    confidence: 0.9,
                    evidence: vec!["anomaly".into(), "velocity spike".into()],
                    summary: "suspicious".into(),
                    status: FindingStatus::Ok,
                },
            );
            state.domains_completed.insert(domain);
        }
        state
    }

    #[test]
    fn empty_state_is_unknown_with_neutral_prior() {
        let state = InvestigationState::create_initial(test_seed("inv-empty", 12));
        let decision = ConfidenceEngine::new().evaluate(&state);
        assert_eq!(decision.confidence_level, ConfidenceLevel::Unknown);
        assert_eq!(decision.confidence, 0.5);
        assert_eq!(decision.strategy, Strategy::Comprehensive);
        assert_eq!(
            decision.recommended_action,
            RecommendedAction::SnowflakeAnalysis
        );
    }

    #[test]
    fn rich_evidence_scores_high() {
        let mut state = state_with_findings();
        state.risk_indicators = vec![
            "device_spoof".into(),
            "device rooted".into(),
            "network anomaly".into(),
            "device emulator".into(),
            "impossible travel".into(),
        ];
        state.orchestrator_loops = 2;
        let decision = ConfidenceEngine::new().evaluate(&state);
        assert!(decision.confidence >= 0.8, "got {}", decision.confidence);
        assert_eq!(decision.confidence_level, ConfidenceLevel::High);
    }

    #[test]
    fn dominant_indicator_picks_critical_path() {
        let mut state = state_with_findings();
        state.risk_indicators = vec![
            "device_spoof".into(),
            "device emulator detected".into(),
            "device rooted".into(),
            "device fingerprint mismatch".into(),
            "device os tampered".into(),
        ];
        state.orchestrator_loops = 2;
        let decision = ConfidenceEngine::new().evaluate(&state);
        assert_eq!(decision.strategy, Strategy::CriticalPath);
        assert_eq!(
            decision.recommended_action,
            RecommendedAction::Agent(Domain::Risk)
        );
    }

    #[test]
    fn weights_sum_to_one() {
        let w = ConfidenceWeights::default();
        let sum = w.snowflake_quality
            + w.tools_quality
            + w.domains_quality
            + w.pattern_recognition
            + w.investigation_velocity;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fallback_decision_records_why() {
        let decision = ConfidenceEngine::fallback_decision("assessor offline");
        assert_eq!(decision.confidence_level, ConfidenceLevel::Unknown);
        assert_eq!(decision.confidence, 0.5);
        assert!(decision.reasoning[0].contains("assessment_failed"));
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(level_for(0.8), ConfidenceLevel::High);
        assert_eq!(level_for(0.79), ConfidenceLevel::Medium);
        assert_eq!(level_for(0.4), ConfidenceLevel::Medium);
        assert_eq!(level_for(0.39), ConfidenceLevel::Low);
    }
}
