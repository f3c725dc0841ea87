//! Canonical outcome builder.
//!
//! Every terminal path, including failures, assembles exactly one of
//! these records from the final state.

use chrono::Utc;
use tracing::info;

use inquest_config::EvidenceConfig;
use inquest_contracts::{
    AiIntelligenceMetrics, CanonicalFinalOutcome, EvidenceAssessment, EvidenceQualityLevel,
    FraudLikelihood, InvestigationStatus, InvestigationState, OutcomePerformanceMetrics, Phase,
    QualityAssurance, RiskAssessment,
};

/// Builds canonical outcomes from investigation states.
#[derive(Debug, Clone)]
pub struct OutcomeBuilder {
    evidence: EvidenceConfig,
}

impl OutcomeBuilder {
    pub fn new(evidence: EvidenceConfig) -> Self {
        OutcomeBuilder { evidence }
    }

    /// Assembles the outcome. `completion_reason` describes how the
    /// investigation ended and drives the status derivation.
    pub fn build(
        &self,
        state: &InvestigationState,
        completion_reason: &str,
    ) -> CanonicalFinalOutcome {
        let status = derive_status(state, completion_reason);
        let risk_assessment = self.risk_assessment(state);
        let evidence_assessment = self.evidence_assessment(state);
        let performance_metrics = performance_metrics(state);
        let ai_intelligence = ai_intelligence(state);
        let quality_assurance = quality_assurance(state);

        let outcome = CanonicalFinalOutcome {
            investigation_id: state.investigation_id.clone(),
            entity_id: state.entity_id.clone(),
            entity_type: state.entity_type.as_str().to_string(),
            completion_timestamp: Utc::now(),
            status,
            success: status.is_success(),
            completion_reason: completion_reason.to_string(),
            summary_text: summary_text(state),
            key_findings: key_findings(state),
            recommendations: recommendations(state, &risk_assessment),
            risk_assessment,
            evidence_assessment,
            performance_metrics,
            ai_intelligence,
            quality_assurance,
            system_version: state.system_version.clone(),
            graph_selection_reason: state.graph_selection_reason.clone(),
            feature_flags_active: state.feature_flags_active.clone(),
        };

        info!(
            investigation_id = %state.investigation_id,
            status = ?status,
            "canonical outcome built"
        );
        outcome
    }

    fn risk_assessment(&self, state: &InvestigationState) -> RiskAssessment {
        let score = state.risk_score;
        RiskAssessment {
            final_risk_score: score,
            fraud_likelihood: FraudLikelihood::from_score(score.unwrap_or(0.0)),
            risk_factors: state.risk_factors.clone(),
            risk_indicators: state.risk_indicators.clone(),
            confidence_score: state.ai_confidence,
            mitigation_recommendations: mitigation_for(score.unwrap_or(0.0)),
        }
    }

    fn evidence_assessment(&self, state: &InvestigationState) -> EvidenceAssessment {
        let overall_quality = state
            .ai_decisions
            .last()
            .map(|d| d.evidence_quality)
            .unwrap_or(0.0);

        let (validation_passed, validation_reason) = self.evidence.validate_for_completion(
            state.evidence_strength,
            state.domains_completed.len(),
            state.tools_used.len(),
            state.investigation_strategy,
        );

        EvidenceAssessment {
            overall_quality,
            quality_level: EvidenceQualityLevel::from_quality(overall_quality),
            snowflake_quality: state.snowflake_quality,
            tools_quality: state.tools_quality,
            domains_quality: state.domains_quality,
            evidence_sources: evidence_sources(state),
            quality_factors: state.confidence_factors.clone(),
            validation_passed,
            validation_reason,
        }
    }
}

fn derive_status(state: &InvestigationState, completion_reason: &str) -> InvestigationStatus {
    let reason = completion_reason.to_ascii_lowercase();
    if reason.contains("timeout") {
        return InvestigationStatus::Timeout;
    }
    if reason.contains("safety") {
        return InvestigationStatus::TerminatedBySafety;
    }
    if !state.errors.is_empty() || state.current_phase == Phase::Error {
        return InvestigationStatus::Failed;
    }
    if !state.safety_overrides.is_empty() || state.current_phase == Phase::Summary {
        return InvestigationStatus::CompletedWithWarnings;
    }
    InvestigationStatus::Completed
}

fn performance_metrics(state: &InvestigationState) -> OutcomePerformanceMetrics {
    OutcomePerformanceMetrics {
        total_duration_ms: state.total_duration_ms.unwrap_or(0),
        orchestrator_loops: state.orchestrator_loops,
        domains_completed: state.domains_completed.len(),
        tools_executed: state.tools_used.len(),
        investigation_efficiency: state.investigation_efficiency.unwrap_or(0.0),
        resource_utilization: resource_utilization(state),
        optimization_applied: state.ai_confidence > 0.8,
    }
}

fn ai_intelligence(state: &InvestigationState) -> AiIntelligenceMetrics {
    AiIntelligenceMetrics {
        final_confidence: state.ai_confidence,
        confidence_level: state.ai_confidence_level,
        ai_decisions_count: state.ai_decisions.len(),
        strategy_used: state.investigation_strategy,
        safety_overrides: state.safety_overrides.len(),
        confidence_evolution: state.confidence_evolution.clone(),
    }
}

fn quality_assurance(state: &InvestigationState) -> QualityAssurance {
    let concerns = state.safety_concerns.len();
    QualityAssurance {
        validation_checks_passed: state.quality_gates_passed.len(),
        validation_checks_failed: state.errors.len(),
        safety_concerns_raised: concerns,
        data_quality_score: state.evidence_strength,
        compliance_status: if concerns == 0 {
            "compliant".into()
        } else {
            "concerns_noted".into()
        },
        audit_trail: state.decision_audit_trail.clone(),
    }
}

fn summary_text(state: &InvestigationState) -> String {
    let risk = match state.risk_score {
        Some(score) => format!("{:.2}", score),
        None => "N/A (blocked by evidence gating)".to_string(),
    };
    format!(
        "Investigation {} for entity {} completed with risk score {} and AI confidence {:.2}.",
        state.investigation_id, state.entity_id, risk, state.ai_confidence
    )
}

fn key_findings(state: &InvestigationState) -> Vec<String> {
    let mut findings: Vec<String> = state
        .risk_indicators
        .iter()
        .take(5)
        .map(|i| format!("Risk indicator: {}", i))
        .collect();
    findings.push(format!(
        "Analyzed {}/6 investigation domains",
        state.domains_completed.len()
    ));
    if !state.tools_used.is_empty() {
        findings.push(format!(
            "Successfully executed {} analysis tools",
            state.tools_used.len()
        ));
    }
    findings
}

fn recommendations(state: &InvestigationState, risk: &RiskAssessment) -> Vec<String> {
    let mut recommendations = Vec::new();
    match risk.fraud_likelihood {
        FraudLikelihood::VeryHigh | FraudLikelihood::High => {
            recommendations.push("Immediate manual review recommended".to_string());
            recommendations.push("Consider blocking or flagging the transaction".to_string());
        }
        FraudLikelihood::Moderate => {
            recommendations.push("Additional verification steps recommended".to_string());
        }
        _ => {}
    }
    if state.ai_confidence < 0.6 {
        recommendations
            .push("Consider gathering additional evidence before a final decision".to_string());
    }
    recommendations
}

fn mitigation_for(risk_score: f64) -> Vec<String> {
    if risk_score >= 0.8 {
        vec![
            "Immediate action required".into(),
            "Block transaction".into(),
            "Manual investigation".into(),
        ]
    } else if risk_score >= 0.6 {
        vec![
            "Enhanced monitoring".into(),
            "Additional verification".into(),
            "Flag for review".into(),
        ]
    } else if risk_score >= 0.4 {
        vec!["Standard monitoring".into(), "Periodic review".into()]
    } else {
        vec![
            "No immediate action required".into(),
            "Continue standard processing".into(),
        ]
    }
}

fn evidence_sources(state: &InvestigationState) -> Vec<String> {
    let mut sources = Vec::new();
    if state.snowflake_completed {
        sources.push("snowflake".to_string());
    }
    sources.extend(state.tools_used.iter().cloned());
    sources.extend(
        state
            .domains_completed
            .iter()
            .map(|d| format!("{}_analysis", d)),
    );
    sources.dedup();
    sources
}

fn resource_utilization(state: &InvestigationState) -> String {
    let overrides = state.safety_overrides.len();
    let loops = state.orchestrator_loops;
    if overrides == 0 && loops <= 10 {
        "Efficient".into()
    } else if overrides <= 2 && loops <= 15 {
        "Good".into()
    } else {
        "Required Intervention".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::test_seed;
    use inquest_contracts::SafetyConcernType;

    fn builder() -> OutcomeBuilder {
        OutcomeBuilder::new(EvidenceConfig::default())
    }

    fn completed_state() -> InvestigationState {
        let mut state = InvestigationState::create_initial(test_seed("inv-out", 12));
        state.current_phase = Phase::Complete;
        state.total_duration_ms = Some(12_000);
        state
    }

    #[test]
    fn clean_run_is_completed() {
        let mut state = completed_state();
        state.risk_score = Some(0.75);
        state.evidence_strength = 0.6;
        let outcome = builder().build(&state, "Investigation completed successfully");
        assert_eq!(outcome.status, InvestigationStatus::Completed);
        assert!(outcome.success);
        assert_eq!(outcome.risk_assessment.fraud_likelihood, FraudLikelihood::High);
    }

    #[test]
    fn overrides_downgrade_to_warnings() {
        let mut state = completed_state();
        state.add_safety_override(
            "tools",
            "summary",
            SafetyConcernType::ResourcePressure,
            vec!["pressure".into()],
        );
        let outcome = builder().build(&state, "Investigation completed successfully");
        assert_eq!(outcome.status, InvestigationStatus::CompletedWithWarnings);
        assert!(outcome.success);
    }

    #[test]
    fn safety_reason_dominates_errors() {
        let mut state = completed_state();
        state.record_error("loop_overrun", "limit reached", None);
        let outcome = builder().build(&state, "Investigation terminated by safety manager");
        assert_eq!(outcome.status, InvestigationStatus::TerminatedBySafety);
        assert!(!outcome.success);
    }

    #[test]
    fn timeout_reason_dominates_everything() {
        let mut state = completed_state();
        state.record_error("slow", "too slow", None);
        let outcome = builder().build(&state, "Investigation timeout: time limit exceeded");
        assert_eq!(outcome.status, InvestigationStatus::Timeout);
    }

    #[test]
    fn errors_fail_the_outcome() {
        let mut state = completed_state();
        state.record_error("tool_error", "boom", None);
        let outcome = builder().build(&state, "Investigation completed with processing errors");
        assert_eq!(outcome.status, InvestigationStatus::Failed);
        assert!(!outcome.success);
        assert!(outcome.completion_reason.contains("errors"));
    }

    #[test]
    fn gated_outcome_reports_na_not_zero() {
        let mut state = completed_state();
        state.risk_score = None;
        let outcome = builder().build(&state, "Investigation completed successfully");
        assert_eq!(outcome.risk_assessment.final_risk_score, None);
        assert!(outcome.summary_text.contains("N/A (blocked by evidence gating)"));
    }

    #[test]
    fn resource_utilization_buckets() {
        let mut state = completed_state();
        state.orchestrator_loops = 5;
        assert_eq!(resource_utilization(&state), "Efficient");
        state.orchestrator_loops = 14;
        assert_eq!(resource_utilization(&state), "Good");
        state.orchestrator_loops = 22;
        assert_eq!(resource_utilization(&state), "Required Intervention");
    }
}
