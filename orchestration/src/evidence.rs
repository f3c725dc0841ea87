//! Evidence gating and risk finalization.
//!
//! Gating runs first inside the summary node: a completed investigation
//! only carries a risk score when the supporting evidence clears the
//! configured floor. A blocked score is logged as "N/A (blocked by
//! evidence gating)", never as 0.0.

use tracing::{info, warn};

use inquest_config::EvidenceConfig;
use inquest_contracts::{
    Domain, DomainFinding, FindingStatus, InvestigationState, SafetyConcernType, Severity,
};

/// Outcome of the gating step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatingResult {
    Passed,
    Blocked,
}

/// Computes evidence strength and withholds the risk score when it falls
/// below the floor.
pub fn apply_evidence_gating(state: &mut InvestigationState, config: &EvidenceConfig) -> GatingResult {
    let strength = evidence_strength(state, config);
    state.evidence_strength = strength;

    if strength < config.minimum_evidence_floor {
        state.risk_score = None;
        state.record_concern(
            SafetyConcernType::EvidenceInsufficient,
            Severity::Medium,
            &format!(
                "Evidence strength {:.3} below floor {:.3}; risk score withheld",
                strength, config.minimum_evidence_floor
            ),
            0.0,
        );
        info!(
            evidence_strength = strength,
            floor = config.minimum_evidence_floor,
            "risk score: N/A (blocked by evidence gating)"
        );
        return GatingResult::Blocked;
    }

    info!(evidence_strength = strength, "evidence gating passed");
    GatingResult::Passed
}

/// Weighted average of finding confidence over OK findings that carry
/// enough evidence items; zero when none qualify.
pub fn evidence_strength(state: &InvestigationState, config: &EvidenceConfig) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (domain, finding) in &state.domain_findings {
        if finding.status != FindingStatus::Ok {
            continue;
        }
        if finding.evidence.len() < config.min_items_per_domain {
            continue;
        }
        let weight = config.weight_of(*domain);
        weighted_sum += finding.confidence * weight;
        weight_total += weight;
    }
    if weight_total <= 0.0 {
        0.0
    } else {
        (weighted_sum / weight_total).clamp(0.0, 1.0)
    }
}

/// Finalizes the risk score from domain findings. Only called when gating
/// passed.
pub fn finalize_risk(state: &mut InvestigationState, config: &EvidenceConfig) {
    reconstruct_findings_if_empty(state);

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (domain, finding) in &state.domain_findings {
        let Some(score) = finding.risk_score else {
            continue;
        };
        if finding.status != FindingStatus::Ok {
            continue;
        }
        let weight = finding.confidence * config.weight_of(*domain);
        weighted_sum += score * weight;
        weight_total += weight;
    }

    if weight_total > 0.0 {
        state.risk_score = Some((weighted_sum / weight_total).clamp(0.0, 1.0));
    } else {
        state.risk_score = None;
        warn!("no scored domain findings; risk score unavailable");
    }

    let confidences: Vec<f64> = state
        .ok_findings()
        .map(|(_, f)| f.confidence)
        .collect();
    state.confidence_score = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    match state.risk_score {
        Some(score) => info!(risk_score = score, "risk score finalized"),
        None => info!("risk score finalized: N/A (blocked by evidence gating)"),
    }
}

/// Projects raw agent results into `domain_findings` when no structured
/// finding carries a risk score. Covers the five evidence domains; the
/// risk agent is an aggregator, not a finding source.
fn reconstruct_findings_if_empty(state: &mut InvestigationState) {
    let has_scores = state
        .domain_findings
        .values()
        .any(|f| f.risk_score.is_some());
    if has_scores {
        return;
    }

    let mut reconstructed = 0;
    for domain in Domain::EVIDENCE_DOMAINS {
        let Some(result) = state.agent_results.get(&domain).cloned() else {
            continue;
        };
        let evidence = [&result.evidence, &result.indicators, &result.analysis]
            .into_iter()
            .find(|list| !list.is_empty())
            .cloned()
            .unwrap_or_default();
        let finding = DomainFinding {
            risk_score: result.risk_score,
            confidence: result.confidence.unwrap_or(0.35),
            evidence,
            summary: result
                .summary
                .unwrap_or_else(|| format!("{} domain analysis", domain)),
            status: if result.risk_score.is_some() {
                FindingStatus::Ok
            } else {
                FindingStatus::InsufficientEvidence
            },
        };
        state.domain_findings.insert(domain, finding);
        reconstructed += 1;
    }

    if reconstructed > 0 {
        info!(domains = reconstructed, "projected agent results into domain findings");
    }
}
