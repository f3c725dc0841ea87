//! Canonical final outcome: the single schema-stable record produced when
//! an investigation ends, regardless of how it completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{AuditEntry, ConfidenceLevel, ConfidenceSample, Strategy};

/// Investigation completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Completed,
    CompletedWithWarnings,
    Failed,
    TerminatedBySafety,
    Timeout,
}

impl InvestigationStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            InvestigationStatus::Completed | InvestigationStatus::CompletedWithWarnings
        )
    }
}

/// Fraud likelihood buckets, for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudLikelihood {
    VeryHigh,
    High,
    Moderate,
    Low,
    VeryLow,
}

impl FraudLikelihood {
    /// Buckets a risk score: >=0.9 very high, >=0.7 high, >=0.5 moderate,
    /// >=0.3 low, else very low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            FraudLikelihood::VeryHigh
        } else if score >= 0.7 {
            FraudLikelihood::High
        } else if score >= 0.5 {
            FraudLikelihood::Moderate
        } else if score >= 0.3 {
            FraudLikelihood::Low
        } else {
            FraudLikelihood::VeryLow
        }
    }
}

/// Coarse evidence quality buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceQualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Insufficient,
}

impl EvidenceQualityLevel {
    pub fn from_quality(quality: f64) -> Self {
        if quality >= 0.8 {
            EvidenceQualityLevel::Excellent
        } else if quality >= 0.6 {
            EvidenceQualityLevel::Good
        } else if quality >= 0.4 {
            EvidenceQualityLevel::Fair
        } else if quality >= 0.2 {
            EvidenceQualityLevel::Poor
        } else {
            EvidenceQualityLevel::Insufficient
        }
    }
}

/// Risk analysis results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// None when evidence gating blocked the score.
    pub final_risk_score: Option<f64>,
    pub fraud_likelihood: FraudLikelihood,
    pub risk_factors: Vec<String>,
    pub risk_indicators: Vec<String>,
    pub confidence_score: f64,
    pub mitigation_recommendations: Vec<String>,
}

/// Evidence quality assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceAssessment {
    pub overall_quality: f64,
    pub quality_level: EvidenceQualityLevel,
    pub snowflake_quality: f64,
    pub tools_quality: f64,
    pub domains_quality: f64,
    pub evidence_sources: Vec<String>,
    pub quality_factors: std::collections::BTreeMap<String, f64>,
    pub validation_passed: bool,
    pub validation_reason: String,
}

/// Performance and efficiency metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePerformanceMetrics {
    pub total_duration_ms: u64,
    pub orchestrator_loops: u32,
    pub domains_completed: usize,
    pub tools_executed: usize,
    pub investigation_efficiency: f64,
    pub resource_utilization: String,
    pub optimization_applied: bool,
}

/// AI decision and intelligence tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiIntelligenceMetrics {
    pub final_confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub ai_decisions_count: usize,
    pub strategy_used: Strategy,
    pub safety_overrides: usize,
    pub confidence_evolution: Vec<ConfidenceSample>,
}

/// Quality and compliance tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssurance {
    pub validation_checks_passed: usize,
    pub validation_checks_failed: usize,
    pub safety_concerns_raised: usize,
    pub data_quality_score: f64,
    pub compliance_status: String,
    pub audit_trail: Vec<AuditEntry>,
}

/// The unified result record for all completion paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFinalOutcome {
    // Identification
    pub investigation_id: String,
    pub entity_id: String,
    pub entity_type: String,
    pub completion_timestamp: DateTime<Utc>,

    // Overall status
    pub status: InvestigationStatus,
    pub success: bool,
    pub completion_reason: String,

    // Assessments
    pub risk_assessment: RiskAssessment,
    pub evidence_assessment: EvidenceAssessment,
    pub performance_metrics: OutcomePerformanceMetrics,
    pub ai_intelligence: AiIntelligenceMetrics,
    pub quality_assurance: QualityAssurance,

    // Summary
    pub summary_text: String,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,

    // System metadata
    pub system_version: String,
    pub graph_selection_reason: String,
    pub feature_flags_active: Vec<String>,
}

/// Progress snapshot pushed to the result sink on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub risk_score: Option<f64>,
    pub overall_risk_score: Option<f64>,
    pub status: String,
    pub current_phase: String,
    pub progress_percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraud_likelihood_buckets() {
        assert_eq!(FraudLikelihood::from_score(0.95), FraudLikelihood::VeryHigh);
        assert_eq!(FraudLikelihood::from_score(0.9), FraudLikelihood::VeryHigh);
        assert_eq!(FraudLikelihood::from_score(0.7), FraudLikelihood::High);
        assert_eq!(FraudLikelihood::from_score(0.5), FraudLikelihood::Moderate);
        assert_eq!(FraudLikelihood::from_score(0.3), FraudLikelihood::Low);
        assert_eq!(FraudLikelihood::from_score(0.1), FraudLikelihood::VeryLow);
    }

    #[test]
    fn status_success_covers_both_completed_variants() {
        assert!(InvestigationStatus::Completed.is_success());
        assert!(InvestigationStatus::CompletedWithWarnings.is_success());
        assert!(!InvestigationStatus::Failed.is_success());
        assert!(!InvestigationStatus::TerminatedBySafety.is_success());
        assert!(!InvestigationStatus::Timeout.is_success());
    }
}
