//! Evidence validation configuration.
//!
//! The minimum evidence floor and per-domain weights differ between code
//! paths in older systems; here they are configuration with explicit
//! defaults.

use std::collections::BTreeMap;

use inquest_contracts::{Domain, Strategy};
use serde::{Deserialize, Serialize};

/// Configuration for evidence gating and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Below this evidence strength the final risk score is withheld.
    pub minimum_evidence_floor: f64,
    /// A finding must carry at least this many evidence items to count
    /// toward evidence strength.
    pub min_items_per_domain: usize,
    /// Relative weight of each domain in the final risk aggregation.
    pub domain_weights: BTreeMap<Domain, f64>,
    /// Evidence quality below this after `insufficiency_loops` loops raises
    /// an insufficiency concern.
    pub insufficiency_floor: f64,
    pub insufficiency_loops: u32,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        let mut domain_weights = BTreeMap::new();
        for domain in Domain::EVIDENCE_DOMAINS {
            domain_weights.insert(domain, 1.0);
        }
        EvidenceConfig {
            minimum_evidence_floor: 0.2,
            min_items_per_domain: 1,
            domain_weights,
            insufficiency_floor: 0.3,
            insufficiency_loops: 3,
        }
    }
}

impl EvidenceConfig {
    /// Weight of a domain in risk aggregation; unknown domains count fully.
    pub fn weight_of(&self, domain: Domain) -> f64 {
        self.domain_weights.get(&domain).copied().unwrap_or(1.0)
    }

    /// Whether low evidence quality after this many loops warrants an
    /// insufficiency concern.
    pub fn should_raise_insufficiency(&self, evidence_quality: f64, loops: u32) -> bool {
        loops >= self.insufficiency_loops && evidence_quality < self.insufficiency_floor
    }

    /// Minimum domains a strategy must have analyzed before completion
    /// validation passes.
    pub fn required_domains(&self, strategy: Strategy) -> usize {
        match strategy {
            Strategy::Minimal | Strategy::CriticalPath => 1,
            Strategy::Focused | Strategy::Adaptive => 2,
            Strategy::Comprehensive => 4,
        }
    }

    /// Completion-time validation over the collected evidence.
    ///
    /// Returns whether validation passed and a human-readable reason.
    pub fn validate_for_completion(
        &self,
        evidence_quality: f64,
        domains_completed: usize,
        tools_used: usize,
        strategy: Strategy,
    ) -> (bool, String) {
        if evidence_quality < self.minimum_evidence_floor {
            return (
                false,
                format!(
                    "evidence quality {:.3} below floor {:.3}",
                    evidence_quality, self.minimum_evidence_floor
                ),
            );
        }
        let required = self.required_domains(strategy);
        if domains_completed < required && tools_used == 0 {
            return (
                false,
                format!(
                    "{} of {} required domains analyzed with no tool evidence",
                    domains_completed, required
                ),
            );
        }
        (
            true,
            format!(
                "evidence quality {:.3} with {} domains and {} tools",
                evidence_quality, domains_completed, tools_used
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_floor_matches_gating_contract() {
        let cfg = EvidenceConfig::default();
        assert_eq!(cfg.minimum_evidence_floor, 0.2);
        assert_eq!(cfg.min_items_per_domain, 1);
        assert_eq!(cfg.weight_of(Domain::Device), 1.0);
    }

    #[test]
    fn insufficiency_needs_both_low_quality_and_loops() {
        let cfg = EvidenceConfig::default();
        assert!(!cfg.should_raise_insufficiency(0.1, 2));
        assert!(cfg.should_raise_insufficiency(0.1, 3));
        assert!(!cfg.should_raise_insufficiency(0.5, 10));
    }

    #[test]
    fn completion_validation_reports_reason() {
        let cfg = EvidenceConfig::default();
        let (passed, reason) = cfg.validate_for_completion(0.05, 5, 3, Strategy::Adaptive);
        assert!(!passed);
        assert!(reason.contains("below floor"));

        let (passed, _) = cfg.validate_for_completion(0.6, 3, 2, Strategy::Comprehensive);
        assert!(passed);
    }
}
