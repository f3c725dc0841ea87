//! Adaptive safety manager.
//!
//! Derives the safety level from the investigation context, scales the
//! limit tables, measures resource pressure, raises concerns, and decides
//! whether the AI keeps routing control or the investigation terminates.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use inquest_config::{base_limits, effective_limits, EvidenceConfig, Mode, SafetyLevel};
use inquest_contracts::{
    ConfidenceLevel, DynamicLimits, InvestigationState, SafetyConcernType, Severity,
};

/// A specific safety concern raised during validation.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyConcern {
    pub concern_type: SafetyConcernType,
    pub severity: Severity,
    pub message: String,
    pub metrics: serde_json::Value,
    pub recommended_action: String,
}

/// Estimated headroom before the hard limits.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RemainingResources {
    pub orchestrator_loops: u32,
    pub tool_executions: u32,
    pub domain_attempts: u32,
    pub time_minutes: u32,
}

/// Complete safety validation result.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyStatus {
    pub allows_ai_control: bool,
    pub requires_immediate_termination: bool,
    pub safety_level: SafetyLevel,
    pub current_limits: DynamicLimits,
    pub resource_pressure: f64,
    pub safety_concerns: Vec<SafetyConcern>,
    pub override_reasoning: Vec<String>,
    pub estimated_remaining_resources: RemainingResources,
    pub recommended_actions: Vec<String>,
}

impl SafetyStatus {
    pub fn has_critical_concern(&self) -> bool {
        self.safety_concerns
            .iter()
            .any(|c| c.severity == Severity::Critical)
    }

    /// First critical concern type, used to label forced terminations.
    pub fn critical_concern_type(&self) -> Option<SafetyConcernType> {
        self.safety_concerns
            .iter()
            .find(|c| c.severity == Severity::Critical)
            .map(|c| c.concern_type)
    }
}

/// Context-aware safety manager with dynamic limits.
#[derive(Debug, Clone)]
pub struct SafetyManager {
    mode: Mode,
    evidence: EvidenceConfig,
}

impl SafetyManager {
    pub fn new(mode: Mode, evidence: EvidenceConfig) -> Self {
        SafetyManager { mode, evidence }
    }

    /// Full safety validation of the current state.
    pub fn validate(&self, state: &InvestigationState) -> SafetyStatus {
        let safety_level = self.determine_level(state);
        let current_limits = self.dynamic_limits(state, safety_level);
        let resource_pressure = self.resource_pressure(state, &current_limits);
        let safety_concerns = self.identify_concerns(state, &current_limits, resource_pressure);
        let allows_ai_control = self.allows_ai_control(state, &safety_concerns, resource_pressure);
        let requires_immediate_termination =
            self.requires_termination(state, &safety_concerns, &current_limits);
        let override_reasoning =
            self.override_reasoning(state, &safety_concerns, allows_ai_control, resource_pressure);
        let estimated_remaining_resources = self.remaining_resources(state, &current_limits);
        let recommended_actions =
            self.recommended_actions(&safety_concerns, resource_pressure);

        debug!(
            safety_level = safety_level.as_str(),
            allows_ai_control,
            requires_immediate_termination,
            resource_pressure,
            concerns = safety_concerns.len(),
            "safety validation complete"
        );
        for concern in &safety_concerns {
            warn!(
                severity = ?concern.severity,
                concern = concern.concern_type.as_str(),
                "{}",
                concern.message
            );
        }

        SafetyStatus {
            allows_ai_control,
            requires_immediate_termination,
            safety_level,
            current_limits,
            resource_pressure,
            safety_concerns,
            override_reasoning,
            estimated_remaining_resources,
            recommended_actions,
        }
    }

    fn determine_level(&self, state: &InvestigationState) -> SafetyLevel {
        let overrides = state.safety_overrides.len();

        if state.orchestrator_loops > 20 || overrides > 3 {
            return SafetyLevel::Emergency;
        }
        if state.ai_confidence_level == ConfidenceLevel::Low || overrides > 1 {
            return SafetyLevel::Strict;
        }
        if state.ai_confidence_level == ConfidenceLevel::High && overrides == 0 {
            return SafetyLevel::Permissive;
        }
        SafetyLevel::Standard
    }

    fn dynamic_limits(&self, state: &InvestigationState, level: SafetyLevel) -> DynamicLimits {
        effective_limits(base_limits(self.mode), level, state.investigation_strategy)
    }

    /// Resource pressure in [0, 1]. Zero during the three-loop warm-up.
    fn resource_pressure(&self, state: &InvestigationState, limits: &DynamicLimits) -> f64 {
        if state.orchestrator_loops < 3 {
            return 0.0;
        }

        let total_tool_executions = state
            .tools_used
            .len()
            .max(state.tool_execution_attempts as usize);

        let loop_pressure = progressive_pressure(
            state.orchestrator_loops as f64,
            limits.max_orchestrator_loops as f64,
        );
        let tool_pressure = progressive_pressure(
            total_tool_executions as f64,
            limits.max_tool_executions as f64,
        );
        let domain_pressure = progressive_pressure(
            state.domains_completed.len() as f64,
            limits.max_domain_attempts as f64,
        );
        let time_pressure = progressive_pressure(
            state.elapsed_minutes(),
            limits.max_investigation_time_minutes as f64,
        );

        let overall = 0.4 * tool_pressure
            + 0.3 * loop_pressure
            + 0.2 * time_pressure
            + 0.1 * domain_pressure;
        overall.clamp(0.0, 1.0)
    }

    fn identify_concerns(
        &self,
        state: &InvestigationState,
        limits: &DynamicLimits,
        resource_pressure: f64,
    ) -> Vec<SafetyConcern> {
        let mut concerns = Vec::new();

        let loops = state.orchestrator_loops;
        let loop_limit = limits.max_orchestrator_loops;
        if loops as f64 >= loop_limit as f64 * 0.8 {
            let severity = if loops >= loop_limit {
                Severity::Critical
            } else {
                Severity::High
            };
            concerns.push(SafetyConcern {
                concern_type: SafetyConcernType::LoopRisk,
                severity,
                message: format!("Orchestrator loop limit approaching: {}/{}", loops, loop_limit),
                metrics: serde_json::json!({"current_loops": loops, "limit": loop_limit}),
                recommended_action: "Force progression to summary phase".into(),
            });
        }

        if resource_pressure >= limits.resource_pressure_threshold {
            let severity = if resource_pressure >= 0.9 {
                Severity::Critical
            } else {
                Severity::High
            };
            concerns.push(SafetyConcern {
                concern_type: SafetyConcernType::ResourcePressure,
                severity,
                message: format!("High resource pressure: {:.2}", resource_pressure),
                metrics: serde_json::json!({
                    "pressure": resource_pressure,
                    "threshold": limits.resource_pressure_threshold,
                }),
                recommended_action: "Reduce resource consumption or force completion".into(),
            });
        }

        if state.confidence_evolution.len() >= 2 {
            let recent = state.confidence_evolution[state.confidence_evolution.len() - 1].confidence;
            let previous =
                state.confidence_evolution[state.confidence_evolution.len() - 2].confidence;
            if recent < previous - 0.3 {
                concerns.push(SafetyConcern {
                    concern_type: SafetyConcernType::ConfidenceDrop,
                    severity: Severity::Medium,
                    message: format!(
                        "Significant confidence drop: {:.3} -> {:.3}",
                        previous, recent
                    ),
                    metrics: serde_json::json!({"previous": previous, "current": recent}),
                    recommended_action: "Switch to safety-first mode".into(),
                });
            }
        }

        let evidence_quality = state
            .ai_decisions
            .last()
            .map(|d| d.evidence_quality)
            .unwrap_or(0.0);
        if self
            .evidence
            .should_raise_insufficiency(evidence_quality, loops)
        {
            concerns.push(SafetyConcern {
                concern_type: SafetyConcernType::EvidenceInsufficient,
                severity: Severity::Medium,
                message: format!(
                    "Low evidence quality after {} loops: {:.3}",
                    loops, evidence_quality
                ),
                metrics: serde_json::json!({"evidence_quality": evidence_quality, "loops": loops}),
                recommended_action: "Switch to comprehensive sequential analysis".into(),
            });
        }

        let elapsed = state.elapsed_minutes();
        let time_limit = limits.max_investigation_time_minutes as f64;
        if elapsed >= time_limit * 0.8 {
            let severity = if elapsed >= time_limit {
                Severity::Critical
            } else {
                Severity::High
            };
            concerns.push(SafetyConcern {
                concern_type: SafetyConcernType::TimeoutRisk,
                severity,
                message: format!(
                    "Investigation time limit approaching: {:.1}/{:.0} minutes",
                    elapsed, time_limit
                ),
                metrics: serde_json::json!({"elapsed_minutes": elapsed, "limit": time_limit}),
                recommended_action: "Force completion within time limit".into(),
            });
        }

        concerns
    }

    fn allows_ai_control(
        &self,
        state: &InvestigationState,
        concerns: &[SafetyConcern],
        resource_pressure: f64,
    ) -> bool {
        if concerns.iter().any(|c| c.severity == Severity::Critical) {
            return false;
        }
        if resource_pressure < 0.35 {
            return true;
        }
        match state.ai_confidence_level {
            ConfidenceLevel::High => resource_pressure < 0.6,
            ConfidenceLevel::Medium => resource_pressure < 0.8,
            ConfidenceLevel::Unknown => resource_pressure < 0.5,
            ConfidenceLevel::Low => false,
        }
    }

    fn requires_termination(
        &self,
        state: &InvestigationState,
        concerns: &[SafetyConcern],
        limits: &DynamicLimits,
    ) -> bool {
        if concerns.iter().any(|c| c.severity == Severity::Critical) {
            return true;
        }
        if state.orchestrator_loops >= limits.max_orchestrator_loops {
            return true;
        }
        if state.tools_used.len() >= limits.max_tool_executions as usize {
            return true;
        }
        state.elapsed_minutes() >= limits.max_investigation_time_minutes as f64
    }

    fn override_reasoning(
        &self,
        state: &InvestigationState,
        concerns: &[SafetyConcern],
        allows_ai_control: bool,
        resource_pressure: f64,
    ) -> Vec<String> {
        let mut reasoning = Vec::new();

        if !allows_ai_control {
            reasoning.push("AI control denied due to safety concerns".to_string());
            for concern in concerns {
                if matches!(concern.severity, Severity::Critical | Severity::High) {
                    reasoning.push(format!("{:?} concern: {}", concern.severity, concern.message));
                }
            }
        }
        if !concerns.is_empty() {
            reasoning.push(format!("Active safety concerns: {}", concerns.len()));
            let critical = concerns
                .iter()
                .filter(|c| c.severity == Severity::Critical)
                .count();
            if critical > 0 {
                reasoning.push(format!(
                    "Critical concerns requiring immediate action: {}",
                    critical
                ));
            }
        }
        if resource_pressure > 0.7 {
            reasoning.push(format!("High resource pressure: {:.2}", resource_pressure));
        }
        if state.orchestrator_loops > 10 {
            reasoning.push(format!(
                "High orchestrator loop count: {}",
                state.orchestrator_loops
            ));
        }

        reasoning
    }

    fn remaining_resources(
        &self,
        state: &InvestigationState,
        limits: &DynamicLimits,
    ) -> RemainingResources {
        let elapsed = state.elapsed_minutes();
        RemainingResources {
            orchestrator_loops: limits
                .max_orchestrator_loops
                .saturating_sub(state.orchestrator_loops),
            tool_executions: limits
                .max_tool_executions
                .saturating_sub(state.tools_used.len() as u32),
            domain_attempts: limits
                .max_domain_attempts
                .saturating_sub(state.domains_completed.len() as u32),
            time_minutes: (limits.max_investigation_time_minutes as f64 - elapsed).max(0.0) as u32,
        }
    }

    fn recommended_actions(
        &self,
        concerns: &[SafetyConcern],
        resource_pressure: f64,
    ) -> Vec<String> {
        let mut actions = Vec::new();

        if concerns.iter().any(|c| c.severity == Severity::Critical) {
            actions.push("Force immediate investigation completion".to_string());
            actions.push("Switch to emergency safety mode".to_string());
        }
        if resource_pressure > 0.8 {
            actions.push("Reduce resource consumption".to_string());
            actions.push("Skip non-essential analysis steps".to_string());
        }
        if concerns
            .iter()
            .any(|c| c.concern_type == SafetyConcernType::LoopRisk)
        {
            actions.push("Force progression to next investigation phase".to_string());
        }
        if concerns
            .iter()
            .any(|c| c.concern_type == SafetyConcernType::ConfidenceDrop)
        {
            actions.push("Switch to safety-first sequential execution".to_string());
        }
        if concerns
            .iter()
            .any(|c| c.concern_type == SafetyConcernType::EvidenceInsufficient)
        {
            actions.push("Collect additional evidence before proceeding".to_string());
        }
        if actions.is_empty() {
            actions.push("Continue with current investigation approach".to_string());
            actions.push("Monitor safety metrics".to_string());
        }

        actions
    }

    /// Records a validation pass on the state: refreshed limits, new
    /// concern records, and an audit entry.
    pub fn apply_validation(&self, state: &mut InvestigationState, status: &SafetyStatus) {
        state.dynamic_limits = status.current_limits;
        for concern in &status.safety_concerns {
            state.record_concern(
                concern.concern_type,
                concern.severity,
                &concern.message,
                status.resource_pressure,
            );
        }
        state.append_audit(
            "safety_validation",
            serde_json::json!({
                "safety_level": status.safety_level.as_str(),
                "ai_control_allowed": status.allows_ai_control,
                "termination_required": status.requires_immediate_termination,
                "resource_pressure": status.resource_pressure,
                "safety_concerns": status.safety_concerns.len(),
                "timestamp": Utc::now(),
            }),
        );
    }
}

/// Per-axis pressure that stays gentle until 70% of capacity, then climbs
/// sharply: `ratio * 0.5` below the knee, `0.35 + excess * 0.65` above it.
pub fn progressive_pressure(current: f64, limit: f64) -> f64 {
    if current <= 0.0 || limit <= 0.0 {
        return 0.0;
    }
    let ratio = current / limit;
    let pressure = if ratio <= 0.7 {
        ratio * 0.5
    } else {
        0.35 + ((ratio - 0.7) / 0.3) * 0.65
    };
    pressure.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::test_seed;
    use inquest_contracts::InvestigationState;

    fn manager() -> SafetyManager {
        SafetyManager::new(Mode::Mock, EvidenceConfig::default())
    }

    fn state() -> InvestigationState {
        InvestigationState::create_initial(test_seed("inv-safety", 12))
    }

    #[test]
    fn progressive_pressure_shape() {
        assert_eq!(progressive_pressure(0.0, 10.0), 0.0);
        assert!((progressive_pressure(3.5, 10.0) - 0.175).abs() < 1e-9);
        assert!((progressive_pressure(7.0, 10.0) - 0.35).abs() < 1e-9);
        assert!((progressive_pressure(10.0, 10.0) - 1.0).abs() < 1e-9);
        assert_eq!(progressive_pressure(20.0, 10.0), 1.0);
    }

    #[test]
    fn warmup_suppresses_pressure() {
        let mut s = state();
        s.orchestrator_loops = 2;
        s.tool_execution_attempts = 8;
        let status = manager().validate(&s);
        assert_eq!(status.resource_pressure, 0.0);
    }

    #[test]
    fn emergency_level_on_loop_overrun() {
        let mut s = state();
        s.orchestrator_loops = 21;
        let status = manager().validate(&s);
        assert_eq!(status.safety_level, SafetyLevel::Emergency);
        assert!(status.requires_immediate_termination);
    }

    #[test]
    fn strict_level_on_low_confidence() {
        let mut s = state();
        s.ai_confidence_level = ConfidenceLevel::Low;
        let status = manager().validate(&s);
        assert_eq!(status.safety_level, SafetyLevel::Strict);
        assert!(!status.allows_ai_control || status.resource_pressure < 0.35);
    }

    #[test]
    fn permissive_level_on_high_confidence_without_overrides() {
        let mut s = state();
        s.ai_confidence_level = ConfidenceLevel::High;
        let status = manager().validate(&s);
        assert_eq!(status.safety_level, SafetyLevel::Permissive);
    }

    #[test]
    fn loop_limit_raises_critical_concern() {
        let mut s = state();
        // Standard/adaptive mock limits: 12 loops.
        s.orchestrator_loops = 12;
        let status = manager().validate(&s);
        let loop_concern = status
            .safety_concerns
            .iter()
            .find(|c| c.concern_type == SafetyConcernType::LoopRisk)
            .expect("loop concern");
        assert_eq!(loop_concern.severity, Severity::Critical);
        assert!(status.requires_immediate_termination);
        assert!(!status.allows_ai_control);
    }

    #[test]
    fn confidence_drop_raises_concern() {
        let mut s = state();
        let mut decision = s.ai_decisions[0].clone();
        decision.confidence = 0.9;
        decision.confidence_level = ConfidenceLevel::High;
        s.update_ai_confidence(decision.clone(), "t1");
        decision.confidence = 0.5;
        decision.confidence_level = ConfidenceLevel::Medium;
        s.update_ai_confidence(decision, "t2");

        let status = manager().validate(&s);
        assert!(status
            .safety_concerns
            .iter()
            .any(|c| c.concern_type == SafetyConcernType::ConfidenceDrop));
    }

    #[test]
    fn low_pressure_always_allows_ai_control() {
        let mut s = state();
        s.ai_confidence_level = ConfidenceLevel::Low;
        s.orchestrator_loops = 3;
        let status = manager().validate(&s);
        // Three loops into a 12-loop budget is well under the 0.35 floor.
        assert!(status.resource_pressure < 0.35);
        assert!(status.allows_ai_control);
    }

    #[test]
    fn apply_validation_refreshes_limits_and_audit() {
        let mut s = state();
        s.ai_confidence_level = ConfidenceLevel::High;
        let mgr = manager();
        let status = mgr.validate(&s);
        let audit_before = s.decision_audit_trail.len();
        mgr.apply_validation(&mut s, &status);
        assert_eq!(s.decision_audit_trail.len(), audit_before + 1);
        // Permissive multipliers widen the loop budget: 12 * 1.5.
        assert_eq!(s.dynamic_limits.max_orchestrator_loops, 18);
    }
}
