//! Safety threshold tables.
//!
//! Every multiplier and base limit lives in this one module so behavioral
//! changes are a diff to a table, not to logic.

use inquest_contracts::{DynamicLimits, Strategy};
use serde::{Deserialize, Serialize};

use crate::Mode;

/// Safety enforcement levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    /// High confidence, relaxed limits.
    Permissive,
    /// Normal operation.
    Standard,
    /// Low confidence, tight limits.
    Strict,
    /// Critical safety override.
    Emergency,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Permissive => "permissive",
            SafetyLevel::Standard => "standard",
            SafetyLevel::Strict => "strict",
            SafetyLevel::Emergency => "emergency",
        }
    }
}

/// Multipliers applied per axis: loops, tools, domains, time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMultipliers {
    pub loops: f64,
    pub tools: f64,
    pub domains: f64,
    pub time: f64,
}

/// Base limits for test-grade (mock) runs.
pub const BASE_LIMITS_TEST: DynamicLimits = DynamicLimits {
    max_orchestrator_loops: 12,
    max_tool_executions: 8,
    max_domain_attempts: 6,
    max_investigation_time_minutes: 10,
    confidence_threshold_for_override: 0.3,
    resource_pressure_threshold: 0.8,
};

/// Base limits for live-grade (demo/live) runs.
pub const BASE_LIMITS_LIVE: DynamicLimits = DynamicLimits {
    max_orchestrator_loops: 25,
    max_tool_executions: 15,
    max_domain_attempts: 10,
    max_investigation_time_minutes: 30,
    confidence_threshold_for_override: 0.4,
    resource_pressure_threshold: 0.7,
};

/// Executor recursion ceiling before safety multipliers.
pub const RECURSION_BASE_TEST: u32 = 50;
pub const RECURSION_BASE_LIVE: u32 = 100;

pub fn base_limits(mode: Mode) -> DynamicLimits {
    if mode.is_test() {
        BASE_LIMITS_TEST
    } else {
        BASE_LIMITS_LIVE
    }
}

pub fn recursion_base(mode: Mode) -> u32 {
    if mode.is_test() {
        RECURSION_BASE_TEST
    } else {
        RECURSION_BASE_LIVE
    }
}

pub fn safety_multipliers(level: SafetyLevel) -> AxisMultipliers {
    match level {
        SafetyLevel::Permissive => AxisMultipliers {
            loops: 1.5,
            tools: 1.3,
            domains: 1.2,
            time: 1.4,
        },
        SafetyLevel::Standard => AxisMultipliers {
            loops: 1.0,
            tools: 1.0,
            domains: 1.0,
            time: 1.0,
        },
        SafetyLevel::Strict => AxisMultipliers {
            loops: 0.7,
            tools: 0.8,
            domains: 0.8,
            time: 0.8,
        },
        SafetyLevel::Emergency => AxisMultipliers {
            loops: 0.5,
            tools: 0.5,
            domains: 0.5,
            time: 0.5,
        },
    }
}

pub fn strategy_multipliers(strategy: Strategy) -> AxisMultipliers {
    match strategy {
        Strategy::CriticalPath => AxisMultipliers {
            loops: 0.8,
            tools: 0.6,
            domains: 0.5,
            time: 0.7,
        },
        Strategy::Minimal => AxisMultipliers {
            loops: 0.6,
            tools: 0.5,
            domains: 0.3,
            time: 0.5,
        },
        Strategy::Focused => AxisMultipliers {
            loops: 0.9,
            tools: 0.8,
            domains: 0.7,
            time: 0.8,
        },
        Strategy::Adaptive => AxisMultipliers {
            loops: 1.0,
            tools: 1.0,
            domains: 1.0,
            time: 1.0,
        },
        Strategy::Comprehensive => AxisMultipliers {
            loops: 1.2,
            tools: 1.3,
            domains: 1.5,
            time: 1.4,
        },
    }
}

/// Applies safety-level and strategy multipliers to a base table.
pub fn effective_limits(base: DynamicLimits, level: SafetyLevel, strategy: Strategy) -> DynamicLimits {
    let s = safety_multipliers(level);
    let t = strategy_multipliers(strategy);
    DynamicLimits {
        max_orchestrator_loops: (base.max_orchestrator_loops as f64 * s.loops * t.loops) as u32,
        max_tool_executions: (base.max_tool_executions as f64 * s.tools * t.tools) as u32,
        max_domain_attempts: (base.max_domain_attempts as f64 * s.domains * t.domains) as u32,
        max_investigation_time_minutes: (base.max_investigation_time_minutes as f64
            * s.time
            * t.time) as u32,
        confidence_threshold_for_override: base.confidence_threshold_for_override,
        resource_pressure_threshold: base.resource_pressure_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_adaptive_keeps_base_table() {
        let limits = effective_limits(BASE_LIMITS_LIVE, SafetyLevel::Standard, Strategy::Adaptive);
        assert_eq!(limits, BASE_LIMITS_LIVE);
    }

    #[test]
    fn emergency_halves_every_axis() {
        let limits = effective_limits(BASE_LIMITS_LIVE, SafetyLevel::Emergency, Strategy::Adaptive);
        assert_eq!(limits.max_orchestrator_loops, 12);
        assert_eq!(limits.max_tool_executions, 7);
        assert_eq!(limits.max_domain_attempts, 5);
        assert_eq!(limits.max_investigation_time_minutes, 15);
    }

    #[test]
    fn minimal_strategy_cuts_domain_budget_hardest() {
        let limits = effective_limits(BASE_LIMITS_TEST, SafetyLevel::Standard, Strategy::Minimal);
        assert_eq!(limits.max_domain_attempts, 1); // 6 * 0.3
        assert_eq!(limits.max_orchestrator_loops, 7); // 12 * 0.6
    }

    #[test]
    fn thresholds_pass_through_unscaled() {
        let limits = effective_limits(
            BASE_LIMITS_LIVE,
            SafetyLevel::Permissive,
            Strategy::Comprehensive,
        );
        assert_eq!(limits.confidence_threshold_for_override, 0.4);
        assert_eq!(limits.resource_pressure_threshold, 0.7);
    }
}
