//! Live-mode guard limit tables.
//!
//! Cost, time, and error ceilings for runs that spend real money, scaled
//! by the guard level.

use serde::{Deserialize, Serialize};

/// Enforcement levels for live-mode runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardLevel {
    /// Individual component testing.
    ComponentTest,
    /// One investigation only.
    SingleInvestigation,
    /// Small batch testing.
    LimitedBatch,
    /// Production-like operation.
    Operational,
}

impl GuardLevel {
    pub fn cost_multiplier(&self) -> f64 {
        match self {
            GuardLevel::ComponentTest => 0.1,
            GuardLevel::SingleInvestigation => 0.5,
            GuardLevel::LimitedBatch => 0.75,
            GuardLevel::Operational => 1.0,
        }
    }

    pub fn time_multiplier(&self) -> f64 {
        match self {
            GuardLevel::ComponentTest => 0.25,
            GuardLevel::SingleInvestigation => 0.5,
            GuardLevel::LimitedBatch => 0.75,
            GuardLevel::Operational => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardLevel::ComponentTest => "component_test",
            GuardLevel::SingleInvestigation => "single_investigation",
            GuardLevel::LimitedBatch => "limited_batch",
            GuardLevel::Operational => "operational",
        }
    }
}

/// USD and quota ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLimits {
    pub per_investigation: f64,
    pub per_session: f64,
    pub daily_budget: f64,
    /// Absolute maximum; never scaled down.
    pub emergency_stop: f64,
    pub snowflake_credits: u64,
    pub llm_tokens: u64,
    pub external_api_calls: u64,
}

impl Default for CostLimits {
    fn default() -> Self {
        CostLimits {
            per_investigation: 10.00,
            per_session: 100.00,
            daily_budget: 200.00,
            emergency_stop: 500.00,
            snowflake_credits: 100,
            llm_tokens: 1_000_000,
            external_api_calls: 1_000,
        }
    }
}

impl CostLimits {
    pub fn scaled(level: GuardLevel) -> Self {
        let base = CostLimits::default();
        let m = level.cost_multiplier();
        CostLimits {
            per_investigation: base.per_investigation * m,
            per_session: base.per_session * m,
            daily_budget: base.daily_budget * m,
            emergency_stop: base.emergency_stop,
            snowflake_credits: (base.snowflake_credits as f64 * m) as u64,
            llm_tokens: (base.llm_tokens as f64 * m) as u64,
            external_api_calls: (base.external_api_calls as f64 * m) as u64,
        }
    }
}

/// Wall-clock ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLimits {
    pub per_investigation_minutes: u64,
    pub per_phase_minutes: u64,
    pub api_timeout_secs: u64,
    pub emergency_timeout_minutes: u64,
    pub snowflake_query_timeout_secs: u64,
    pub external_api_timeout_secs: u64,
}

impl Default for TimeLimits {
    fn default() -> Self {
        TimeLimits {
            per_investigation_minutes: 30,
            per_phase_minutes: 10,
            api_timeout_secs: 30,
            emergency_timeout_minutes: 60,
            snowflake_query_timeout_secs: 30,
            external_api_timeout_secs: 15,
        }
    }
}

impl TimeLimits {
    pub fn scaled(level: GuardLevel) -> Self {
        let base = TimeLimits::default();
        let m = level.time_multiplier();
        TimeLimits {
            per_investigation_minutes: (base.per_investigation_minutes as f64 * m) as u64,
            per_phase_minutes: (base.per_phase_minutes as f64 * m) as u64,
            api_timeout_secs: base.api_timeout_secs,
            emergency_timeout_minutes: base.emergency_timeout_minutes,
            snowflake_query_timeout_secs: base.snowflake_query_timeout_secs,
            external_api_timeout_secs: base.external_api_timeout_secs,
        }
    }
}

/// Failure-rate ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLimits {
    pub consecutive_failures: u32,
    pub error_rate_threshold: f64,
    pub recovery_time_secs: u64,
    pub api_failure_threshold: u32,
    pub timeout_threshold: u32,
}

impl Default for ErrorLimits {
    fn default() -> Self {
        ErrorLimits {
            consecutive_failures: 3,
            error_rate_threshold: 0.5,
            recovery_time_secs: 300,
            api_failure_threshold: 5,
            timeout_threshold: 3,
        }
    }
}

impl ErrorLimits {
    pub fn scaled(level: GuardLevel) -> Self {
        match level {
            GuardLevel::ComponentTest => ErrorLimits {
                consecutive_failures: 1,
                error_rate_threshold: 0.25,
                api_failure_threshold: 2,
                timeout_threshold: 1,
                ..ErrorLimits::default()
            },
            GuardLevel::SingleInvestigation => ErrorLimits {
                consecutive_failures: 2,
                error_rate_threshold: 0.33,
                api_failure_threshold: 3,
                timeout_threshold: 2,
                ..ErrorLimits::default()
            },
            GuardLevel::LimitedBatch | GuardLevel::Operational => ErrorLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_test_scales_cost_but_not_emergency_stop() {
        let limits = CostLimits::scaled(GuardLevel::ComponentTest);
        assert!((limits.per_investigation - 1.0).abs() < 1e-9);
        assert!((limits.per_session - 10.0).abs() < 1e-9);
        assert!((limits.emergency_stop - 500.0).abs() < 1e-9);
        assert_eq!(limits.llm_tokens, 100_000);
    }

    #[test]
    fn api_timeouts_are_level_independent() {
        let limits = TimeLimits::scaled(GuardLevel::ComponentTest);
        assert_eq!(limits.api_timeout_secs, 30);
        assert_eq!(limits.per_investigation_minutes, 7); // 30 * 0.25
    }

    #[test]
    fn stricter_levels_tighten_error_limits() {
        assert_eq!(ErrorLimits::scaled(GuardLevel::ComponentTest).consecutive_failures, 1);
        assert_eq!(ErrorLimits::scaled(GuardLevel::SingleInvestigation).consecutive_failures, 2);
        assert_eq!(ErrorLimits::scaled(GuardLevel::Operational).consecutive_failures, 3);
    }
}
