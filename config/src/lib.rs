//! Configuration surface: execution modes, safety threshold tables,
//! evidence validation defaults, and live-mode guard limits.

pub mod evidence;
pub mod guard;
pub mod investigation;
pub mod limits;
pub mod mode;

pub use evidence::EvidenceConfig;
pub use guard::{CostLimits, ErrorLimits, GuardLevel, TimeLimits};
pub use investigation::InvestigationConfig;
pub use limits::{
    base_limits, effective_limits, recursion_base, safety_multipliers, strategy_multipliers,
    AxisMultipliers, SafetyLevel, BASE_LIMITS_LIVE, BASE_LIMITS_TEST,
};
pub use mode::Mode;

/// Configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid mode '{0}' (expected mock, demo, or live)")]
    InvalidMode(String),
    #[error("missing required configuration: {0}")]
    Missing(String),
}
