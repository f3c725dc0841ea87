//! Per-investigation configuration assembled from defaults and environment.

use inquest_contracts::{ConfidenceLevel, EntityType, StateSeed, Strategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{base_limits, EvidenceConfig, Mode};

/// Everything needed to start one investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationConfig {
    pub mode: Mode,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub max_tools: u32,
    pub tool_count: u32,
    pub date_range_days: u32,
    pub parallel_execution: bool,
    pub use_snowflake: bool,
    pub custom_user_prompt: Option<String>,
    pub initial_strategy: Strategy,
    /// Forces a confidence level, for testing.
    pub force_confidence_level: Option<ConfidenceLevel>,
    pub evidence: EvidenceConfig,
}

impl InvestigationConfig {
    /// Builds a configuration for an entity, resolving `USE_SNOWFLAKE` and
    /// `CUSTOM_USER_PROMPT` from the environment.
    pub fn new(mode: Mode, entity_id: impl Into<String>, entity_type: EntityType) -> Self {
        let use_snowflake = std::env::var("USE_SNOWFLAKE")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off"))
            .unwrap_or(true);
        let custom_user_prompt = std::env::var("CUSTOM_USER_PROMPT")
            .ok()
            .filter(|v| !v.is_empty());

        debug!(
            mode = mode.as_str(),
            use_snowflake, "investigation configuration resolved"
        );

        InvestigationConfig {
            mode,
            entity_id: entity_id.into(),
            entity_type,
            max_tools: 52,
            tool_count: 5,
            date_range_days: 7,
            parallel_execution: true,
            use_snowflake,
            custom_user_prompt,
            initial_strategy: Strategy::Adaptive,
            force_confidence_level: None,
            evidence: EvidenceConfig::default(),
        }
    }

    /// Produces the state seed for a new investigation, with dynamic limits
    /// from the mode's base table.
    pub fn seed(&self, investigation_id: impl Into<String>) -> StateSeed {
        StateSeed {
            investigation_id: investigation_id.into(),
            entity_id: self.entity_id.clone(),
            entity_type: self.entity_type,
            parallel_execution: self.parallel_execution,
            max_tools: self.max_tools,
            tool_count: self.tool_count,
            date_range_days: self.date_range_days,
            custom_user_prompt: self.custom_user_prompt.clone(),
            initial_strategy: self.initial_strategy,
            force_confidence_level: self.force_confidence_level,
            dynamic_limits: base_limits(self.mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_uses_mode_base_limits() {
        let config = InvestigationConfig::new(Mode::Mock, "10.0.0.1", EntityType::IpAddress);
        let seed = config.seed("inv-1");
        assert_eq!(seed.dynamic_limits.max_orchestrator_loops, 12);

        let config = InvestigationConfig::new(Mode::Live, "10.0.0.1", EntityType::IpAddress);
        let seed = config.seed("inv-2");
        assert_eq!(seed.dynamic_limits.max_orchestrator_loops, 25);
    }

    #[test]
    fn defaults_cover_tool_budget() {
        let config = InvestigationConfig::new(Mode::Mock, "u-1", EntityType::UserId);
        assert_eq!(config.max_tools, 52);
        assert_eq!(config.tool_count, 5);
        assert_eq!(config.date_range_days, 7);
        assert_eq!(config.initial_strategy, Strategy::Adaptive);
    }
}
