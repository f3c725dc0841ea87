//! Feature flags, percentage rollout, A/B assignment, and the graph
//! selector with rollback triggers.
//!
//! The registry is process-scoped with an explicit lifecycle: built at
//! startup, environment overrides applied once, per-investigation
//! evaluation pure. Rollout assignment hashes the investigation id with a
//! stable digest so it survives restarts.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

/// Deployment modes for gradual rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Disabled,
    Canary,
    AbTest,
    FullRollout,
}

/// One flag's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagState {
    pub enabled: bool,
    pub rollout_percentage: u8,
    pub deployment_mode: DeploymentMode,
    /// A/B split: percentage assigned to the treatment arm.
    pub test_split: Option<u8>,
}

impl FlagState {
    fn off() -> Self {
        FlagState {
            enabled: false,
            rollout_percentage: 0,
            deployment_mode: DeploymentMode::Disabled,
            test_split: None,
        }
    }

    fn on() -> Self {
        FlagState {
            enabled: true,
            rollout_percentage: 100,
            deployment_mode: DeploymentMode::FullRollout,
            test_split: None,
        }
    }
}

/// Environment variable prefix for flag overrides.
pub const FLAG_ENV_PREFIX: &str = "HYBRID_FLAG_";

/// Core flag names.
pub const HYBRID_GRAPH_V1: &str = "hybrid_graph_v1";
pub const AB_TEST_HYBRID_VS_CLEAN: &str = "ab_test_hybrid_vs_clean";
pub const PERFORMANCE_MONITORING: &str = "hybrid_performance_monitoring";
pub const AUDIT_LOGGING: &str = "hybrid_audit_logging";

/// The flag registry.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    flags: BTreeMap<String, FlagState>,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl FeatureFlags {
    /// Default flag table: the hybrid graph and A/B test start disabled;
    /// monitoring and audit logging are always on.
    pub fn with_defaults() -> Self {
        let mut flags = BTreeMap::new();
        flags.insert(HYBRID_GRAPH_V1.to_string(), FlagState::off());
        flags.insert(
            AB_TEST_HYBRID_VS_CLEAN.to_string(),
            FlagState {
                test_split: Some(50),
                ..FlagState::off()
            },
        );
        flags.insert(PERFORMANCE_MONITORING.to_string(), FlagState::on());
        flags.insert(AUDIT_LOGGING.to_string(), FlagState::on());

        let mut registry = FeatureFlags { flags };
        registry.apply_env_overrides();
        registry
    }

    /// Applies `HYBRID_FLAG_<NAME>=true|false` overrides, forcing full
    /// rollout on or off.
    pub fn apply_env_overrides(&mut self) {
        for (name, flag) in self.flags.iter_mut() {
            let var = format!("{}{}", FLAG_ENV_PREFIX, name.to_ascii_uppercase());
            let Ok(value) = std::env::var(&var) else {
                continue;
            };
            match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    flag.enabled = true;
                    flag.rollout_percentage = 100;
                    info!(flag = %name, var = %var, "environment override: flag enabled");
                }
                "false" | "0" | "no" | "off" => {
                    flag.enabled = false;
                    flag.rollout_percentage = 0;
                    info!(flag = %name, var = %var, "environment override: flag disabled");
                }
                other => warn!(flag = %name, value = other, "unrecognized flag override ignored"),
            }
        }
    }

    /// Whether a flag is on for this investigation. Pure per evaluation.
    pub fn is_enabled(&self, name: &str, investigation_id: Option<&str>) -> bool {
        let Some(flag) = self.flags.get(name) else {
            warn!(flag = name, "unknown feature flag");
            return false;
        };
        if !flag.enabled || flag.rollout_percentage == 0 {
            return false;
        }
        if flag.rollout_percentage >= 100 {
            return true;
        }
        match investigation_id {
            Some(id) => rollout_hash(id) < flag.rollout_percentage,
            None => true,
        }
    }

    pub fn enable(&mut self, name: &str, rollout_percentage: u8, mode: DeploymentMode) {
        let Some(flag) = self.flags.get_mut(name) else {
            error!(flag = name, "cannot enable unknown flag");
            return;
        };
        flag.enabled = true;
        flag.rollout_percentage = rollout_percentage.min(100);
        flag.deployment_mode = mode;
        info!(flag = name, rollout = rollout_percentage, "feature flag enabled");
    }

    pub fn disable(&mut self, name: &str, reason: &str) {
        let Some(flag) = self.flags.get_mut(name) else {
            error!(flag = name, "cannot disable unknown flag");
            return;
        };
        flag.enabled = false;
        flag.rollout_percentage = 0;
        flag.deployment_mode = DeploymentMode::Disabled;
        warn!(flag = name, reason, "feature flag disabled");
    }

    pub fn status(&self, name: &str) -> Option<&FlagState> {
        self.flags.get(name)
    }

    /// Names of all currently-enabled flags.
    pub fn active_flags(&self) -> Vec<String> {
        self.flags
            .iter()
            .filter(|(_, f)| f.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn test_split(&self, name: &str) -> u8 {
        self.flags
            .get(name)
            .and_then(|f| f.test_split)
            .unwrap_or(50)
    }
}

/// Stable percentage bucket for an investigation id.
pub fn rollout_hash(investigation_id: &str) -> u8 {
    let digest = Sha256::digest(investigation_id.as_bytes());
    let mut value = [0u8; 8];
    value.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(value) % 100) as u8
}

/// Which graph implementation serves an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphKind {
    Hybrid,
    Sequential,
}

/// Rollback thresholds over recorded investigation outcomes.
#[derive(Debug, Clone, Copy)]
pub struct RollbackThresholds {
    pub error_rate: f64,
    pub performance_degradation: f64,
    pub safety_override_rate: f64,
    pub failure_rate: f64,
    /// Minimum outcomes before rates are meaningful.
    pub min_sample: u64,
}

impl Default for RollbackThresholds {
    fn default() -> Self {
        RollbackThresholds {
            error_rate: 0.1,
            performance_degradation: 0.2,
            safety_override_rate: 0.3,
            failure_rate: 0.15,
            min_sample: 10,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct OutcomeStats {
    total: u64,
    errored: u64,
    failed: u64,
    with_overrides: u64,
    degraded: u64,
}

/// Automatic rollback state. Once tripped, every future selection returns
/// the sequential graph until explicitly cleared.
#[derive(Debug)]
pub struct RollbackTriggers {
    thresholds: RollbackThresholds,
    stats: OutcomeStats,
    active: bool,
    reason: Option<String>,
}

impl Default for RollbackTriggers {
    fn default() -> Self {
        RollbackTriggers {
            thresholds: RollbackThresholds::default(),
            stats: OutcomeStats::default(),
            active: false,
            reason: None,
        }
    }
}

impl RollbackTriggers {
    pub fn should_rollback(&self) -> bool {
        self.active
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn trigger(&mut self, reason: &str) {
        self.active = true;
        self.reason = Some(reason.to_string());
        error!(reason, "rollback triggered; all investigations use the sequential graph");
    }

    pub fn clear(&mut self) {
        self.active = false;
        self.reason = None;
        self.stats = OutcomeStats::default();
        info!("rollback cleared; hybrid graph available");
    }

    /// Records one hybrid-graph outcome and evaluates the thresholds.
    pub fn record_outcome(
        &mut self,
        errored: bool,
        failed: bool,
        had_overrides: bool,
        degraded: bool,
    ) {
        self.stats.total += 1;
        if errored {
            self.stats.errored += 1;
        }
        if failed {
            self.stats.failed += 1;
        }
        if had_overrides {
            self.stats.with_overrides += 1;
        }
        if degraded {
            self.stats.degraded += 1;
        }

        if self.active || self.stats.total < self.thresholds.min_sample {
            return;
        }
        let total = self.stats.total as f64;
        if self.stats.errored as f64 / total > self.thresholds.error_rate {
            self.trigger("error rate over threshold");
        } else if self.stats.failed as f64 / total > self.thresholds.failure_rate {
            self.trigger("failure rate over threshold");
        } else if self.stats.with_overrides as f64 / total > self.thresholds.safety_override_rate {
            self.trigger("safety override rate over threshold");
        } else if self.stats.degraded as f64 / total > self.thresholds.performance_degradation {
            self.trigger("performance degradation over threshold");
        }
    }
}

/// Selects the graph implementation per investigation.
pub struct GraphSelector {
    flags: RwLock<FeatureFlags>,
    rollback: Mutex<RollbackTriggers>,
}

impl Default for GraphSelector {
    fn default() -> Self {
        Self::new(FeatureFlags::with_defaults())
    }
}

impl GraphSelector {
    pub fn new(flags: FeatureFlags) -> Self {
        GraphSelector {
            flags: RwLock::new(flags),
            rollback: Mutex::new(RollbackTriggers::default()),
        }
    }

    /// Chooses the graph for an investigation.
    pub fn choose(
        &self,
        investigation_id: &str,
        entity_type: &str,
        force: Option<GraphKind>,
    ) -> GraphKind {
        if let Some(forced) = force {
            debug!(investigation_id, ?forced, "graph selection forced");
            return forced;
        }

        if self.rollback.lock().should_rollback() {
            warn!(investigation_id, "rollback active; sequential graph selected");
            return GraphKind::Sequential;
        }

        let flags = self.flags.read();
        if flags.is_enabled(HYBRID_GRAPH_V1, Some(investigation_id)) {
            debug!(investigation_id, entity_type, "hybrid graph selected");
            return GraphKind::Hybrid;
        }
        if flags.is_enabled(AB_TEST_HYBRID_VS_CLEAN, Some(investigation_id)) {
            let split = flags.test_split(AB_TEST_HYBRID_VS_CLEAN);
            let assignment = if rollout_hash(investigation_id) < split {
                GraphKind::Hybrid
            } else {
                GraphKind::Sequential
            };
            info!(investigation_id, ?assignment, split, "A/B test assignment");
            return assignment;
        }

        debug!(investigation_id, "sequential graph selected (default)");
        GraphKind::Sequential
    }

    pub fn record_outcome(
        &self,
        errored: bool,
        failed: bool,
        had_overrides: bool,
        degraded: bool,
    ) {
        self.rollback
            .lock()
            .record_outcome(errored, failed, had_overrides, degraded);
    }

    pub fn trigger_rollback(&self, reason: &str) {
        self.rollback.lock().trigger(reason);
    }

    pub fn clear_rollback(&self) {
        self.rollback.lock().clear();
    }

    pub fn with_flags<R>(&self, f: impl FnOnce(&mut FeatureFlags) -> R) -> R {
        f(&mut self.flags.write())
    }

    pub fn active_flags(&self) -> Vec<String> {
        self.flags.read().active_flags()
    }
}

static SELECTOR: OnceCell<GraphSelector> = OnceCell::new();

/// Initializes the process-scoped selector. Later calls are ignored.
pub fn init_graph_selector(flags: FeatureFlags) -> &'static GraphSelector {
    SELECTOR.get_or_init(|| GraphSelector::new(flags))
}

/// The process-scoped selector, initialized with defaults on first use.
pub fn graph_selector() -> &'static GraphSelector {
    SELECTOR.get_or_init(GraphSelector::default)
}
