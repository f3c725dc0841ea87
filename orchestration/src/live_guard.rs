//! Live-mode cost and time guard.
//!
//! Runs that spend real money sit behind four independent circuit
//! breakers: cost, time, error, and a manual kill switch. Any tripped
//! breaker denies new investigations and halts running ones through the
//! termination path. Tripping also writes a state snapshot under
//! `emergency_states/` and runs the registered emergency callbacks.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use inquest_config::{CostLimits, ErrorLimits, GuardLevel, TimeLimits};
use inquest_resilience::{CircuitBreaker, CircuitBreakerConfig};

/// Reasons for emergency termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStopReason {
    CostLimitExceeded,
    TimeLimitExceeded,
    ErrorRateTooHigh,
    ApiQuotaExhausted,
    ManualKillSwitch,
}

/// Spend categories tracked by source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostSource {
    Snowflake,
    Llm,
    ExternalApi,
}

/// Quota counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    SnowflakeCredits,
    LlmTokens,
    ExternalApiCalls,
}

/// Point-in-time spend snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostSnapshot {
    pub snowflake_costs: f64,
    pub llm_costs: f64,
    pub external_api_costs: f64,
    pub total_costs: f64,
    pub snowflake_credits_used: u64,
    pub llm_tokens_used: u64,
    pub external_api_calls_made: u64,
}

/// Breaker states as reported to callers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BreakerStates {
    pub cost: bool,
    pub time: bool,
    pub error: bool,
    pub manual: bool,
}

impl BreakerStates {
    pub fn any_tripped(&self) -> bool {
        self.cost || self.time || self.error || self.manual
    }
}

/// Guard status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GuardStatus {
    pub allows_operation: bool,
    pub requires_immediate_termination: bool,
    pub level: GuardLevel,
    pub costs: CostSnapshot,
    pub breakers: BreakerStates,
    pub recent_violations: Vec<String>,
}

type EmergencyCallback =
    Box<dyn Fn(EmergencyStopReason, String) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
struct Violation {
    timestamp: chrono::DateTime<Utc>,
    reason: EmergencyStopReason,
    message: String,
}

#[derive(Default)]
struct DollarCosts {
    snowflake: f64,
    llm: f64,
    external_api: f64,
}

impl DollarCosts {
    fn total(&self) -> f64 {
        self.snowflake + self.llm + self.external_api
    }
}

/// The live-mode guard. Applies only to live runs; mock and demo runs
/// never construct one.
pub struct LiveModeGuard {
    level: GuardLevel,
    cost_limits: CostLimits,
    time_limits: TimeLimits,
    error_limits: ErrorLimits,

    costs: Mutex<DollarCosts>,
    snowflake_credits: AtomicU64,
    llm_tokens: AtomicU64,
    external_calls: AtomicU64,

    session_start: Instant,
    investigation_start: Mutex<Option<Instant>>,

    error_history: Mutex<Vec<(Instant, String)>>,
    violations: Mutex<Vec<Violation>>,

    cost_breaker: AtomicBool,
    time_breaker: AtomicBool,
    manual_breaker: AtomicBool,
    error_breaker: CircuitBreaker,

    callbacks: Mutex<Vec<EmergencyCallback>>,
    emergency_dir: PathBuf,
}

impl LiveModeGuard {
    pub fn new(level: GuardLevel, emergency_dir: impl Into<PathBuf>) -> Self {
        let error_limits = ErrorLimits::scaled(level);
        let guard = LiveModeGuard {
            level,
            cost_limits: CostLimits::scaled(level),
            time_limits: TimeLimits::scaled(level),
            error_breaker: CircuitBreaker::new(CircuitBreakerConfig {
                name: "live_mode_errors".into(),
                failure_threshold: error_limits.consecutive_failures as u64,
                success_threshold: 1,
                failure_window: Duration::from_secs(60),
                reset_timeout: Duration::from_secs(error_limits.recovery_time_secs),
            }),
            error_limits,
            costs: Mutex::new(DollarCosts::default()),
            snowflake_credits: AtomicU64::new(0),
            llm_tokens: AtomicU64::new(0),
            external_calls: AtomicU64::new(0),
            session_start: Instant::now(),
            investigation_start: Mutex::new(None),
            error_history: Mutex::new(Vec::new()),
            violations: Mutex::new(Vec::new()),
            cost_breaker: AtomicBool::new(false),
            time_breaker: AtomicBool::new(false),
            manual_breaker: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            emergency_dir: emergency_dir.into(),
        };
        info!(
            level = level.as_str(),
            per_investigation = guard.cost_limits.per_investigation,
            per_session = guard.cost_limits.per_session,
            "live-mode guard initialized"
        );
        guard
    }

    /// The single admission gate for new investigations.
    pub fn can_start_investigation(&self) -> bool {
        if self.breaker_states().any_tripped() {
            self.record_violation(
                EmergencyStopReason::ManualKillSwitch,
                "circuit breakers active".into(),
            );
            return false;
        }
        let total = self.costs.lock().total();
        if total >= self.cost_limits.per_session {
            self.record_violation(
                EmergencyStopReason::CostLimitExceeded,
                format!(
                    "session cost ${:.2} at limit ${:.2}",
                    total, self.cost_limits.per_session
                ),
            );
            return false;
        }
        if self.recent_error_rate() > self.error_limits.error_rate_threshold {
            self.record_violation(
                EmergencyStopReason::ErrorRateTooHigh,
                format!("rolling error rate {:.2} over threshold", self.recent_error_rate()),
            );
            return false;
        }
        true
    }

    /// Marks an investigation as started for per-investigation accounting.
    pub fn begin_investigation(&self, investigation_id: &str) -> bool {
        if !self.can_start_investigation() {
            warn!(investigation_id, "investigation denied by live-mode guard");
            return false;
        }
        *self.investigation_start.lock() = Some(Instant::now());
        debug!(investigation_id, "live-mode investigation monitoring started");
        true
    }

    /// Tracks spend by source and evaluates the cost breaker.
    pub async fn track_cost(&self, source: CostSource, amount: f64) {
        let total = {
            let mut costs = self.costs.lock();
            match source {
                CostSource::Snowflake => costs.snowflake += amount,
                CostSource::Llm => costs.llm += amount,
                CostSource::ExternalApi => costs.external_api += amount,
            }
            costs.total()
        };
        debug!(?source, amount, total, "cost tracked");

        let investigating = self.investigation_start.lock().is_some();
        if investigating && total >= self.cost_limits.per_investigation {
            self.emergency_stop(
                EmergencyStopReason::CostLimitExceeded,
                format!(
                    "investigation cost ${:.2} exceeds limit ${:.2}",
                    total, self.cost_limits.per_investigation
                ),
            )
            .await;
        }
        if total >= self.cost_limits.per_session || total >= self.cost_limits.emergency_stop {
            self.cost_breaker.store(true, Ordering::Relaxed);
            self.emergency_stop(
                EmergencyStopReason::CostLimitExceeded,
                format!(
                    "session cost ${:.2} exceeds limit ${:.2}",
                    total, self.cost_limits.per_session
                ),
            )
            .await;
        }
    }

    /// Tracks quota consumption and evaluates exhaustion.
    pub async fn track_quota(&self, kind: QuotaKind, amount: u64) {
        let (used, limit, label) = match kind {
            QuotaKind::SnowflakeCredits => (
                self.snowflake_credits.fetch_add(amount, Ordering::Relaxed) + amount,
                self.cost_limits.snowflake_credits,
                "snowflake credits",
            ),
            QuotaKind::LlmTokens => (
                self.llm_tokens.fetch_add(amount, Ordering::Relaxed) + amount,
                self.cost_limits.llm_tokens,
                "LLM tokens",
            ),
            QuotaKind::ExternalApiCalls => (
                self.external_calls.fetch_add(amount, Ordering::Relaxed) + amount,
                self.cost_limits.external_api_calls,
                "external API calls",
            ),
        };
        if used >= limit {
            self.cost_breaker.store(true, Ordering::Relaxed);
            self.emergency_stop(
                EmergencyStopReason::ApiQuotaExhausted,
                format!("{} exhausted: {}/{}", label, used, limit),
            )
            .await;
        }
    }

    /// Records an error and evaluates the error breaker: N consecutive
    /// failures within 60-second gaps, or the rolling rate over threshold.
    pub async fn record_error(&self, error_type: &str, message: &str) {
        let now = Instant::now();
        let consecutive = {
            let mut history = self.error_history.lock();
            history.push((now, format!("{}: {}", error_type, message)));
            if history.len() > 100 {
                let drain_to = history.len() - 50;
                history.drain(..drain_to);
            }

            let window = self.error_limits.consecutive_failures as usize;
            history.len() >= window
                && history[history.len() - window..]
                    .windows(2)
                    .all(|pair| pair[1].0.duration_since(pair[0].0) <= Duration::from_secs(60))
        };
        self.error_breaker.record_failure();
        warn!(error_type, message, "live-mode error recorded");

        if consecutive {
            self.emergency_stop(
                EmergencyStopReason::ErrorRateTooHigh,
                format!(
                    "{} consecutive failures within 60s",
                    self.error_limits.consecutive_failures
                ),
            )
            .await;
            return;
        }
        if self.recent_error_rate() > self.error_limits.error_rate_threshold {
            self.emergency_stop(
                EmergencyStopReason::ErrorRateTooHigh,
                format!("rolling error rate {:.2} over threshold", self.recent_error_rate()),
            )
            .await;
        }
    }

    /// Evaluates elapsed time against the session and investigation limits.
    pub async fn check_time(&self) {
        let session_minutes = self.session_start.elapsed().as_secs_f64() / 60.0;
        if session_minutes >= self.time_limits.emergency_timeout_minutes as f64 {
            self.time_breaker.store(true, Ordering::Relaxed);
            self.emergency_stop(
                EmergencyStopReason::TimeLimitExceeded,
                format!("session elapsed {:.1} minutes", session_minutes),
            )
            .await;
            return;
        }
        let investigation_minutes = self
            .investigation_start
            .lock()
            .map(|start| start.elapsed().as_secs_f64() / 60.0);
        if let Some(minutes) = investigation_minutes {
            if minutes >= self.time_limits.per_investigation_minutes as f64 {
                self.time_breaker.store(true, Ordering::Relaxed);
                self.emergency_stop(
                    EmergencyStopReason::TimeLimitExceeded,
                    format!("investigation elapsed {:.1} minutes", minutes),
                )
                .await;
            }
        }
    }

    /// The manual kill switch.
    pub async fn activate_kill_switch(&self, reason: &str) {
        error!(reason, "manual kill switch activated");
        self.manual_breaker.store(true, Ordering::Relaxed);
        self.emergency_stop(EmergencyStopReason::ManualKillSwitch, reason.to_string())
            .await;
    }

    /// Registers a callback to run during emergency stops.
    pub fn register_emergency_callback(&self, callback: EmergencyCallback) {
        self.callbacks.lock().push(callback);
    }

    pub fn status(&self) -> GuardStatus {
        let breakers = self.breaker_states();
        GuardStatus {
            allows_operation: !breakers.any_tripped()
                && self.costs.lock().total() < self.cost_limits.per_session,
            requires_immediate_termination: breakers.any_tripped(),
            level: self.level,
            costs: self.cost_snapshot(),
            breakers,
            recent_violations: self
                .violations
                .lock()
                .iter()
                .rev()
                .take(5)
                .map(|v| v.message.clone())
                .collect(),
        }
    }

    /// Session cost report: spend, per-source breakdown, quota usage, and
    /// remaining budget.
    pub fn cost_report(&self) -> serde_json::Value {
        let costs = self.cost_snapshot();
        let session_minutes = self.session_start.elapsed().as_secs_f64() / 60.0;
        serde_json::json!({
            "session_summary": {
                "duration_minutes": session_minutes,
                "total_cost": costs.total_costs,
                "cost_per_minute": costs.total_costs / session_minutes.max(1.0),
            },
            "cost_breakdown": {
                "snowflake": costs.snowflake_costs,
                "llm": costs.llm_costs,
                "external_apis": costs.external_api_costs,
            },
            "usage_summary": {
                "snowflake_credits": costs.snowflake_credits_used,
                "llm_tokens": costs.llm_tokens_used,
                "external_api_calls": costs.external_api_calls_made,
            },
            "limits_status": {
                "investigation_limit": self.cost_limits.per_investigation,
                "session_limit": self.cost_limits.per_session,
                "remaining_budget": (self.cost_limits.per_session - costs.total_costs).max(0.0),
            },
            "safety_events": {
                "total_violations": self.violations.lock().len(),
                "last_violation": self.violations.lock().last().map(|v| serde_json::json!({
                    "timestamp": v.timestamp,
                    "reason": v.reason,
                    "message": v.message,
                })),
                "error_count": self.error_history.lock().len(),
                "breakers_tripped": self.breaker_states().any_tripped(),
            },
        })
    }

    async fn emergency_stop(&self, reason: EmergencyStopReason, message: String) {
        error!(?reason, %message, "EMERGENCY STOP activated");
        self.record_violation(reason, message.clone());
        self.manual_breaker.store(true, Ordering::Relaxed);

        let pending: Vec<BoxFuture<'static, ()>> = {
            let callbacks = self.callbacks.lock();
            callbacks
                .iter()
                .map(|callback| callback(reason, message.clone()))
                .collect()
        };
        for callback in pending {
            callback.await;
        }

        self.save_emergency_snapshot(reason, &message).await;
    }

    async fn save_emergency_snapshot(&self, reason: EmergencyStopReason, message: &str) {
        let snapshot = serde_json::json!({
            "reason": reason,
            "message": message,
            "timestamp": Utc::now(),
            "cost_tracking": self.cost_snapshot(),
            "recent_errors": self
                .error_history
                .lock()
                .iter()
                .rev()
                .take(10)
                .map(|(_, msg)| msg.clone())
                .collect::<Vec<_>>(),
            "circuit_breakers": self.breaker_states(),
            "safety_level": self.level.as_str(),
        });

        let path = self.emergency_dir.join(format!(
            "emergency_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S%3f")
        ));
        if let Err(err) = tokio::fs::create_dir_all(&self.emergency_dir).await {
            error!(error = %err, "failed to create emergency state directory");
            return;
        }
        match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(&path, bytes).await {
                    error!(error = %err, path = %path.display(), "failed to save emergency state");
                } else {
                    info!(path = %path.display(), "emergency state saved");
                }
            }
            Err(err) => error!(error = %err, "failed to encode emergency state"),
        }
    }

    fn record_violation(&self, reason: EmergencyStopReason, message: String) {
        warn!(?reason, %message, "safety violation recorded");
        self.violations.lock().push(Violation {
            timestamp: Utc::now(),
            reason,
            message,
        });
    }

    /// Error rate over the last ten minutes against an estimated baseline
    /// of one operation per minute.
    fn recent_error_rate(&self) -> f64 {
        let cutoff = Duration::from_secs(600);
        let now = Instant::now();
        let recent = self
            .error_history
            .lock()
            .iter()
            .filter(|(at, _)| now.duration_since(*at) <= cutoff)
            .count();
        recent as f64 / 10.0
    }

    fn breaker_states(&self) -> BreakerStates {
        BreakerStates {
            cost: self.cost_breaker.load(Ordering::Relaxed),
            time: self.time_breaker.load(Ordering::Relaxed),
            error: self.error_breaker.is_open(),
            manual: self.manual_breaker.load(Ordering::Relaxed),
        }
    }

    fn cost_snapshot(&self) -> CostSnapshot {
        let costs = self.costs.lock();
        CostSnapshot {
            snowflake_costs: costs.snowflake,
            llm_costs: costs.llm,
            external_api_costs: costs.external_api,
            total_costs: costs.total(),
            snowflake_credits_used: self.snowflake_credits.load(Ordering::Relaxed),
            llm_tokens_used: self.llm_tokens.load(Ordering::Relaxed),
            external_api_calls_made: self.external_calls.load(Ordering::Relaxed),
        }
    }
}
