//! Scenario harness for the investigation orchestrator.
//!
//! Runs named end-to-end scenarios against mock ports and reports the
//! results. Exit code 0 only when every selected scenario passes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use futures::stream::{self, StreamExt};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use inquest_config::{EvidenceConfig, InvestigationConfig, Mode};
use inquest_contracts::{
    ConfidenceLevel, Domain, EntityType, InquestError, InvestigationState, ProviderErrorKind,
    RecommendedAction, SafetyConcernType, Severity, Strategy,
};
use inquest_orchestration::testkit::{
    make_decision, sequential_recommendation, FnAssessor, MockAgentRunner, MockAssistant,
    MockBootstrapper, MockToolInvoker, RecordingSink,
};
use inquest_orchestration::{
    decide, rollout_hash, DeploymentMode, ExecutorPorts, FeatureFlags, GraphExecutor, GraphKind,
    GraphSelector, MemoryCheckpointer, Node, SafetyManager, SafetyStatus,
};

const SCENARIOS: [&str; 6] = [
    "high_confidence_critical_path",
    "evidence_gated",
    "loop_limit_termination",
    "provider_context_length",
    "safety_override",
    "ab_routing",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Mock,
    Demo,
    Live,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Mode {
        match arg {
            ModeArg::Mock => Mode::Mock,
            ModeArg::Demo => Mode::Demo,
            ModeArg::Live => Mode::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Html,
    Json,
    Markdown,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "UPPERCASE")]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "inquest", about = "Hybrid investigation orchestrator scenario harness")]
struct Cli {
    /// Run a single named scenario.
    #[arg(long)]
    scenario: Option<String>,

    /// Run every scenario.
    #[arg(long)]
    all: bool,

    /// Entity to investigate.
    #[arg(long, default_value = "203.0.113.7")]
    entity_id: String,

    /// Entity type: ip_address, user_id, device_id, transaction_id.
    #[arg(long, default_value = "ip_address")]
    entity_type: String,

    /// Scenarios to run concurrently.
    #[arg(long, default_value_t = 1)]
    concurrent: usize,

    /// Per-scenario timeout in seconds.
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Execution mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Mock)]
    mode: ModeArg,

    /// Server URL for remote result inspection.
    #[arg(long)]
    server_url: Option<String>,

    /// Report output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    output_format: OutputFormat,

    /// Directory for report files.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Custom prompt forwarded to the investigation configuration.
    #[arg(long)]
    custom_prompt: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
struct ScenarioReport {
    name: String,
    passed: bool,
    details: String,
}

fn build_executor(
    mode: Mode,
    assessor: Arc<FnAssessor>,
    agents: Arc<MockAgentRunner>,
    assistant: Arc<MockAssistant>,
    bootstrapper: Arc<MockBootstrapper>,
    sink: Arc<RecordingSink>,
) -> GraphExecutor {
    GraphExecutor::new(
        mode,
        EvidenceConfig::default(),
        ExecutorPorts {
            bootstrapper,
            assistant,
            agents,
            tools: Arc::new(MockToolInvoker::default()),
            assessor,
            checkpointer: Arc::new(MemoryCheckpointer::new()),
            sink,
            monitor: None,
        },
    )
}

fn snowflake_bootstrapper(indicators: &[&str]) -> MockBootstrapper {
    MockBootstrapper {
        init_result: serde_json::json!({
            "snowflake_data": {"transactions": 64, "distinct_devices": 5, "chargebacks": 2},
            "snowflake_quality": 0.9,
            "snowflake_completed": true,
            "risk_indicators": indicators,
        }),
        ..Default::default()
    }
}

fn initial_state(config: &InvestigationConfig, investigation_id: &str) -> InvestigationState {
    InvestigationState::create_initial(config.seed(investigation_id))
}

async fn high_confidence_critical_path(config: &InvestigationConfig) -> anyhow::Result<String> {
    let sink = Arc::new(RecordingSink::default());
    let assessor = Arc::new(FnAssessor::new(|_, snapshot| {
        let action = if snapshot.domains_completed.contains(&Domain::Risk) {
            RecommendedAction::Summary
        } else {
            RecommendedAction::Agent(Domain::Risk)
        };
        Ok(make_decision(0.9, ConfidenceLevel::High, Strategy::CriticalPath, action))
    }));
    let executor = build_executor(
        config.mode,
        assessor,
        Arc::new(MockAgentRunner::healthy()),
        Arc::new(MockAssistant {
            tools_to_request: Vec::new(),
            ..Default::default()
        }),
        Arc::new(snowflake_bootstrapper(&["device_spoof"])),
        sink.clone(),
    );

    let outcome = executor
        .run(initial_state(config, "scenario-critical-path"))
        .await?;
    anyhow::ensure!(outcome.success, "outcome not successful: {:?}", outcome.status);
    anyhow::ensure!(
        outcome.status == inquest_contracts::InvestigationStatus::Completed,
        "expected COMPLETED, got {:?}",
        outcome.status
    );
    let state = sink.last_state().context("state persisted")?;
    anyhow::ensure!(
        state.domains_completed.contains(&Domain::Risk),
        "risk agent did not run"
    );
    anyhow::ensure!(state.domains_completed.len() == 1, "critical path ran extra agents");
    let score = outcome
        .risk_assessment
        .final_risk_score
        .context("risk score emitted")?;
    if score >= 0.7 {
        anyhow::ensure!(
            matches!(
                outcome.risk_assessment.fraud_likelihood,
                inquest_contracts::FraudLikelihood::High
                    | inquest_contracts::FraudLikelihood::VeryHigh
            ),
            "likelihood does not match score {}",
            score
        );
    }
    Ok(format!(
        "status={:?} risk={:.2} loops={}",
        outcome.status, score, outcome.performance_metrics.orchestrator_loops
    ))
}

async fn evidence_gated(config: &InvestigationConfig) -> anyhow::Result<String> {
    let sink = Arc::new(RecordingSink::default());
    let assessor = Arc::new(FnAssessor::new(|_, snapshot| {
        Ok(make_decision(
            0.3,
            ConfidenceLevel::Low,
            Strategy::Adaptive,
            sequential_recommendation(snapshot),
        ))
    }));
    let executor = build_executor(
        config.mode,
        assessor,
        Arc::new(MockAgentRunner::insufficient()),
        Arc::new(MockAssistant::default()),
        Arc::new(MockBootstrapper::default()),
        sink.clone(),
    );

    let outcome = executor
        .run(initial_state(config, "scenario-evidence-gated"))
        .await?;
    anyhow::ensure!(
        outcome.risk_assessment.final_risk_score.is_none(),
        "risk score should be gated"
    );
    anyhow::ensure!(
        outcome.status == inquest_contracts::InvestigationStatus::CompletedWithWarnings,
        "expected COMPLETED_WITH_WARNINGS, got {:?}",
        outcome.status
    );
    let state = sink.last_state().context("state persisted")?;
    anyhow::ensure!(
        state
            .safety_concerns
            .iter()
            .any(|c| c.concern_type == SafetyConcernType::EvidenceInsufficient),
        "missing evidence-insufficiency concern"
    );
    Ok(format!(
        "status={:?} gated=yes domains={}",
        outcome.status,
        state.domain_findings.len()
    ))
}

async fn loop_limit_termination(config: &InvestigationConfig) -> anyhow::Result<String> {
    let sink = Arc::new(RecordingSink::default());
    let assessor = Arc::new(FnAssessor::new(|_, _| {
        Ok(make_decision(
            0.3,
            ConfidenceLevel::Low,
            Strategy::Adaptive,
            RecommendedAction::Tools,
        ))
    }));
    let executor = build_executor(
        config.mode,
        assessor,
        Arc::new(MockAgentRunner::healthy()),
        Arc::new(MockAssistant {
            tools_to_request: Vec::new(),
            ..Default::default()
        }),
        Arc::new(snowflake_bootstrapper(&[])),
        sink.clone(),
    );

    let outcome = executor
        .run(initial_state(config, "scenario-loop-limit"))
        .await?;
    anyhow::ensure!(
        outcome.status == inquest_contracts::InvestigationStatus::TerminatedBySafety,
        "expected TERMINATED_BY_SAFETY, got {:?}",
        outcome.status
    );
    let state = sink.last_state().context("state persisted")?;
    anyhow::ensure!(
        state.safety_concerns.iter().any(|c| {
            c.concern_type == SafetyConcernType::LoopRisk && c.severity == Severity::Critical
        }),
        "missing critical loop-risk concern"
    );
    anyhow::ensure!(
        state.orchestrator_loops >= state.dynamic_limits.max_orchestrator_loops,
        "terminated before the effective loop limit"
    );
    Ok(format!(
        "status={:?} loops={} limit={}",
        outcome.status, state.orchestrator_loops, state.dynamic_limits.max_orchestrator_loops
    ))
}

async fn provider_context_length(config: &InvestigationConfig) -> anyhow::Result<String> {
    let sink = Arc::new(RecordingSink::default());
    let assessor = Arc::new(FnAssessor::new(|call, snapshot| {
        if call >= 3 {
            Err(InquestError::Provider {
                kind: ProviderErrorKind::ContextLengthExceeded,
                message: "prompt exceeds the model context window".into(),
            })
        } else {
            Ok(make_decision(
                0.3,
                ConfidenceLevel::Low,
                Strategy::Adaptive,
                sequential_recommendation(snapshot),
            ))
        }
    }));
    let executor = build_executor(
        config.mode,
        assessor,
        Arc::new(MockAgentRunner::healthy()),
        Arc::new(MockAssistant::default()),
        Arc::new(MockBootstrapper::default()),
        sink.clone(),
    );

    let result = executor
        .run(initial_state(config, "scenario-provider-error"))
        .await;
    match result {
        Err(InquestError::Provider {
            kind: ProviderErrorKind::ContextLengthExceeded,
            ..
        }) => {}
        other => anyhow::bail!("expected context-length provider error, got {:?}", other.map(|o| o.status)),
    }
    anyhow::ensure!(
        !sink.outcomes.lock().iter().any(|o| o.success),
        "no successful outcome may exist after a provider error"
    );
    Ok("provider error surfaced without fallback synthesis".to_string())
}

async fn safety_override(config: &InvestigationConfig) -> anyhow::Result<String> {
    // Router-level check at exactly the conditions of interest: the AI
    // recommends tools at pressure 0.85 with low confidence.
    let mut state = initial_state(config, "scenario-safety-override");
    state.snowflake_completed = true;
    state
        .tool_results
        .insert("ip_reputation".into(), serde_json::json!({"score": 40}));
    state.ai_confidence_level = ConfidenceLevel::Low;

    let decision = make_decision(
        0.3,
        ConfidenceLevel::Low,
        Strategy::Adaptive,
        RecommendedAction::Tools,
    );
    let manager = SafetyManager::new(config.mode, config.evidence.clone());
    let baseline = manager.validate(&state);
    let safety = SafetyStatus {
        allows_ai_control: false,
        requires_immediate_termination: false,
        resource_pressure: 0.85,
        ..baseline
    };

    let routed = decide(&state, &decision, &safety);
    anyhow::ensure!(routed.safety_override, "expected a safety override");
    anyhow::ensure!(
        routed.next_node == Node::Agent(Domain::Network),
        "expected sequential network agent, got {}",
        routed.next_node
    );
    let pending = routed.pending_override.context("override recorded")?;
    anyhow::ensure!(
        pending.concern_type == SafetyConcernType::ResourcePressure,
        "expected resource-pressure concern, got {:?}",
        pending.concern_type
    );
    state.add_safety_override(
        &pending.original,
        &pending.chosen,
        pending.concern_type,
        pending.reasoning,
    );
    anyhow::ensure!(state.safety_overrides.len() == 1, "override not recorded");
    Ok(format!(
        "next={} override_concern={:?}",
        routed.next_node, state.safety_overrides[0].concern_type
    ))
}

async fn ab_routing(config: &InvestigationConfig) -> anyhow::Result<String> {
    let mut flags = FeatureFlags::with_defaults();
    flags.enable(
        inquest_orchestration::flags::AB_TEST_HYBRID_VS_CLEAN,
        100,
        DeploymentMode::AbTest,
    );
    let selector = GraphSelector::new(flags);

    let hybrid_id = (0..10_000)
        .map(|i| format!("case-{}", i))
        .find(|id| rollout_hash(id) < 50)
        .context("hybrid-arm id")?;
    let sequential_id = (0..10_000)
        .map(|i| format!("case-{}", i))
        .find(|id| rollout_hash(id) >= 50)
        .context("sequential-arm id")?;

    let hybrid_kind = selector.choose(&hybrid_id, config.entity_type.as_str(), None);
    let sequential_kind = selector.choose(&sequential_id, config.entity_type.as_str(), None);
    anyhow::ensure!(hybrid_kind == GraphKind::Hybrid, "hybrid arm misassigned");
    anyhow::ensure!(
        sequential_kind == GraphKind::Sequential,
        "sequential arm misassigned"
    );

    // Both arms must produce schema-identical outcomes.
    let mut keysets = Vec::new();
    for id in [&hybrid_id, &sequential_id] {
        let sink = Arc::new(RecordingSink::default());
        let assessor = Arc::new(FnAssessor::new(|_, snapshot| {
            Ok(make_decision(
                0.3,
                ConfidenceLevel::Low,
                Strategy::Adaptive,
                sequential_recommendation(snapshot),
            ))
        }));
        let executor = build_executor(
            config.mode,
            assessor,
            Arc::new(MockAgentRunner::healthy()),
            Arc::new(MockAssistant::default()),
            Arc::new(MockBootstrapper::default()),
            sink,
        );
        let outcome = executor.run(initial_state(config, id)).await?;
        let value = serde_json::to_value(&outcome)?;
        let keys: Vec<String> = value
            .as_object()
            .context("outcome object")?
            .keys()
            .cloned()
            .collect();
        keysets.push(keys);
    }
    anyhow::ensure!(keysets[0] == keysets[1], "outcome schemas diverge between arms");

    Ok(format!(
        "{} -> hybrid, {} -> sequential, schemas identical",
        hybrid_id, sequential_id
    ))
}

async fn run_scenario(name: String, config: InvestigationConfig, timeout: Duration) -> ScenarioReport {
    info!(scenario = %name, "scenario starting");
    let outcome = tokio::time::timeout(timeout, async {
        match name.as_str() {
            "high_confidence_critical_path" => high_confidence_critical_path(&config).await,
            "evidence_gated" => evidence_gated(&config).await,
            "loop_limit_termination" => loop_limit_termination(&config).await,
            "provider_context_length" => provider_context_length(&config).await,
            "safety_override" => safety_override(&config).await,
            "ab_routing" => ab_routing(&config).await,
            other => anyhow::bail!("unknown scenario '{}'", other),
        }
    })
    .await;

    match outcome {
        Ok(Ok(details)) => ScenarioReport {
            name,
            passed: true,
            details,
        },
        Ok(Err(err)) => ScenarioReport {
            name,
            passed: false,
            details: format!("{:#}", err),
        },
        Err(_) => ScenarioReport {
            name,
            passed: false,
            details: "scenario timed out".to_string(),
        },
    }
}

fn render_report(reports: &[ScenarioReport], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(reports).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Markdown => {
            let mut out = String::from("| Scenario | Result | Details |\n|---|---|---|\n");
            for report in reports {
                out.push_str(&format!(
                    "| {} | {} | {} |\n",
                    report.name,
                    if report.passed { "pass" } else { "FAIL" },
                    report.details
                ));
            }
            out
        }
        OutputFormat::Html => {
            let mut out = String::from("<html><body><h1>Scenario results</h1><ul>");
            for report in reports {
                out.push_str(&format!(
                    "<li><b>{}</b>: {} - {}</li>",
                    report.name,
                    if report.passed { "pass" } else { "FAIL" },
                    report.details
                ));
            }
            out.push_str("</ul></body></html>");
            out
        }
        OutputFormat::Terminal => {
            let mut out = String::new();
            for report in reports {
                out.push_str(&format!(
                    "{:<32} {:<5} {}\n",
                    report.name,
                    if report.passed { "pass" } else { "FAIL" },
                    report.details
                ));
            }
            out
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let session_id = uuid::Uuid::new_v4();
    info!(session = %session_id, "harness session starting");
    if let Some(url) = &cli.server_url {
        debug!(server_url = %url, "server URL configured");
    }

    let mode: Mode = cli.mode.into();
    let entity_type = EntityType::parse(&cli.entity_type)
        .with_context(|| format!("invalid entity type '{}'", cli.entity_type))?;
    let mut config = InvestigationConfig::new(mode, cli.entity_id.clone(), entity_type);
    if cli.custom_prompt.is_some() {
        config.custom_user_prompt = cli.custom_prompt.clone();
    }

    let selected: Vec<String> = match (&cli.scenario, cli.all) {
        (Some(name), _) => vec![name.clone()],
        _ => SCENARIOS.iter().map(|s| s.to_string()).collect(),
    };
    let timeout = Duration::from_secs(cli.timeout);

    let reports: Vec<ScenarioReport> = stream::iter(selected.into_iter().map(|name| {
        let config = config.clone();
        run_scenario(name, config, timeout)
    }))
    .buffer_unordered(cli.concurrent.max(1))
    .collect()
    .await;

    let rendered = render_report(&reports, cli.output_format);
    if let Some(dir) = &cli.output_dir {
        std::fs::create_dir_all(dir)?;
        let extension = match cli.output_format {
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
            OutputFormat::Terminal => "txt",
        };
        let path = dir.join(format!("scenario_report.{}", extension));
        std::fs::write(&path, &rendered)?;
        info!(path = %path.display(), "report written");
    }
    print!("{}", rendered);

    if reports.iter().all(|r| r.passed) {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
