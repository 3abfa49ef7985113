use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use sentinel_approval::ApprovalManager;
use sentinel_bus::EventBus;
use sentinel_domain::config::{Config, ConfigSeverity, ObservabilityConfig};
use sentinel_orchestrator::Orchestrator;
use sentinel_providers::{HttpPlannerClient, HttpWorkerClient, PlannerClient};
use sentinel_routines::{RoutineEngine, RoutineEngineConfig, RoutineStore};
use sentinel_security::{
    CodeShieldScanner, ConversationAnalyzer, NullPromptGuard, PromptGuardScanner, ScanPipeline,
    WorkerClient,
};
use sentinel_sessions::SessionStore;
use sentinel_tools::SentinelToolExecutor;

use sentinel_gateway::auth::{hash_pin, FailureTracker};
use sentinel_gateway::channels::mcp::McpServer;
use sentinel_gateway::channels::subprocess::SubprocessChannel;
use sentinel_gateway::cli::{Cli, Command, ConfigCommand};
use sentinel_gateway::channel::ChannelRouter;
use sentinel_gateway::router;
use sentinel_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            let (config, _path) = sentinel_gateway::cli::load_config()?;
            init_tracing(&config.observability)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Mcp) => {
            let (config, _path) = sentinel_gateway::cli::load_config()?;
            init_tracing(&config.observability)?;
            run_mcp(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, path) = sentinel_gateway::cli::load_config()?;
            if !sentinel_gateway::cli::validate(&config, &path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = sentinel_gateway::cli::load_config()?;
            sentinel_gateway::cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("sentinel {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Installs the `fmt` JSON layer always, plus a `tracing-opentelemetry`
/// layer when `observability.otlp_endpoint` is set and the exporter
/// builds successfully. A collector that refuses the connection at
/// startup doesn't stop the gateway — only the OTLP layer is skipped,
/// local JSON logging is unconditional.
fn init_tracing(cfg: &ObservabilityConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sentinel_gateway=debug"));
    let fmt_layer = tracing_subscriber::fmt::layer().json();

    if let Some(endpoint) = cfg.otlp_endpoint.clone() {
        match build_otlp_exporter(&endpoint) {
            Ok(exporter) => {
                use opentelemetry::global;
                use opentelemetry::trace::TracerProvider as _;
                use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
                use opentelemetry_sdk::Resource;

                let provider = SdkTracerProvider::builder()
                    .with_sampler(Sampler::TraceIdRatioBased(cfg.sample_rate))
                    .with_batch_exporter(exporter)
                    .with_resource(Resource::builder().with_service_name(cfg.service_name.clone()).build())
                    .build();
                let tracer = provider.tracer(cfg.service_name.clone());
                global::set_tracer_provider(provider);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .try_init()?;
                tracing::info!(endpoint, "OTLP trace export enabled");
                return Ok(());
            }
            Err(e) => {
                eprintln!("OTel initialization failed, continuing with local tracing only: {e}");
            }
        }
    }

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;
    Ok(())
}

fn build_otlp_exporter(endpoint: &str) -> anyhow::Result<opentelemetry_otlp::SpanExporter> {
    use opentelemetry_otlp::WithExportConfig;

    opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("building OTLP span exporter")
}

/// Everything the dependency graph builds regardless of which channel(s)
/// end up consuming it — shared between the HTTP gateway and the MCP
/// stdio entrypoint so neither constructs the orchestrator differently.
struct Services {
    orchestrator: Arc<Orchestrator>,
    bus: EventBus,
    approval: Arc<ApprovalManager>,
    routines: Arc<RoutineStore>,
    sessions: Arc<SessionStore>,
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }
    Ok(())
}

fn build_services(config: &Config) -> anyhow::Result<Services> {
    let sessions = Arc::new(SessionStore::new(config.sessions));
    let conversation_analyzer = ConversationAnalyzer::new();
    let prompt_guard = PromptGuardScanner::new(
        Box::new(NullPromptGuard),
        config.security.prompt_guard_threshold,
        config.security.prompt_guard_required,
    );
    let pipeline = Arc::new(ScanPipeline::new(
        &config.security.sensitive_paths,
        &config.security.denied_command_patterns,
        prompt_guard,
    ));
    let code_shield = CodeShieldScanner::new(config.security.code_shield_required);

    let planner: Arc<dyn PlannerClient> =
        Arc::new(HttpPlannerClient::new(&config.providers.planner).context("constructing planner client")?);
    let worker: Arc<dyn WorkerClient> =
        Arc::new(HttpWorkerClient::new(&config.providers.worker).context("constructing worker client")?);

    let approval = Arc::new(ApprovalManager::new(Duration::from_secs(config.approval.timeout_s)));
    let tool_executor = Arc::new(SentinelToolExecutor::new(PathBuf::from(&config.workspace.workspace_path)));
    let bus = EventBus::new();
    let routines = Arc::new(RoutineStore::new());

    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        conversation_analyzer,
        config.conversation,
        pipeline,
        code_shield,
        planner,
        worker,
        tool_executor,
        approval.clone(),
        bus.clone(),
        "sentinel-core",
    ));

    Ok(Services { orchestrator, bus, approval, routines, sessions })
}

/// Runs `sentinel mcp`: the same dependency graph as the HTTP gateway, with
/// the only reachable surface being `McpServer`'s fixed tool set over stdio.
/// No router, no PIN auth, no rate limiting — a local stdio peer is already
/// as trusted as the process invoking it.
async fn run_mcp(config: Arc<Config>) -> anyhow::Result<()> {
    check_config(&config)?;
    let services = build_services(&config)?;
    tracing::info!("Sentinel MCP server starting on stdio");
    let server = McpServer::new(services.orchestrator, services.bus, services.sessions, services.routines);
    server.serve_stdio().await.context("MCP stdio server error")
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Sentinel starting");

    check_config(&config)?;
    let services = build_services(&config)?;
    let Services { orchestrator, bus, approval, routines, sessions } = services;

    if config.channels.messaging_subprocess.enabled {
        let router = Arc::new(ChannelRouter::new(orchestrator.clone(), bus.clone()));
        Arc::new(SubprocessChannel::new(config.channels.messaging_subprocess.clone(), router)).start();
        tracing::info!("messaging subprocess channel enabled");
    }

    let pin_hash = if config.server.pin_required {
        let pin_file = config
            .server
            .pin_file
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("server.pin_required is true but server.pin_file is unset"))?;
        let pin = std::fs::read_to_string(pin_file)
            .with_context(|| format!("reading PIN file {pin_file}"))?
            .trim()
            .to_string();
        Some(hash_pin(&pin))
    } else {
        None
    };

    let state = AppState {
        config: config.clone(),
        orchestrator: orchestrator.clone(),
        bus: bus.clone(),
        approval,
        routines: routines.clone(),
        sessions,
        pin_hash,
        pin_failures: Arc::new(FailureTracker::new()),
    };

    if config.routines.enabled {
        let engine = Arc::new(RoutineEngine::new(
            routines,
            bus,
            orchestrator,
            RoutineEngineConfig {
                max_concurrent: config.routines.max_concurrent,
                tick_interval: Duration::from_secs(config.routines.scheduler_interval_s),
                execution_timeout: Duration::from_secs(config.routines.execution_timeout_s),
            },
        ));
        engine.start();
        tracing::info!(
            interval_s = config.routines.scheduler_interval_s,
            "routine scheduler started"
        );
    }

    let requests_per_minute = 10;
    let app = router::build(state, requests_per_minute, &config.server.allowed_origins);

    let addr = format!("0.0.0.0:{}", config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("binding HTTP listener")?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
