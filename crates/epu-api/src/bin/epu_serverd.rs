use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use epu_api::{build_app, AppState};
use epu_controller::{DecisionEngine, EngineRegistry, FixedSizeEngine, QueueLengthEngine};
use epu_domain::Site;
use epu_iaas::{DriverRegistry, MockDriver};
use epu_management::EpuManagement;
use epu_provisioner::{MockBroker, NoopNotifier, Provisioner, StaticDtrs};
use epu_store::{InMemoryStore, RedbStore, StateStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Long-running elastic-compute control-plane process: EPU Management,
/// Controllers, Health Monitors, and the Provisioner, behind an HTTP+JSON
/// surface.
#[derive(Debug, Parser)]
#[command(name = "epu-serverd")]
struct Args {
    #[arg(long, env = "EPU_BIND", default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, env = "EPU_PORT", default_value_t = 8080)]
    port: u16,

    /// Use an in-memory store; state is lost on restart.
    #[arg(long, env = "EPU_EPHEMERAL", default_value_t = false)]
    ephemeral: bool,

    /// Path to the persistent `redb` store file, when not ephemeral.
    #[arg(long, env = "EPU_STORE_PATH", default_value = "epu.redb")]
    store_path: PathBuf,

    /// IaaS sites to register (mock driver only — see epu-iaas).
    #[arg(long, env = "EPU_SITES", value_delimiter = ',', default_value = "local")]
    sites: Vec<String>,

    /// Directory of `*.definition.yml` / `*.domain.yml` files loaded at
    /// startup.
    #[arg(long, env = "EPU_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Bearer token required on every route but `/healthz`.
    #[arg(long, env = "EPU_AUTH_TOKEN")]
    auth_token: String,

    /// Seconds between Controller decide ticks.
    #[arg(long, env = "EPU_DECIDE_INTERVAL_SECONDS", default_value_t = 5.0)]
    decide_interval_seconds: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    let store: Arc<dyn StateStore> = if args.ephemeral {
        info!("using in-memory (ephemeral) store");
        Arc::new(InMemoryStore::new())
    } else {
        info!(path = %args.store_path.display(), "using persistent store");
        Arc::new(RedbStore::open(&args.store_path).with_context(|| format!("failed to open store at {}", args.store_path.display()))?)
    };

    let mut registry = DriverRegistry::new();
    for site in &args.sites {
        registry.register(Site(site.clone()), Arc::new(MockDriver::new()));
    }

    let provisioner = Arc::new(Provisioner::new(
        store.clone(),
        Arc::new(registry),
        Arc::new(MockBroker::new()),
        Arc::new(StaticDtrs::new()),
        Arc::new(NoopNotifier),
    ));
    provisioner.recover().await.context("failed to recover in-flight launches")?;

    let mut engines = EngineRegistry::new();
    engines.register("queue-length", Arc::new(|| Box::new(QueueLengthEngine::new()) as Box<dyn DecisionEngine>));
    engines.register("fixed-size", Arc::new(|| Box::new(FixedSizeEngine::new()) as Box<dyn DecisionEngine>));

    let management = Arc::new(EpuManagement::new(store.clone(), provisioner.clone(), Arc::new(engines), None));

    if let Some(dir) = &args.config_dir {
        for def in epu_config::load_domain_definitions(dir).context("failed to load domain definitions")? {
            management.add_domain_definition(def).await?;
        }
        for domain in epu_config::load_domains(dir).context("failed to load domains")? {
            management
                .add_domain(&domain.owner, domain.domain_id, domain.definition_id, domain.config, domain.subscribers)
                .await?;
        }
    }

    let decide_loop = {
        let management = management.clone();
        let interval = Duration::from_secs_f64(args.decide_interval_seconds);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                management.tick_all().await;
            }
        })
    };

    let state = AppState { store, provisioner, management, auth_token: Arc::new(args.auth_token) };
    let app = build_app(state);

    let addr = format!("{}:{}", args.bind, args.port);
    info!(addr = %addr, "starting epu-serverd");
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    decide_loop.abort();
    Ok(())
}
