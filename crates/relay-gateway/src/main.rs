//! # relay-gateway
//!
//! Gateway server binary — wires together the store, session registry,
//! realtime hub, and admission gate, then serves the WebSocket endpoint.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use relay_registry::{LoopbackClient, SessionRegistry};
use relay_server::{
    ConnectionGate, ConnectionHub, GateConfig, GatewayServer, JwtVerifier, ServerConfig,
    run_fanout, run_sweep,
};
use relay_settings::RelaySettings;
use relay_store::{
    ConnectionConfig, MemoryStore, SessionStore, SqliteStore, migrations, new_file_pool,
};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Relay gateway server.
#[derive(Parser, Debug)]
#[command(name = "relay-gateway", about = "Multi-tenant messaging gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Keep all state in memory (no database file).
    #[arg(long)]
    ephemeral: bool,
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Resolve the database path: absolute stays as-is, relative lands under
/// `~/.relay`.
fn resolve_db_path(configured: &str) -> PathBuf {
    let configured = PathBuf::from(configured);
    if configured.is_absolute() {
        return configured;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join(configured)
}

fn open_store(cli: &Cli, settings: &RelaySettings) -> Result<Arc<dyn SessionStore>> {
    if cli.ephemeral {
        info!("ephemeral mode, state kept in memory");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let db_path = cli
        .db_path
        .clone()
        .unwrap_or_else(|| resolve_db_path(&settings.store.db_path));
    ensure_parent_dir(&db_path)?;
    let pool = new_file_pool(&db_path.to_string_lossy(), &ConnectionConfig::default())
        .context("Failed to open database")?;
    {
        let conn = pool.get().context("Failed to get DB connection")?;
        let _ = migrations::run_migrations(&conn).context("Failed to run migrations")?;
    }
    info!(path = %db_path.display(), "database ready");
    Ok(Arc::new(SqliteStore::new(pool)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&settings_path)
        .context("Failed to load settings")?;
    if let Some(host) = cli.host.clone() {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if settings.auth.jwt_secret.is_empty() {
        bail!("No JWT secret configured. Set auth.jwtSecret in settings or RELAY_JWT_SECRET.");
    }

    let store = open_store(&cli, &settings)?;

    // The external messaging client adapter is chosen here. The loopback
    // adapter pairs instantly and echoes traffic; production deployments
    // swap in an adapter over the real client library.
    let client = Arc::new(LoopbackClient::new());
    info!("using loopback messaging client");

    let registry = Arc::new(SessionRegistry::new(
        client,
        store.clone(),
        settings.registry.event_log_capacity,
    ));

    let gate = Arc::new(ConnectionGate::new(GateConfig::from_settings(
        &settings.admission,
    )));
    let verifier = Arc::new(JwtVerifier::new(
        settings.auth.jwt_secret.as_bytes(),
        settings.auth.issuer.as_deref(),
    ));
    let hub = Arc::new(ConnectionHub::new(store));

    let server = GatewayServer::new(
        ServerConfig::from_settings(&settings.server),
        hub.clone(),
        gate.clone(),
        verifier,
        registry.clone(),
    );
    let shutdown = server.shutdown().clone();

    let fanout_task = tokio::spawn(run_fanout(
        hub,
        registry.subscribe(),
        shutdown.token(),
    ));
    let sweep_task = tokio::spawn(run_sweep(
        gate,
        std::time::Duration::from_secs(settings.admission.sweep_interval_secs),
        shutdown.token(),
    ));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    let signal_token = shutdown.token();
    axum::serve(listener, server.router())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
                () = signal_token.cancelled() => {}
            }
        })
        .await
        .context("Server error")?;

    shutdown.graceful(vec![fanout_task, sweep_task], None).await;
    info!("shutdown complete");
    Ok(())
}
