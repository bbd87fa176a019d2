//! vault-cm - CardMarket reconciliation microservice
//!
//! Resolves VaultEstim card records to CardMarket product ids and links,
//! and runs resumable, quota-bounded bulk reconciliation over the whole
//! record set. Controlled over HTTP REST + SSE.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vault_common::config::{
    check_toml_permissions_loose, default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver,
    TomlConfig,
};
use vault_common::events::EventBus;

use vault_cm::models::RunParameters;
use vault_cm::services::catalog_client::DEFAULT_REQUESTS_PER_SECOND;
use vault_cm::services::{CandidateStore, ExpansionSlugs, HostedCatalogClient, IdentifierResolver, SqliteCatalog};
use vault_cm::AppState;

const MODULE_NAME: &str = "vault-cm";

/// How long shutdown waits for active runs to flush their progress
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Catalog backing candidate lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CatalogBackend {
    /// Local `cardmarket_singles` mirror
    Mirror,
    /// Hosted RapidAPI catalog (needs an API key)
    Api,
}

/// Command-line arguments for vault-cm
#[derive(Parser, Debug)]
#[command(name = "vault-cm")]
#[command(about = "CardMarket reconciliation microservice for VaultEstim")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5790", env = "VAULTESTIM_CM_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "VAULTESTIM_CM_BIND")]
    bind: IpAddr,

    /// Root folder holding the database
    #[arg(short, long, env = "VAULTESTIM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: <config dir>/vaultestim/vault-cm.toml)
    #[arg(short, long, env = "VAULTESTIM_CM_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog used for candidate lookups
    #[arg(long, value_enum, default_value = "mirror", env = "VAULTESTIM_CM_CATALOG")]
    catalog: CatalogBackend,

    /// Import a CardMarket product catalog JSON file into the mirror before serving
    #[arg(long)]
    import_catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = config_path.as_deref().filter(|p| p.exists()) {
        if toml_config.catalog.api_key.is_some() && check_toml_permissions_loose(path).unwrap_or(false) {
            warn!(
                path = %path.display(),
                "Config file holding the catalog API key is readable by other users (chmod 600 recommended)"
            );
        }
    }

    info!("Starting vault-cm (CardMarket reconciliation) microservice");
    info!(
        "Version: {} ({} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_config_path(config_path.clone())
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    let db_pool = vault_cm::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let stale = vault_cm::db::runs::abort_stale_runs(&db_pool).await?;
    if stale > 0 {
        warn!(count = stale, "Marked runs left active by a previous process as aborted");
    }

    if let Some(catalog_file) = &args.import_catalog {
        let imported = vault_cm::db::catalog::import_catalog_file(&db_pool, catalog_file)
            .await
            .with_context(|| format!("Failed to import {}", catalog_file.display()))?;
        info!(imported, path = %catalog_file.display(), "Catalog mirror updated");
    }

    let catalog: Arc<dyn CandidateStore> = match args.catalog {
        CatalogBackend::Mirror => Arc::new(SqliteCatalog::new(db_pool.clone())),
        CatalogBackend::Api => {
            let (api_key, source) = vault_cm::config::resolve_catalog_api_key(&db_pool, &toml_config).await?;
            if let Err(e) =
                vault_cm::config::migrate_key_to_database(&api_key, source, &db_pool, config_path.as_deref()).await
            {
                warn!("Failed to migrate catalog API key to database: {}", e);
            }

            let rps = toml_config
                .catalog
                .requests_per_second
                .unwrap_or(DEFAULT_REQUESTS_PER_SECOND);
            let client = match &toml_config.catalog.base_url {
                Some(base_url) => HostedCatalogClient::with_base_url(api_key, rps, base_url.clone()),
                None => HostedCatalogClient::new(api_key, rps),
            }
            .context("Failed to build catalog client")?;
            Arc::new(client)
        }
    };
    info!(catalog = catalog.source_name(), "Catalog backend ready");

    let slugs = ExpansionSlugs::builtin().with_overrides(&toml_config.expansions);
    info!(expansions = slugs.len(), "Expansion slug table loaded");

    let run_defaults = RunParameters::from_defaults(&toml_config.reconcile);
    if let Err(e) = run_defaults.validate() {
        anyhow::bail!("Invalid [reconcile] defaults: {}", e);
    }

    let event_bus = EventBus::new(1000);

    let state = AppState::new(db_pool, event_bus, catalog)
        .with_resolver(IdentifierResolver::new(slugs))
        .with_run_defaults(run_defaults)
        .with_config_path(config_path);

    let app = vault_cm::build_router(state.clone());

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    drain_active_runs(&state).await;

    info!("Server shutdown complete");
    Ok(())
}

/// Cancel active runs and give them time to flush progress
async fn drain_active_runs(state: &AppState) {
    let runs: Vec<_> = state.active_runs.read().await.values().cloned().collect();
    if runs.is_empty() {
        return;
    }

    info!(count = runs.len(), "Cancelling active reconciliation runs");
    for run in &runs {
        run.cancel.cancel();
    }

    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while tokio::time::Instant::now() < deadline {
        if state.active_runs.read().await.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    warn!("Active runs did not finish before shutdown; their progress may lag by one checkpoint");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
