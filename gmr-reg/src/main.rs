//! gmr-reg - Genomic Metadata Registry service
//!
//! Validates, stores, and publishes genomic analysis metadata submissions.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use gmr_common::config::{self, TomlConfig};
use gmr_reg::identifiers::{HttpIdAuthority, IdAuthority, LocalIdAuthority};
use gmr_reg::storage::{HttpStorageGateway, InMemoryStorage, StorageGateway};
use gmr_reg::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "gmr-reg", about = "Genomic metadata registry service")]
struct Args {
    /// Root data folder (overrides GMR_ROOT_FOLDER and the config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// Bind port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting GMR Registry (gmr-reg) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    let toml_config = TomlConfig::load_default();

    let root_folder = config::resolve_root_folder(
        args.root_folder.as_deref(),
        "GMR_ROOT_FOLDER",
        &toml_config,
    );
    let db_path = config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = gmr_common::db::init::init_database(&db_path).await?;

    let registry = &toml_config.registry;
    let retry_delay = Duration::from_millis(registry.retry_delay_ms);

    let storage: Arc<dyn StorageGateway> = if registry.storage_url.is_empty() {
        info!("No storage URL configured; using in-memory storage backend");
        Arc::new(InMemoryStorage::new())
    } else {
        info!("Storage gateway: {}", registry.storage_url);
        Arc::new(HttpStorageGateway::new(
            registry.storage_url.clone(),
            registry.retry_attempts,
            retry_delay,
        ))
    };

    let authority: Arc<dyn IdAuthority> = if registry.id_authority_url.is_empty() {
        info!("No ID authority URL configured; deriving ids locally");
        Arc::new(LocalIdAuthority)
    } else {
        info!("ID authority: {}", registry.id_authority_url);
        Arc::new(HttpIdAuthority::new(
            registry.id_authority_url.clone(),
            registry.retry_attempts,
            retry_delay,
        ))
    };

    let state = AppState::new(pool, storage, authority, registry.enforce_latest);
    let app = build_router(state);

    let port = args.port.unwrap_or(registry.port);
    let bind_addr = format!("{}:{}", registry.host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("gmr-reg listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
