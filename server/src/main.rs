//! Mbaal catalog server.
//!
//! Serves category and product management over HTTP. Uses PostgreSQL when a
//! database URL is configured, otherwise an in-memory store that lives as
//! long as the process.

mod routes;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mbaal_common::postgres::PgStore;
use mbaal_common::{Catalog, MemoryStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::routes::AppState;

#[derive(Parser)]
#[command(name = "mbaal-server", about = "Mbaal product catalog server")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "MBAAL_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// HTTP port to listen on.
    #[arg(long, env = "MBAAL_PORT", default_value_t = 3000)]
    port: u16,

    /// PostgreSQL connection URL. Without it the catalog is kept in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum pooled database connections.
    #[arg(long, env = "MBAAL_POOL_SIZE", default_value_t = 8)]
    pool_size: usize,

    /// Log filter directive (e.g. "info,mbaal_common=debug").
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,

    /// Recount every category's published products before serving.
    #[arg(long)]
    reconcile_on_start: bool,
}

// ─── Store selection ─────────────────────────────────────────────────────────

async fn build_state(cli: &Cli) -> anyhow::Result<AppState> {
    match &cli.database_url {
        Some(url) => {
            let store = Arc::new(
                PgStore::connect(url, cli.pool_size)
                    .await
                    .context("connecting to PostgreSQL")?,
            );
            Ok(AppState {
                catalog: Catalog::new(store.clone(), store),
                store: "postgres",
            })
        }
        None => {
            info!("No DATABASE_URL configured, using the in-memory store");
            let store = Arc::new(MemoryStore::new());
            Ok(AppState {
                catalog: Catalog::new(store.clone(), store),
                store: "memory",
            })
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = build_state(&cli).await?;

    if cli.reconcile_on_start {
        let report = state
            .catalog
            .reconcile_counts()
            .await
            .context("reconciling product counts")?;
        info!(
            "Startup reconcile: {} categories checked, {} corrected",
            report.checked, report.corrected
        );
    }

    let store_kind = state.store;
    let app = routes::router(Arc::new(state));
    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Catalog server listening on {} ({} store)", addr, store_kind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;
    Ok(())
}

