//! RACS server
//!
//! A multi-project continuous-build service. Each registered project owns a
//! long-running worker that drives its source tree through a fixed pipeline
//! (clean, clone, prepare, pull, build, package, push) over git and podman,
//! while the server persists state in SQLite, streams events to browsers,
//! and exposes a small HTTP control surface.
//!
//! Architecture:
//! - `state`: the shared in-memory world (projects, registries, bus handle)
//! - `db` / `repository`: the SQLite store
//! - `service`: workers, action table, executor, event bus, housekeeping
//! - `reconcile`: store-to-memory rebuild at boot
//! - `api`: axum control surface incl. the SSE feed

mod api;
mod config;
mod db;
mod reconcile;
mod repository;
mod service;
mod state;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::service::events::EventBus;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "racs_server=info,racs_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    info!("Starting RACS");

    // Children must never stall the pipeline waiting for credentials.
    std::env::set_var("GIT_TERMINAL_PROMPT", "0");

    for dir in ["projects", "tasks", "uploads"] {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {dir}/"))?;
    }
    let cwd = std::env::current_dir().context("resolving working directory")?;

    let pool = db::create_pool("sqlite:main.db")
        .await
        .context("opening main.db")?;
    db::run_migrations(&pool).await.context("migrating main.db")?;

    let state = Arc::new(AppState {
        pool,
        bus: EventBus::start(),
        projects: RwLock::new(HashMap::new()),
        registries: Mutex::new(HashMap::new()),
        projects_root: cwd.join("projects"),
        tasks_root: cwd.join("tasks"),
        uploads_root: cwd.join("uploads"),
        no_login: config.no_login,
    });

    reconcile::run(&state).await.context("reconciling store")?;
    service::prune::spawn();

    let app = api::create_router(state);

    if config.ssl_cert.is_some() || config.ssl_key.is_some() {
        warn!("TLS termination is not built in; ignoring --ssl-cert/--ssl-key");
    }

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("serving")?;

    Ok(())
}
