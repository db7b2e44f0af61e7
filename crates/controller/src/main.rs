//! `gatewayd-controller`: the control-plane HTTP API that manages a
//! pair of VRRP routers, drives agent installs over SSH, and runs
//! failover drift verification on demand.

mod auth;
mod config;
mod error;
mod handlers;
mod remote_iface;
mod state;
mod transport;
mod version;

use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use clap::Parser;
use cluster::Manager;
use install::Installer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use state::AppState;

#[derive(Parser)]
#[command(name = "gatewayd-controller")]
struct Cli {
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref());

    if settings.log_json {
        common::logging::init_json();
    } else {
        common::logging::init();
    }

    if let Err(e) = run(settings).await {
        error!(error = %e, "controller exited with an error");
        std::process::exit(1);
    }
}

async fn run(settings: cluster::ControllerSettings) -> Result<(), common::Error> {
    let manager = Arc::new(Manager::new(PathBuf::from(&settings.state_path)));
    if let Err(e) = manager.load().await {
        warn!(error = %e, "no existing cluster state loaded, starting empty");
    }

    let cache_dir = PathBuf::from(&settings.cache_dir);
    let installer = Arc::new(Installer::new(cache_dir, settings.release_bases.clone()));

    let listen_addr = settings.listen_addr.clone();
    let app_state = AppState::new(manager, installer, settings);

    let app = handlers::router(app_state.clone())
        .layer(middleware::from_fn_with_state(app_state, auth::guard))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(%listen_addr, "gatewayd-controller listening");
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(common::Error::Io)?;
    axum::serve(listener, app).await.map_err(common::Error::Io)?;

    Ok(())
}
