mod api;
mod clock;
mod config;
mod election;
mod multicast;
mod mutex;
mod net;
mod state;
mod tasks;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::net::PeerTransport;
use crate::state::AppState;
use crate::tasks::TaskTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().context("loading configuration")?;
    info!(
        "P{} starting, {} peers, binding :{}",
        config.process_id, config.total_processes, config.peer_port
    );

    let transport = PeerTransport::new(&config);
    let (tasks, reaper) = TaskTracker::new();
    let bind_port = config.peer_port;
    let state = AppState::new(config, transport, tasks);

    tokio::spawn(reaper.run());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", bind_port))
        .await
        .with_context(|| format!("binding 0.0.0.0:{bind_port}"))?;
    axum::serve(listener, api::router(state))
        .await
        .context("serving http")?;
    Ok(())
}
