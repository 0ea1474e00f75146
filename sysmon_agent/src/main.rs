//! sysmon_agent entry point. Loads config, starts the samplers and serves HTTP/WebSocket.

use std::env;
use std::net::SocketAddr;

use sysmon_agent::config::{parse_args, Config};
use sysmon_agent::sampler::{spawn_container_sampler, spawn_sampler, CONTAINER_PERIOD};
use sysmon_agent::server;
use sysmon_agent::state::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let mut cfg = Config::load(args.config.as_deref());
    if let Some(port) = args.port {
        cfg.port = port;
    }
    for w in cfg.startup_warnings() {
        warn!("{w}");
    }
    info!(
        refresh_ms = cfg.refresh_interval,
        history = cfg.history_duration,
        shell = cfg.shell_enabled(),
        "starting sysmon agent"
    );

    let state = AppState::new(cfg.clone());
    let _sampler = spawn_sampler(state.clone(), cfg.refresh_period());
    let _containers = spawn_container_sampler(state.clone(), CONTAINER_PERIOD);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    server::serve(listener, state).await
}
