//! HTTP routing and the listener loop.

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::state::AppState;
use crate::{api, ws};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/ws/shell", get(ws::shell_handler))
        .route("/login", post(api::login))
        .route("/api/shell-status", get(api::shell_status))
        .route("/api/shell-auth", post(api::shell_auth))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    info!("sysmon agent listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
