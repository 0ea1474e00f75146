//! WebSocket upgrades: the telemetry feed and the browser shell.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::{headers::Cookie, TypedHeader};
use futures_util::stream::StreamExt;
use tracing::debug;

use crate::auth::{Credentials, TokenDomain};
use crate::sampler::latest_snapshot_frame;
use crate::shell::{self, IDLE_TIMEOUT};
use crate::state::AppState;
use crate::transport::{inbound, FrameSink};
use crate::types::Envelope;

/// Token carriers for `domain`: `?token=` first, then that domain's cookie.
pub(crate) fn credentials<'a>(
    query: &'a HashMap<String, String>,
    cookies: Option<&'a TypedHeader<Cookie>>,
    domain: TokenDomain,
) -> Credentials<'a> {
    Credentials {
        query: query.get("token").map(String::as_str),
        cookie: cookies.and_then(|c| c.get(domain.cookie_name())),
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
    cookies: Option<TypedHeader<Cookie>>,
) -> Response {
    let creds = credentials(&q, cookies.as_ref(), TokenDomain::Dashboard);
    if !state
        .auth
        .authorize(TokenDomain::Dashboard, &state.config.password, creds)
    {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut tx, mut rx) = socket.split();

    // Initial frames go out before registration so a broadcast can't interleave.
    if let Some(frame) = latest_snapshot_frame(&state).await {
        if tx.send_text(&frame).await.is_err() {
            return;
        }
    }
    let history = state.history.snapshot();
    if !history.is_empty() {
        if let Ok(js) = Envelope::History(&history).to_json() {
            if tx.send_text(&js).await.is_err() {
                return;
            }
        }
    }

    let id = state.hub.register(tx).await;
    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%id, "dashboard read failed: {e}");
                break;
            }
        }
    }
    state.hub.unregister(id).await;
}

pub async fn shell_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
    cookies: Option<TypedHeader<Cookie>>,
) -> Response {
    if !state.config.shell_enabled() {
        return (StatusCode::FORBIDDEN, "shell disabled").into_response();
    }
    let creds = credentials(&q, cookies.as_ref(), TokenDomain::Shell);
    if !state
        .auth
        .authorize(TokenDomain::Shell, &state.config.shell_password, creds)
    {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    ws.on_upgrade(move |socket| async move {
        let (tx, rx) = socket.split();
        shell::serve(state.spawner.as_ref(), tx, inbound(rx), IDLE_TIMEOUT).await;
    })
}
