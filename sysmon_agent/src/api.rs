//! JSON endpoints: dashboard login and the shell gate.

use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{headers::Cookie, TypedHeader};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{secrets_match, TokenDomain};
use crate::state::AppState;
use crate::ws::credentials;

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "bad request").into_response()
}

fn token_cookie(domain: TokenDomain, token: &str) -> String {
    format!(
        "{}={token}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        domain.cookie_name(),
        domain.default_ttl().as_secs()
    )
}

fn dashboard_authorized(
    state: &AppState,
    q: &HashMap<String, String>,
    cookies: Option<&TypedHeader<Cookie>>,
) -> bool {
    let creds = credentials(q, cookies, TokenDomain::Dashboard);
    state
        .auth
        .authorize(TokenDomain::Dashboard, &state.config.password, creds)
}

/// `POST /login {"password"}` → `{"token"}` plus the dashboard cookie.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<PasswordRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return bad_request();
    };
    if !secrets_match(&req.password, &state.config.password) {
        warn!("dashboard login rejected");
        return unauthorized();
    }
    let token = state
        .auth
        .issue(TokenDomain::Dashboard, &state.config.password);
    info!("dashboard login");
    (
        [(header::SET_COOKIE, token_cookie(TokenDomain::Dashboard, &token))],
        Json(json!({ "token": token })),
    )
        .into_response()
}

pub async fn shell_status(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
    cookies: Option<TypedHeader<Cookie>>,
) -> Response {
    if !dashboard_authorized(&state, &q, cookies.as_ref()) {
        return unauthorized();
    }
    Json(json!({ "enabled": state.config.shell_enabled() })).into_response()
}

/// `POST /api/shell-auth {"password"}` → `{"shell_token"}` plus the shell cookie.
pub async fn shell_auth(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
    cookies: Option<TypedHeader<Cookie>>,
    body: Result<Json<PasswordRequest>, JsonRejection>,
) -> Response {
    if !dashboard_authorized(&state, &q, cookies.as_ref()) {
        return unauthorized();
    }
    if !state.config.shell_enabled() {
        return (StatusCode::FORBIDDEN, "shell disabled").into_response();
    }
    let Ok(Json(req)) = body else {
        return bad_request();
    };
    if !secrets_match(&req.password, &state.config.shell_password) {
        warn!("shell login rejected");
        return (StatusCode::UNAUTHORIZED, "wrong password").into_response();
    }
    let token = state
        .auth
        .issue(TokenDomain::Shell, &state.config.shell_password);
    info!("shell token issued");
    (
        [(header::SET_COOKIE, token_cookie(TokenDomain::Shell, &token))],
        Json(json!({ "shell_token": token })),
    )
        .into_response()
}
