//! HTTP endpoints via `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use sysmon_agent::auth::TokenDomain;
use sysmon_agent::config::Config;
use sysmon_agent::metrics::SnapshotSource;
use sysmon_agent::server::router;
use sysmon_agent::state::AppState;
use sysmon_agent::types::Snapshot;
use tower::ServiceExt;

struct FixedSource;

impl SnapshotSource for FixedSource {
    fn collect(&mut self) -> Snapshot {
        Snapshot {
            timestamp: 1_700_000_000_000,
            ..Default::default()
        }
    }
}

fn state(password: &str, shell_password: &str, enable_shell: bool) -> AppState {
    let cfg = Config {
        password: password.into(),
        shell_password: shell_password.into(),
        enable_shell,
        ..Default::default()
    };
    AppState::with_source(cfg, Box::new(FixedSource))
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn login_issues_a_dashboard_token() {
    let st = state("pw", "", false);
    let resp = router(st.clone())
        .oneshot(post_json("/login", r#"{"password":"pw"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("sysmon_token="), "{cookie}");
    assert!(cookie.contains("Max-Age=86400"));

    let body = json_body(resp).await;
    let token = body["token"].as_str().unwrap();
    assert!(st.auth.validate(token, TokenDomain::Dashboard, "pw"));
    assert!(!st.auth.validate(token, TokenDomain::Shell, "pw"));
}

#[tokio::test]
async fn login_rejects_wrong_password_and_bad_json() {
    let app = router(state("pw", "", false));
    let resp = app
        .clone()
        .oneshot(post_json("/login", r#"{"password":"nope"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(post_json("/login", "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.oneshot(get("/login")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn shell_status_requires_dashboard_auth() {
    let st = state("pw", "sh", true);
    let app = router(st.clone());

    let resp = app.clone().oneshot(get("/api/shell-status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let token = st.auth.issue(TokenDomain::Dashboard, "pw");
    let resp = app
        .clone()
        .oneshot(get(&format!("/api/shell-status?token={token}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["enabled"], true);

    let via_cookie = Request::builder()
        .uri("/api/shell-status")
        .header(header::COOKIE, format!("theme=dark; sysmon_token={token}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(via_cookie).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn open_dashboard_reports_shell_disabled() {
    let resp = router(state("", "sh", true))
        .oneshot(get("/api/shell-status"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["enabled"], false);
}

#[tokio::test]
async fn shell_auth_is_forbidden_when_disabled() {
    let st = state("pw", "", true);
    let token = st.auth.issue(TokenDomain::Dashboard, "pw");
    let resp = router(st)
        .oneshot(post_json(
            &format!("/api/shell-auth?token={token}"),
            r#"{"password":""}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn shell_auth_issues_a_shell_token() {
    let st = state("pw", "sh", true);
    let app = router(st.clone());
    let dash = st.auth.issue(TokenDomain::Dashboard, "pw");
    let uri = format!("/api/shell-auth?token={dash}");

    let resp = app
        .clone()
        .oneshot(post_json("/api/shell-auth", r#"{"password":"sh"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(post_json(&uri, r#"{"password":"pw"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(post_json(&uri, r#"{"password":"sh"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("sysmon_shell_token="), "{cookie}");
    assert!(cookie.contains("Max-Age=3600"));

    let body = json_body(resp).await;
    let shell = body["shell_token"].as_str().unwrap();
    assert!(st.auth.validate(shell, TokenDomain::Shell, "sh"));
    assert!(!st.auth.validate(shell, TokenDomain::Dashboard, "sh"));
}
