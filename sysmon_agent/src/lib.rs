//! sysmon_agent: streams host metrics to browser dashboards over WebSocket and
//! optionally serves a PTY-backed shell.

pub mod api;
pub mod auth;
pub mod config;
pub mod docker;
pub mod history;
pub mod hub;
pub mod metrics;
pub mod pty;
pub mod sampler;
pub mod server;
pub mod shell;
pub mod state;
pub mod transport;
pub mod types;
pub mod ws;
