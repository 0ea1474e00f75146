//! Container stats from the local Docker Engine API, spoken over the engine's unix
//! socket with a hyper HTTP/1 connection per request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use http::{header, Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::net::UnixStream;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::types::ContainerStat;

pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiContainer {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Created", default)]
    created: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CpuUsage {
    total_usage: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CpuStats {
    cpu_usage: CpuUsage,
    system_cpu_usage: u64,
    online_cpus: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MemoryStats {
    usage: u64,
    limit: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsResponse {
    cpu_stats: CpuStats,
    precpu_stats: CpuStats,
    memory_stats: MemoryStats,
}

impl StatsResponse {
    fn cpu_percent(&self) -> f64 {
        let cpu_delta = self
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(self.precpu_stats.cpu_usage.total_usage) as f64;
        let sys_delta = self
            .cpu_stats
            .system_cpu_usage
            .saturating_sub(self.precpu_stats.system_cpu_usage) as f64;
        if sys_delta > 0.0 && self.cpu_stats.online_cpus > 0 {
            cpu_delta / sys_delta * f64::from(self.cpu_stats.online_cpus) * 100.0
        } else {
            0.0
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn rfc3339(unix: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

pub struct DockerClient {
    socket: PathBuf,
    available: OnceCell<bool>,
}

impl DockerClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            available: OnceCell::new(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Probed with `/version` on first use; the answer is kept for the process lifetime.
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                match self.get("/version").await {
                    Ok(_) => {
                        info!(socket = %self.socket.display(), "docker engine detected");
                        true
                    }
                    Err(e) => {
                        debug!("docker unavailable: {e:#}");
                        false
                    }
                }
            })
            .await
    }

    /// All containers, with cpu and memory filled in for running ones.
    /// `None` when the engine is unreachable or the listing fails.
    pub async fn list(&self) -> Option<Vec<ContainerStat>> {
        if !self.is_available().await {
            return None;
        }
        let body = match self.get("/containers/json?all=1").await {
            Ok(b) => b,
            Err(e) => {
                debug!("docker: list failed: {e:#}");
                return None;
            }
        };
        let containers: Vec<ApiContainer> = serde_json::from_slice(&body).ok()?;

        let mut out = Vec::with_capacity(containers.len());
        for c in containers {
            let mut stat = ContainerStat {
                name: c
                    .names
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                image: c.image,
                status: c.status,
                created: rfc3339(c.created),
                ..Default::default()
            };
            if c.state == "running" {
                let path = format!("/containers/{}/stats?stream=false&one-shot=true", c.id);
                match self.get(&path).await {
                    Ok(body) => {
                        if let Ok(stats) = serde_json::from_slice::<StatsResponse>(&body) {
                            stat.cpu_pct = stats.cpu_percent();
                            stat.mem_usage = stats.memory_stats.usage;
                            stat.mem_limit = stats.memory_stats.limit;
                        }
                    }
                    Err(e) => warn!("docker: failed to get stats for {}: {e:#}", short_id(&c.id)),
                }
            }
            stat.id = c.id;
            stat.state = c.state;
            out.push(stat);
        }
        Some(out)
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        timeout(REQUEST_TIMEOUT, self.request(path))
            .await
            .with_context(|| format!("GET {path} timed out"))?
    }

    async fn request(&self, path: &str) -> Result<Bytes> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .with_context(|| format!("connect {}", self.socket.display()))?;
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .context("docker handshake")?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("docker connection ended: {e}");
            }
        });

        let req = Request::get(path)
            .header(header::HOST, "docker")
            .body(Empty::<Bytes>::new())?;
        let resp = sender
            .send_request(req)
            .await
            .with_context(|| format!("GET {path}"))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .context("read docker response")?
            .to_bytes();
        if status != StatusCode::OK {
            bail!("docker api returned status {status}");
        }
        Ok(body)
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET)
    }
}
