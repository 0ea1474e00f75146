//! Agent configuration: built-in defaults, overlaid by an optional JSON file, then
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
const MIN_REFRESH_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Sampling period in milliseconds.
    #[serde(rename = "refreshInterval")]
    pub refresh_interval: u64,
    #[serde(rename = "maxProcesses")]
    pub max_processes: usize,
    /// Dashboard password; empty disables dashboard auth.
    pub password: String,
    /// History length in samples; zero or negative means the default.
    #[serde(rename = "historyDuration")]
    pub history_duration: i64,
    #[serde(rename = "enableShell")]
    pub enable_shell: bool,
    pub shell_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            refresh_interval: 1500,
            max_processes: 50,
            password: String::new(),
            history_duration: 3600,
            enable_shell: false,
            shell_password: String::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File (if any) over defaults, then process environment. Never fails: a bad
    /// file is reported and the defaults are used instead.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut cfg = match Self::from_file(path) {
            Ok(cfg) => {
                info!(path = %path.display(), "loaded config");
                cfg
            }
            Err(ConfigError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                info!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("{e}; using defaults");
                Self::default()
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg
    }

    /// Apply `PORT` and `SYSMON_*` overrides. Unparseable numbers are ignored.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| var(k).filter(|v| !v.is_empty());
        if let Some(v) = get("PORT").and_then(|v| v.parse().ok()) {
            self.port = v;
        }
        if let Some(v) = get("SYSMON_PASSWORD") {
            self.password = v;
        }
        if let Some(v) = get("SYSMON_REFRESH").and_then(|v| v.parse().ok()) {
            self.refresh_interval = v;
        }
        if let Some(v) = get("SYSMON_MAX_PROCS").and_then(|v| v.parse().ok()) {
            self.max_processes = v;
        }
        if let Some(v) = get("SYSMON_HISTORY").and_then(|v| v.parse().ok()) {
            self.history_duration = v;
        }
        if let Some(v) = get("SYSMON_SHELL_PASSWORD") {
            self.shell_password = v;
        }
        if let Some(v) = get("SYSMON_ENABLE_SHELL") {
            self.enable_shell = matches!(v.as_str(), "1" | "true");
        }
    }

    /// The shell needs its own password and a protected dashboard.
    pub fn shell_enabled(&self) -> bool {
        self.enable_shell && !self.shell_password.is_empty() && !self.password.is_empty()
    }

    pub fn history_capacity(&self) -> usize {
        usize::try_from(self.history_duration).unwrap_or(0)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_interval.max(MIN_REFRESH_MS))
    }

    pub fn startup_warnings(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.password.is_empty() {
            out.push("no dashboard password set; authentication disabled");
        }
        if self.enable_shell && !self.shell_enabled() {
            out.push("enableShell requires both password and shell_password; shell disabled");
        }
        out
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub port: Option<u16>,
}

pub fn usage(prog: &str) -> String {
    format!("Usage: {prog} [--config PATH|-c PATH] [--port PORT|-p PORT]")
}

/// Hand-rolled flag parsing. `Err` carries text for the user (help or a usage error).
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "sysmon_agent".into());
    let mut out = CliArgs::default();

    let parse_port = |v: Option<String>| -> Result<u16, String> {
        v.as_deref()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| format!("Invalid port. {}", usage(&prog)))
    };

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--config" | "-c" => {
                out.config = Some(
                    it.next()
                        .map(PathBuf::from)
                        .ok_or_else(|| format!("Missing config path. {}", usage(&prog)))?,
                );
            }
            "--port" | "-p" => out.port = Some(parse_port(it.next())?),
            _ if arg.starts_with("--config=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        out.config = Some(PathBuf::from(v));
                    }
                }
            }
            _ if arg.starts_with("--port=") => {
                let v = arg.split_once('=').map(|(_, v)| v.to_string());
                out.port = Some(parse_port(v)?);
            }
            _ => return Err(format!("Unexpected argument '{arg}'. {}", usage(&prog))),
        }
    }
    Ok(out)
}
