//! Data types sent to the browser over WebSocket.
//! Keep this module minimal and stable: it defines the wire format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SystemInfo {
    pub hostname: String,
    pub os: String,
    pub platform: String,
    pub kernel: String,
    pub arch: String,
    pub uptime: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    pub model: String,
    pub cores: usize,
    pub threads: usize,
    pub usage: Vec<f32>,
    pub avg_usage: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemInfo {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub used_percent: f64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_percent: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetInfo {
    pub name: String,
    // cumulative totals since boot; rates are per second since the previous sample
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub addrs: String,
    pub send_rate: f64,
    pub recv_rate: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LoadInfo {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu: f32,
    pub mem: f32,
    pub status: String,
}

/// One full machine-state sample. Immutable once collected.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Unix milliseconds at collection time.
    pub timestamp: i64,
    pub system: SystemInfo,
    pub cpu: CpuInfo,
    pub memory: MemInfo,
    pub disks: Vec<DiskInfo>,
    pub network: Vec<NetInfo>,
    pub load: LoadInfo,
    pub processes: Vec<ProcessInfo>,
}

/// Compact chart sample kept in the history buffer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "c")]
    pub cpu_avg: f64,
    #[serde(rename = "m")]
    pub mem_percent: f64,
}

impl From<&Snapshot> for HistoryPoint {
    fn from(s: &Snapshot) -> Self {
        Self {
            timestamp: s.timestamp.div_euclid(1000),
            cpu_avg: s.cpu.avg_usage,
            mem_percent: s.memory.used_percent,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStat {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub cpu_pct: f64,
    pub mem_usage: u64,
    pub mem_limit: u64,
    pub created: String,
}

/// Telemetry frame: `{"type": "...", "payload": ...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Envelope<'a> {
    Snapshot(&'a Snapshot),
    History(&'a [HistoryPoint]),
    Docker(&'a [ContainerStat]),
}

impl Envelope<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
