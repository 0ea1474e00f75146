//! Snapshot collection using sysinfo for sysmon_agent.

use std::collections::{HashMap, HashSet};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, ProcessRefreshKind, ProcessesToUpdate,
    RefreshKind, System,
};
use tracing::warn;

use crate::types::{
    CpuInfo, DiskInfo, LoadInfo, MemInfo, NetInfo, ProcessInfo, Snapshot, SystemInfo,
};

/// Anything that can produce a machine-state snapshot on demand.
pub trait SnapshotSource: Send {
    fn collect(&mut self) -> Snapshot;
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Persistent sysinfo handles. CPU usage and network rates are deltas against the previous
/// call, so the first snapshot after startup reports zeros for both.
pub struct SystemCollector {
    sys: System,
    disks: Disks,
    networks: Networks,
    hostname: String,
    max_processes: usize,
    // iface -> (sent, recv) totals at the previous sample
    prev_net: HashMap<String, (u64, u64)>,
    prev_at: Option<Instant>,
}

impl SystemCollector {
    pub fn new(max_processes: usize) -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything())
            .with_processes(ProcessRefreshKind::nothing().with_cpu().with_memory());
        let sys = System::new_with_specifics(refresh_kind);

        let hostname = hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .or_else(System::host_name)
            .unwrap_or_else(|| "unknown".into());

        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            hostname,
            max_processes,
            prev_net: HashMap::new(),
            prev_at: None,
        }
    }

    fn system_info(&self) -> SystemInfo {
        let platform = format!(
            "{} {}",
            System::distribution_id(),
            System::os_version().unwrap_or_default()
        );
        SystemInfo {
            hostname: self.hostname.clone(),
            os: std::env::consts::OS.to_string(),
            platform: platform.trim().to_string(),
            kernel: System::kernel_version().unwrap_or_default(),
            arch: std::env::consts::ARCH.to_string(),
            uptime: System::uptime(),
        }
    }

    fn cpu_info(&self) -> CpuInfo {
        let usage: Vec<f32> = self.sys.cpus().iter().map(|c| c.cpu_usage()).collect();
        let avg_usage = if usage.is_empty() {
            0.0
        } else {
            usage.iter().map(|&u| f64::from(u)).sum::<f64>() / usage.len() as f64
        };
        CpuInfo {
            model: self
                .sys
                .cpus()
                .first()
                .map(|c| c.brand().trim().to_string())
                .unwrap_or_default(),
            cores: System::physical_core_count().unwrap_or(usage.len()),
            threads: usage.len(),
            usage,
            avg_usage,
        }
    }

    fn mem_info(&self) -> MemInfo {
        let total = self.sys.total_memory();
        let available = self.sys.available_memory();
        let used = total.saturating_sub(available);
        let swap_total = self.sys.total_swap();
        let swap_used = self.sys.used_swap();
        MemInfo {
            total,
            used,
            available,
            used_percent: percent(used, total),
            swap_total,
            swap_used,
            swap_percent: percent(swap_used, swap_total),
        }
    }

    fn disk_info(&mut self) -> Vec<DiskInfo> {
        self.disks.refresh(true);
        let mut seen = HashSet::new();
        self.disks
            .iter()
            .filter(|d| d.total_space() > 0)
            .filter(|d| seen.insert(d.name().to_os_string()))
            .map(|d| {
                let total = d.total_space();
                let free = d.available_space();
                let used = total.saturating_sub(free);
                DiskInfo {
                    device: d.name().to_string_lossy().into_owned(),
                    mountpoint: d.mount_point().to_string_lossy().into_owned(),
                    fstype: d.file_system().to_string_lossy().into_owned(),
                    total,
                    used,
                    free,
                    used_percent: percent(used, total),
                }
            })
            .collect()
    }

    fn net_info(&mut self) -> Vec<NetInfo> {
        self.networks.refresh(true);
        let now = Instant::now();
        let elapsed = self
            .prev_at
            .map(|t| now.duration_since(t).as_secs_f64())
            .filter(|e| *e > 0.0)
            .unwrap_or(1.0);

        let mut out = Vec::new();
        for (name, data) in self.networks.iter() {
            if name == "lo" {
                continue;
            }
            let sent = data.total_transmitted();
            let recv = data.total_received();
            let (send_rate, recv_rate) = match self.prev_net.get(name) {
                Some(&(prev_sent, prev_recv)) => (
                    sent.saturating_sub(prev_sent) as f64 / elapsed,
                    recv.saturating_sub(prev_recv) as f64 / elapsed,
                ),
                None => (0.0, 0.0),
            };
            let addrs = data
                .ip_networks()
                .iter()
                .map(|n| format!("{}/{}", n.addr, n.prefix))
                .collect::<Vec<_>>()
                .join(", ");
            self.prev_net.insert(name.clone(), (sent, recv));
            out.push(NetInfo {
                name: name.clone(),
                bytes_sent: sent,
                bytes_recv: recv,
                addrs,
                send_rate,
                recv_rate,
            });
        }
        self.prev_at = Some(now);
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn processes(&mut self) -> Vec<ProcessInfo> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let total_mem = self.sys.total_memory();
        let mut procs: Vec<ProcessInfo> = self
            .sys
            .processes()
            .values()
            .map(|p| ProcessInfo {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                cpu: p.cpu_usage(),
                mem: percent(p.memory(), total_mem) as f32,
                status: p.status().to_string(),
            })
            .collect();
        procs.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
        procs.truncate(self.max_processes);
        procs
    }
}

impl SnapshotSource for SystemCollector {
    fn collect(&mut self) -> Snapshot {
        let sys = &mut self.sys;
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sys.refresh_cpu_usage();
            sys.refresh_memory();
        })) {
            warn!("sysinfo selective refresh panicked: {e:?}");
        }

        let load = System::load_average();
        Snapshot {
            timestamp: now_millis(),
            system: self.system_info(),
            cpu: self.cpu_info(),
            memory: self.mem_info(),
            disks: self.disk_info(),
            network: self.net_info(),
            load: LoadInfo {
                load1: load.one,
                load5: load.five,
                load15: load.fifteen,
            },
            processes: self.processes(),
        }
    }
}
