//! SystemMonitor - Host Telemetry
//!
//! ## Responsibilities
//!
//! - Full stats snapshot on demand (CPU, memory, disk, temperature,
//!   network counters, uptime)
//! - Periodic broadcast loop over the realtime hub
//!
//! CPU usage is computed from the delta since the previous refresh, so the
//! very first snapshot after startup reports 0.

use crate::realtime_hub::{HubMessage, RealtimeHub};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Components, Disks, Networks, System};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Pi thermal sensor path, used when sysinfo reports no CPU component
const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// CPU stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuStats {
    pub usage_percent: f32,
    pub physical_cores: usize,
    pub logical_cores: usize,
}

/// Memory stats (bytes plus binary-gigabyte views)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub percent: f32,
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
}

/// Disk stats for the root partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f32,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
}

/// Cumulative network counters summed across interfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub mb_sent: f64,
    pub mb_recv: f64,
}

/// Uptime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeStats {
    pub boot_time: u64,
    pub uptime_seconds: u64,
    pub uptime_text: String,
}

/// Flat stats snapshot, recomputed fully per call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub temperature_c: Option<f32>,
    pub network: NetworkStats,
    pub uptime: UptimeStats,
}

/// Convert bytes to binary gigabytes, rounded to 2 decimals
pub fn bytes_to_gib(bytes: u64) -> f64 {
    (bytes as f64 / 1024f64.powi(3) * 100.0).round() / 100.0
}

/// Convert bytes to binary megabytes, rounded to 2 decimals
pub fn bytes_to_mib(bytes: u64) -> f64 {
    (bytes as f64 / 1024f64.powi(2) * 100.0).round() / 100.0
}

/// Format an uptime in seconds as "{d}d {h}h {m}m"
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

/// SystemMonitor instance
pub struct SystemMonitor {
    sys: Mutex<System>,
    running: AtomicBool,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl SystemMonitor {
    /// Create new SystemMonitor
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new_all()),
            running: AtomicBool::new(false),
            monitor_task: Mutex::new(None),
        }
    }

    /// Take a full stats snapshot
    pub async fn snapshot(&self) -> SystemSnapshot {
        let (cpu, memory) = {
            let mut sys = self.sys.lock().await;
            sys.refresh_all();

            let cpus = sys.cpus();
            let usage_percent = if cpus.is_empty() {
                0.0
            } else {
                cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
            };
            let cpu = CpuStats {
                usage_percent: (usage_percent * 10.0).round() / 10.0,
                physical_cores: sys.physical_core_count().unwrap_or(1),
                logical_cores: cpus.len().max(1),
            };

            let total = sys.total_memory();
            let used = sys.used_memory();
            let available = sys.available_memory();
            let percent = if total > 0 {
                (used as f32 / total as f32) * 100.0
            } else {
                0.0
            };
            let memory = MemoryStats {
                total,
                used,
                available,
                percent: (percent * 10.0).round() / 10.0,
                total_gb: bytes_to_gib(total),
                used_gb: bytes_to_gib(used),
                available_gb: bytes_to_gib(available),
            };

            (cpu, memory)
        };

        SystemSnapshot {
            cpu,
            memory,
            disk: read_disk_stats(),
            temperature_c: read_temperature(),
            network: read_network_stats(),
            uptime: read_uptime(),
        }
    }

    /// Start the periodic broadcast loop. At most one loop runs.
    pub async fn start_monitoring(
        self: &Arc<Self>,
        hub: Arc<RealtimeHub>,
        interval: Duration,
    ) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !monitor.running.load(Ordering::SeqCst) {
                    break;
                }
                let stats = monitor.snapshot().await;
                hub.broadcast(HubMessage::SystemStats(stats)).await;
            }
        });

        let mut task = self.monitor_task.lock().await;
        *task = Some(handle);
        tracing::info!(interval_secs = interval.as_secs(), "Started system monitoring");
    }

    /// Stop the broadcast loop with a bounded join
    pub async fn stop_monitoring(&self) {
        self.running.store(false, Ordering::SeqCst);

        let handle = {
            let mut task = self.monitor_task.lock().await;
            task.take()
        };
        if let Some(handle) = handle {
            handle.abort();
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
            tracing::info!("Stopped system monitoring");
        }
    }

    /// Whether the broadcast loop is active
    pub fn is_monitoring(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Root partition usage
fn read_disk_stats() -> DiskStats {
    let disks = Disks::new_with_refreshed_list();
    let (used, total) = disks
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .map(|d| {
            let total = d.total_space();
            (total - d.available_space(), total)
        })
        .unwrap_or((0, 0));
    let free = total - used;
    let percent = if total > 0 {
        (used as f32 / total as f32) * 100.0
    } else {
        0.0
    };

    DiskStats {
        total,
        used,
        free,
        percent: (percent * 10.0).round() / 10.0,
        total_gb: bytes_to_gib(total),
        used_gb: bytes_to_gib(used),
        free_gb: bytes_to_gib(free),
    }
}

/// CPU temperature via sysinfo components, falling back to the Pi
/// thermal zone sysfs file. None when neither reports.
fn read_temperature() -> Option<f32> {
    let components = Components::new_with_refreshed_list();
    let from_components = components
        .iter()
        .find(|c| {
            let label = c.label().to_ascii_lowercase();
            label.contains("cpu") || label.contains("core")
        })
        .map(|c| c.temperature());

    from_components.or_else(|| {
        std::fs::read_to_string(THERMAL_ZONE_PATH)
            .ok()
            .and_then(|raw| raw.trim().parse::<f32>().ok())
            .map(|millis| (millis / 1000.0 * 10.0).round() / 10.0)
    })
}

/// Cumulative counters summed across all interfaces
fn read_network_stats() -> NetworkStats {
    let networks = Networks::new_with_refreshed_list();
    let mut bytes_sent = 0u64;
    let mut bytes_recv = 0u64;
    let mut packets_sent = 0u64;
    let mut packets_recv = 0u64;

    for (_name, data) in networks.iter() {
        bytes_sent += data.total_transmitted();
        bytes_recv += data.total_received();
        packets_sent += data.total_packets_transmitted();
        packets_recv += data.total_packets_received();
    }

    NetworkStats {
        bytes_sent,
        bytes_recv,
        packets_sent,
        packets_recv,
        mb_sent: bytes_to_mib(bytes_sent),
        mb_recv: bytes_to_mib(bytes_recv),
    }
}

fn read_uptime() -> UptimeStats {
    let uptime_seconds = System::uptime();
    UptimeStats {
        boot_time: System::boot_time(),
        uptime_seconds,
        uptime_text: format_uptime(uptime_seconds),
    }
}
