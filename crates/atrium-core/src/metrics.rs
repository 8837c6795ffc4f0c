//! Host metrics sampling and caching.
//!
//! A background task samples CPU, memory, network and process counts via
//! `sysinfo` on a fixed interval, caches the latest snapshot for
//! late-subscriber catch-up and publishes it on the event bus as a
//! best-effort broadcast. Nothing here is owned by any connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Networks, ProcessesToUpdate, System};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::event_bus::{EventBus, WorkspaceEvent};

/// Overall health classification derived from CPU load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Load below the warning threshold
    Healthy,
    /// Load above 60%
    Warning,
    /// Load above 80%
    Critical,
}

impl HealthStatus {
    /// Classify a CPU load percentage.
    #[must_use]
    pub fn from_cpu_percent(percent: f64) -> Self {
        if percent > 80.0 {
            Self::Critical
        } else if percent > 60.0 {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

/// Memory usage figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Bytes in use
    pub used: u64,
    /// Total bytes
    pub total: u64,
    /// Used percentage of total
    pub percent: f64,
}

/// CPU usage figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    /// Aggregate load percentage across cores
    pub percent: f64,
    /// Logical core count
    pub cores: usize,
}

/// Cumulative network counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Bytes received across interfaces
    pub bytes_in: u64,
    /// Bytes transmitted across interfaces
    pub bytes_out: u64,
}

/// Immutable point-in-time view of host health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetricsSnapshot {
    /// Derived health classification
    pub status: HealthStatus,
    /// Seconds since the server started
    pub uptime_secs: u64,
    /// Memory usage
    pub memory: MemoryMetrics,
    /// CPU usage
    pub cpu: CpuMetrics,
    /// Network counters
    pub network: NetworkMetrics,
    /// Number of running processes
    pub process_count: usize,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
}

impl Default for SystemMetricsSnapshot {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            uptime_secs: 0,
            memory: MemoryMetrics {
                used: 0,
                total: 0,
                percent: 0.0,
            },
            cpu: CpuMetrics {
                percent: 0.0,
                cores: 0,
            },
            network: NetworkMetrics {
                bytes_in: 0,
                bytes_out: 0,
            },
            process_count: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Process-wide cache of the latest snapshot.
///
/// Connections that attach between sampler ticks read this for immediate
/// catch-up instead of waiting for the next broadcast.
#[derive(Debug, Default)]
pub struct MetricsCache {
    latest: RwLock<Option<SystemMetricsSnapshot>>,
}

impl MetricsCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached snapshot.
    pub async fn store(&self, snapshot: SystemMetricsSnapshot) {
        *self.latest.write().await = Some(snapshot);
    }

    /// Latest snapshot, if one was sampled yet.
    pub async fn latest(&self) -> Option<SystemMetricsSnapshot> {
        self.latest.read().await.clone()
    }
}

/// Spawn the background sampling loop.
///
/// Every `interval` the loop refreshes `sysinfo`, stores the snapshot in
/// `cache` and publishes it on `bus`. Fire and forget: publish failures
/// (no subscribers) are ignored.
pub fn spawn_sampler(
    cache: Arc<MetricsCache>,
    bus: EventBus,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut system = System::new();
        let mut networks = Networks::new_with_refreshed_list();
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately so a snapshot is available
        // right after startup.
        loop {
            ticker.tick().await;
            let snapshot = sample(&mut system, &mut networks, started.elapsed().as_secs());
            debug!(
                cpu = snapshot.cpu.percent,
                memory = snapshot.memory.percent,
                status = ?snapshot.status,
                "Metrics sample"
            );
            cache.store(snapshot.clone()).await;
            bus.publish(WorkspaceEvent::Metrics { snapshot });
        }
    })
}

fn sample(system: &mut System, networks: &mut Networks, uptime_secs: u64) -> SystemMetricsSnapshot {
    system.refresh_memory();
    system.refresh_cpu_usage();
    system.refresh_processes(ProcessesToUpdate::All, true);
    networks.refresh(true);

    let cpu_percent = f64::from(system.global_cpu_usage());
    let total = system.total_memory();
    let used = system.used_memory();
    let (bytes_in, bytes_out) = networks.iter().fold((0u64, 0u64), |(rx, tx), (_, data)| {
        (rx + data.total_received(), tx + data.total_transmitted())
    });

    SystemMetricsSnapshot {
        status: HealthStatus::from_cpu_percent(cpu_percent),
        uptime_secs,
        memory: MemoryMetrics {
            used,
            total,
            percent: if total == 0 {
                0.0
            } else {
                used as f64 / total as f64 * 100.0
            },
        },
        cpu: CpuMetrics {
            percent: cpu_percent,
            cores: system.cpus().len(),
        },
        network: NetworkMetrics {
            bytes_in,
            bytes_out,
        },
        process_count: system.processes().len(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_thresholds() {
        assert_eq!(HealthStatus::from_cpu_percent(10.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_cpu_percent(60.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_cpu_percent(61.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_cpu_percent(80.5), HealthStatus::Critical);
    }

    #[tokio::test]
    async fn test_cache_returns_newest() {
        let cache = MetricsCache::new();
        assert!(cache.latest().await.is_none());

        let first = SystemMetricsSnapshot {
            uptime_secs: 1,
            ..Default::default()
        };
        cache.store(first).await;

        let second = SystemMetricsSnapshot {
            uptime_secs: 2,
            ..Default::default()
        };
        cache.store(second).await;

        assert_eq!(cache.latest().await.unwrap().uptime_secs, 2);
    }

    #[tokio::test]
    async fn test_sampler_publishes_and_caches() {
        let cache = Arc::new(MetricsCache::new());
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let handle = spawn_sampler(
            Arc::clone(&cache),
            bus.clone(),
            Duration::from_millis(50),
        );

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no metrics event within 5s")
            .unwrap();
        match event {
            WorkspaceEvent::Metrics { snapshot } => {
                assert!(snapshot.cpu.cores > 0 || snapshot.memory.total > 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(cache.latest().await.is_some());

        handle.abort();
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = SystemMetricsSnapshot::default();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_secs\":0"));
    }
}
