//! Liveness reporting for `/healthz`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving with the latest manifest.
    Healthy,
    /// Serving, but the last manifest reload failed.
    Degraded,
    /// Not ready to serve.
    Unhealthy,
}

impl HealthStatus {
    /// Check if the status indicates the service is operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

/// Body of `/healthz`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status.
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// When the serving policy was built.
    pub policy_loaded_at: DateTime<Utc>,
    /// Successful manifest reloads since start.
    pub reloads: u64,
    /// Failed manifest reloads since start.
    pub reload_failures: u64,
}

/// Tracks readiness and reload outcomes.
#[derive(Debug)]
pub struct HealthChecker {
    start_time: Instant,
    ready: AtomicBool,
    last_reload_failed: AtomicBool,
    reloads: AtomicU64,
    reload_failures: AtomicU64,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    /// Create a new health checker, not yet ready.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            ready: AtomicBool::new(false),
            last_reload_failed: AtomicBool::new(false),
            reloads: AtomicU64::new(0),
            reload_failures: AtomicU64::new(0),
        }
    }

    /// Mark the gateway as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if the gateway is ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Record a successful reload.
    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
        self.last_reload_failed.store(false, Ordering::SeqCst);
    }

    /// Record a failed reload.
    pub fn record_reload_failure(&self) {
        self.reload_failures.fetch_add(1, Ordering::Relaxed);
        self.last_reload_failed.store(true, Ordering::SeqCst);
    }

    /// Get the uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Current status.
    pub fn status(&self) -> HealthStatus {
        if !self.is_ready() {
            HealthStatus::Unhealthy
        } else if self.last_reload_failed.load(Ordering::SeqCst) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Perform a liveness check.
    pub fn liveness(&self, policy_loaded_at: DateTime<Utc>) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: crate::VERSION.to_string(),
            uptime_seconds: self.uptime().as_secs(),
            policy_loaded_at,
            reloads: self.reloads.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
        }
    }
}
