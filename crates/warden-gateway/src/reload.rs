//! Policy and route snapshots, and manifest hot reload.
//!
//! A [`Snapshot`] pairs the policy engine with the proxy router built from
//! the same manifest. Requests take the current snapshot once at entry, so a
//! reload never mixes the policy of one manifest with the routes of another.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use warden_config::{FileWatcher, Manifest};
use warden_policy::{PolicyEngine, PolicyProvider};

use crate::error::GatewayResult;
use crate::health::HealthChecker;
use crate::router::ProxyRouter;
use crate::shutdown::ShutdownSignal;

/// Policy and routes from one manifest.
pub struct Snapshot {
    policy: Arc<dyn PolicyProvider>,
    router: ProxyRouter,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("loaded_at", &self.policy.loaded_at())
            .field("routes", &self.router.len())
            .finish()
    }
}

impl Snapshot {
    /// Pair a policy provider with a router.
    pub fn new(policy: Arc<dyn PolicyProvider>, router: ProxyRouter) -> Self {
        Self { policy, router }
    }

    /// Build both halves from a manifest.
    pub fn from_manifest(manifest: &Manifest) -> GatewayResult<Self> {
        let router = ProxyRouter::new(&manifest.proxies)?;
        let engine = PolicyEngine::new(manifest.policy_pool()?);
        Ok(Self::new(Arc::new(engine), router))
    }

    /// Load a manifest file and build a snapshot.
    pub fn load(path: &Path) -> GatewayResult<Self> {
        Self::from_manifest(&Manifest::from_file(path)?)
    }

    /// The policy.
    pub fn policy(&self) -> &dyn PolicyProvider {
        self.policy.as_ref()
    }

    /// The routes.
    pub fn router(&self) -> &ProxyRouter {
        &self.router
    }

    /// When the policy was built.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.policy.loaded_at()
    }
}

/// The serving snapshot, swapped atomically on reload.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotHandle {
    /// Start serving `snapshot`.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current snapshot.
    pub fn swap(&self, snapshot: Snapshot) {
        *self.current.write() = Arc::new(snapshot);
    }
}

/// Reload `path` into `handle`.
///
/// On failure the previous snapshot keeps serving.
pub fn reload_manifest(path: &Path, handle: &SnapshotHandle, health: &HealthChecker) -> bool {
    match Snapshot::load(path) {
        Ok(snapshot) => {
            tracing::info!(
                path = %path.display(),
                routes = snapshot.router().len(),
                loaded_at = %snapshot.loaded_at(),
                "Manifest reloaded"
            );
            handle.swap(snapshot);
            health.record_reload();
            true
        }
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Manifest reload failed, keeping previous policy"
            );
            health.record_reload_failure();
            false
        }
    }
}

/// Watch the manifest and reload it on change until shutdown.
pub async fn watch_manifest(
    path: PathBuf,
    debounce: Duration,
    handle: Arc<SnapshotHandle>,
    health: Arc<HealthChecker>,
    shutdown: ShutdownSignal,
) -> GatewayResult<()> {
    let mut watcher = FileWatcher::builder()
        .with_debounce(debounce)
        .watch_file(&path)?
        .build()?;
    tracing::info!(path = %path.display(), "Watching manifest for changes");

    let mut stop = shutdown.recv();
    loop {
        tokio::select! {
            () = &mut stop => break,
            event = watcher.next() => {
                let Some(event) = event else {
                    tracing::warn!("Manifest watcher stopped");
                    break;
                };
                tracing::debug!(path = %event.path.display(), kind = ?event.kind, "Manifest changed");
                reload_manifest(&path, &handle, &health);
            }
        }
    }
    Ok(())
}
