use crate::worker::Worker;
use futures_util::FutureExt;
use maestro_core::{Capability, Payload};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct Registration {
    worker: Arc<dyn Worker>,
    config: Payload,
}

/// Capability-keyed registry of worker instances.
///
/// The registry is constructed explicitly and shared by `Arc`, so several
/// independent orchestrators can coexist in one process. Each worker may carry
/// a configuration map that is handed to it with every task.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<Capability, Registration>>,
}

/// Registry summary returned by [`WorkerRegistry::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStats {
    /// Number of registered workers.
    pub total_workers: usize,
    /// Registered capabilities in stable order.
    pub capabilities: Vec<Capability>,
    /// Result of a fresh [`WorkerRegistry::health_check`].
    pub health_status: BTreeMap<Capability, bool>,
}

impl WorkerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a worker for a capability with no configuration, returning the
    /// worker it replaced.
    pub fn register(
        &self,
        capability: Capability,
        worker: Arc<dyn Worker>,
    ) -> Option<Arc<dyn Worker>> {
        self.register_with_config(capability, worker, Payload::new())
    }

    /// Register a worker together with its configuration. Replacing a worker
    /// also replaces its configuration.
    pub fn register_with_config(
        &self,
        capability: Capability,
        worker: Arc<dyn Worker>,
        config: Payload,
    ) -> Option<Arc<dyn Worker>> {
        let mut config_keys: Vec<&String> = config.keys().collect();
        config_keys.sort();
        info!(
            capability = %capability,
            worker = %worker.name(),
            config_keys = ?config_keys,
            "Registered worker"
        );
        self.workers
            .write()
            .insert(capability, Registration { worker, config })
            .map(|previous| previous.worker)
    }

    /// Look up the worker serving a capability.
    pub fn get(&self, capability: Capability) -> Option<Arc<dyn Worker>> {
        self.get_with_config(capability).map(|(worker, _)| worker)
    }

    /// Look up a worker and its configuration in one read.
    pub fn get_with_config(&self, capability: Capability) -> Option<(Arc<dyn Worker>, Payload)> {
        let found = self
            .workers
            .read()
            .get(&capability)
            .map(|r| (Arc::clone(&r.worker), r.config.clone()));
        if found.is_none() {
            warn!(
                capability = %capability,
                available = ?self.list(),
                "Worker not found"
            );
        }
        found
    }

    /// Configuration registered for a capability; empty when none was given
    /// or nothing is registered.
    pub fn config(&self, capability: Capability) -> Payload {
        self.workers
            .read()
            .get(&capability)
            .map(|r| r.config.clone())
            .unwrap_or_default()
    }

    /// Remove the worker for a capability. Returns whether one was registered.
    pub fn unregister(&self, capability: Capability) -> bool {
        let removed = self.workers.write().remove(&capability).is_some();
        if removed {
            info!(capability = %capability, "Unregistered worker");
        } else {
            warn!(capability = %capability, "Attempted to unregister missing worker");
        }
        removed
    }

    /// Whether a worker serves `capability`.
    pub fn is_registered(&self, capability: Capability) -> bool {
        self.workers.read().contains_key(&capability)
    }

    /// Registered capabilities in stable order.
    pub fn list(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self.workers.read().keys().copied().collect();
        caps.sort();
        caps
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    /// Whether no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let mut workers = self.workers.write();
        let count = workers.len();
        workers.clear();
        info!(cleared = count, "Registry cleared");
    }

    /// Probe every registered worker.
    ///
    /// A probe that errors or panics is recorded as unhealthy; the fault is
    /// never propagated.
    pub async fn health_check(&self) -> BTreeMap<Capability, bool> {
        let workers: Vec<(Capability, Arc<dyn Worker>)> = self
            .workers
            .read()
            .iter()
            .map(|(cap, r)| (*cap, Arc::clone(&r.worker)))
            .collect();

        let mut status = BTreeMap::new();
        for (capability, worker) in workers {
            let healthy = match AssertUnwindSafe(worker.health_probe()).catch_unwind().await {
                Ok(Ok(healthy)) => healthy,
                Ok(Err(e)) => {
                    error!(capability = %capability, error = %e, "Worker health probe failed");
                    false
                }
                Err(_) => {
                    error!(capability = %capability, "Worker health probe panicked");
                    false
                }
            };
            debug!(capability = %capability, healthy, "Health probe");
            status.insert(capability, healthy);
        }
        status
    }

    /// Worker count, registered capabilities, and current health.
    pub async fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_workers: self.len(),
            capabilities: self.list(),
            health_status: self.health_check().await,
        }
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
