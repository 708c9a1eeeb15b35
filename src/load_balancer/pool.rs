//! Backend pool management.
//!
//! # Responsibilities
//! - Hold the configured backend set for one virtual service
//! - Publish membership snapshots for lock-free reads on the miss path
//! - Add, remove, and flag backends without disturbing installed flows

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::BackendConfig;
use crate::load_balancer::backend::Backend;

/// Membership of the backend set.
#[derive(Debug)]
pub struct BackendPool {
    members: ArcSwap<Vec<Arc<Backend>>>,
}

impl BackendPool {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            members: ArcSwap::from_pointee(backends),
        }
    }

    /// Create a pool from configuration.
    pub fn from_config(configs: &[BackendConfig]) -> Self {
        Self::new(
            configs
                .iter()
                .map(|c| Arc::new(Backend::from_config(c)))
                .collect(),
        )
    }

    /// Current membership, in configuration order.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Backend>>> {
        self.members.load_full()
    }

    /// Backends currently flagged alive, in configuration order.
    pub fn live(&self) -> Vec<Arc<Backend>> {
        self.members
            .load()
            .iter()
            .filter(|b| b.is_alive())
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Backend>> {
        self.members.load().iter().find(|b| b.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.members.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a backend. Returns false if the name is already taken.
    pub fn add(&self, backend: Arc<Backend>) -> bool {
        let mut added = false;
        self.members.rcu(|current| {
            added = !current.iter().any(|b| b.name == backend.name);
            if !added {
                return Arc::clone(current);
            }
            let mut next = (**current).clone();
            next.push(backend.clone());
            Arc::new(next)
        });
        if added {
            tracing::info!(backend = %backend, "Backend added to pool");
        }
        added
    }

    /// Remove a backend by name. Flows bound to it keep their lease until
    /// they end.
    pub fn remove(&self, name: &str) -> Option<Arc<Backend>> {
        let mut removed = None;
        self.members.rcu(|current| {
            removed = current.iter().find(|b| b.name == name).cloned();
            if removed.is_none() {
                return Arc::clone(current);
            }
            Arc::new(
                current
                    .iter()
                    .filter(|b| b.name != name)
                    .cloned()
                    .collect::<Vec<_>>(),
            )
        });
        if let Some(backend) = &removed {
            tracing::info!(backend = %backend, active_flows = backend.active_flows(), "Backend removed from pool");
        }
        removed
    }
}
