//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server behind the virtual endpoint
//! - Track liveness as reported by an external health checker
//! - Track flows currently bound to it (observability only)

use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::observability::metrics;
use crate::openflow::PortNo;

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Unique backend name.
    pub name: String,
    /// Real address flows are rewritten to.
    pub addr: SocketAddr,
    /// Switch port the backend is attached to.
    pub port: PortNo,
    alive: AtomicBool,
    active_flows: AtomicUsize,
}

impl Backend {
    /// Create a new backend, initially alive.
    pub fn new(name: impl Into<String>, addr: SocketAddr, port: PortNo) -> Self {
        Self {
            name: name.into(),
            addr,
            port,
            alive: AtomicBool::new(true),
            active_flows: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        let backend = Self::new(config.name.clone(), config.address, PortNo(config.switch_port));
        backend.alive.store(config.alive, Ordering::Relaxed);
        backend
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Set liveness. Returns true if the flag changed.
    pub fn set_alive(&self, alive: bool) -> bool {
        let changed = self.alive.swap(alive, Ordering::Relaxed) != alive;
        if changed {
            metrics::record_backend_alive(&self.name, alive);
        }
        changed
    }

    /// Number of flows currently bound to this backend.
    pub fn active_flows(&self) -> usize {
        self.active_flows.load(Ordering::Relaxed)
    }

    /// Bind a flow to this backend for as long as the lease lives.
    pub fn lease(self: &Arc<Self>) -> FlowLease {
        let count = self.active_flows.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_backend_active_flows(&self.name, count);
        FlowLease {
            backend: self.clone(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} via port {})", self.name, self.addr, self.port)
    }
}

/// A RAII guard that manages the active flow count.
#[derive(Debug)]
pub struct FlowLease {
    backend: Arc<Backend>,
}

impl FlowLease {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Deref for FlowLease {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for FlowLease {
    fn drop(&mut self) {
        let count = self.backend.active_flows.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::record_backend_active_flows(&self.backend.name, count);
    }
}
