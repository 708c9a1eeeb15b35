//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Controller miss for a new flow
//!     → pool.rs (snapshot of live backends)
//!     → Policy::select:
//!         - random.rs (uniform pick)
//!         - round_robin.rs (rotating cursor)
//!         - ip_hash.rs (hash of client address)
//!     → backend.rs (lease: active flow accounting)
//!     → Return backend or NoBackendsAvailable
//! ```
//!
//! # Design Decisions
//! - The policy set is closed, so `Policy` is an enum rather than a trait
//!   object
//! - Policy state (the round-robin cursor) is owned by the `Policy` value,
//!   which is owned by one controller
//! - Dead backends are filtered before the policy sees the list

pub mod backend;
pub mod ip_hash;
pub mod pool;
pub mod random;
pub mod round_robin;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flow::FlowKey;

pub use backend::{Backend, FlowLease};
pub use ip_hash::IpHash;
pub use pool::BackendPool;
pub use random::Random;
pub use round_robin::RoundRobin;

/// Selection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("no live backends available")]
    NoBackendsAvailable,
}

/// Configuration tag naming a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Random,
    #[default]
    RoundRobin,
    IpHash,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::Random => "random",
            PolicyKind::RoundRobin => "round_robin",
            PolicyKind::IpHash => "ip_hash",
        };
        f.write_str(name)
    }
}

/// A backend selection policy together with its state.
#[derive(Debug)]
pub enum Policy {
    Random(Random),
    RoundRobin(RoundRobin),
    IpHash(IpHash),
}

impl Policy {
    pub fn new(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Random => Policy::Random(Random::new()),
            PolicyKind::RoundRobin => Policy::RoundRobin(RoundRobin::new()),
            PolicyKind::IpHash => Policy::IpHash(IpHash::new()),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Random(_) => PolicyKind::Random,
            Policy::RoundRobin(_) => PolicyKind::RoundRobin,
            Policy::IpHash(_) => PolicyKind::IpHash,
        }
    }

    /// Choose a backend for `key` among the live members of `backends`.
    pub fn select(&self, key: &FlowKey, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, PolicyError> {
        let live: Vec<Arc<Backend>> = backends.iter().filter(|b| b.is_alive()).cloned().collect();
        let chosen = match self {
            Policy::Random(random) => random.select(&live),
            Policy::RoundRobin(round_robin) => round_robin.select(&live),
            Policy::IpHash(ip_hash) => ip_hash.select(key, &live),
        };
        chosen.cloned().ok_or(PolicyError::NoBackendsAvailable)
    }
}
