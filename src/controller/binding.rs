//! Per-flow backend bindings.

use std::fmt;
use std::sync::Arc;

use crate::flow::FlowKey;
use crate::load_balancer::{Backend, FlowLease};
use crate::openflow::{Action, Cookie};

/// Controller-side lifecycle of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowState {
    /// No binding; the next miss selects a backend.
    Unseen,
    /// Commands sent, switch has not confirmed the pair yet.
    Pending,
    /// Switch confirmed the pair.
    Established,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Unseen => "unseen",
            FlowState::Pending => "pending",
            FlowState::Established => "established",
        };
        f.write_str(name)
    }
}

/// The authoritative backend assignment for one forward match.
///
/// Holding the binding holds a lease on the backend, so the backend's
/// active flow count tracks live bindings.
#[derive(Debug)]
pub struct Binding {
    pub cookie: Cookie,
    /// Key of the packet that created the binding.
    pub flow: FlowKey,
    pub state: FlowState,
    pub forward_actions: Arc<[Action]>,
    lease: FlowLease,
}

impl Binding {
    pub fn pending(cookie: Cookie, flow: FlowKey, lease: FlowLease, forward_actions: Arc<[Action]>) -> Self {
        Self {
            cookie,
            flow,
            state: FlowState::Pending,
            forward_actions,
            lease,
        }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        self.lease.backend()
    }

    /// Whether the lease is on this exact backend instance. A backend
    /// re-added under the same name is a different instance.
    pub fn is_bound_to(&self, backend: &Arc<Backend>) -> bool {
        Arc::ptr_eq(self.lease.backend(), backend)
    }
}
