//! Control events published for observers.
//!
//! Events go out on a `broadcast` channel; with no subscribers they are
//! discarded. A lagging subscriber loses the oldest events, never blocks
//! the controller.

use crate::controller::error::ControlError;
use crate::flow::FlowKey;
use crate::openflow::{Cookie, RemovalReason};

/// Something the controller decided or observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// A new flow was bound to a backend and its entry pair requested.
    Assigned {
        flow: FlowKey,
        backend: String,
        cookie: Cookie,
    },
    /// The switch confirmed the entry pair.
    Established { cookie: Cookie },
    /// A further miss for a flow that already has a binding.
    DuplicateMiss { flow: FlowKey, cookie: Cookie },
    /// The triggering packet was dropped.
    Dropped { flow: FlowKey, error: ControlError },
    /// The switch refused the pair; the binding was rolled back.
    RolledBack { flow: FlowKey, error: ControlError },
    /// An entry pair left the switch and its binding was released.
    Removed {
        flow: FlowKey,
        cookie: Cookie,
        reason: RemovalReason,
    },
    /// Liveness of a backend changed.
    BackendAlive { backend: String, alive: bool },
    /// A backend joined the pool.
    BackendAdded { backend: String },
    /// A backend left the pool.
    BackendRemoved { backend: String },
    /// Bindings to a backend were torn down after it went away.
    Evicted { backend: String, flows: usize },
}
