//! Controller error types.

use thiserror::Error;

use crate::load_balancer::PolicyError;
use crate::openflow::{Cookie, FlowModError};

/// Why the controller refused a packet or a management request.
///
/// None of these are fatal: packet-path errors end in a drop and a
/// control event, management errors are returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("no live backends available")]
    NoBackendsAvailable,

    #[error("packet is not addressed to the virtual service")]
    NotForService,

    #[error("return traffic from a backend with no bound flow")]
    OrphanReturnTraffic,

    #[error("switch rejected flow pair {cookie}: {source}")]
    PartialInstallFailure {
        cookie: Cookie,
        #[source]
        source: FlowModError,
    },

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("backend '{0}' already exists")]
    DuplicateBackend(String),

    #[error("backend '{0}' would shadow the virtual service address")]
    BackendIsVirtualEndpoint(String),

    #[error("switch command channel closed")]
    SwitchGone,
}

impl ControlError {
    /// Short label used for the drop counter.
    pub fn reason(&self) -> &'static str {
        match self {
            ControlError::NoBackendsAvailable => "no_backends",
            ControlError::NotForService => "not_for_service",
            ControlError::OrphanReturnTraffic => "orphan_return",
            ControlError::PartialInstallFailure { .. } => "install_failed",
            ControlError::UnknownBackend(_) => "unknown_backend",
            ControlError::DuplicateBackend(_) => "duplicate_backend",
            ControlError::BackendIsVirtualEndpoint(_) => "backend_is_vip",
            ControlError::SwitchGone => "switch_gone",
        }
    }
}

impl From<PolicyError> for ControlError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::NoBackendsAvailable => ControlError::NoBackendsAvailable,
        }
    }
}
