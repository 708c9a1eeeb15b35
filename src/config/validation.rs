//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Keep the virtual endpoint distinct from every backend identity
//! - Reject duplicate backend names and addresses
//! - Validate value ranges the runtime depends on
//! - Require at least one entry timeout so bindings are eventually released
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::BalancerConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("backend '{0}' uses the virtual service address {1}")]
    BackendIsVirtualEndpoint(String, SocketAddr),

    #[error("duplicate backend name '{0}'")]
    DuplicateBackendName(String),

    #[error("backends '{0}' and '{1}' share address {2}")]
    DuplicateBackendAddress(String, String, SocketAddr),

    #[error("backend name must not be empty")]
    EmptyBackendName,

    #[error("flow_table.capacity must hold at least one entry pair (got {0})")]
    TableTooSmall(usize),

    #[error("flow_table.idle_timeout_secs and hard_timeout_secs are both 0; entries would never expire")]
    NeverExpires,

    #[error("flow_table.sweep_interval_ms must be greater than 0")]
    ZeroSweepInterval,

    #[error("switch.channel_capacity must be greater than 0")]
    ZeroChannelCapacity,

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let vip = config.service.address;

    let mut names = HashSet::new();
    let mut addresses: Vec<(&str, SocketAddr)> = Vec::new();
    for backend in &config.backends {
        if backend.name.trim().is_empty() {
            errors.push(ValidationError::EmptyBackendName);
        } else if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackendName(backend.name.clone()));
        }

        if backend.address == vip {
            errors.push(ValidationError::BackendIsVirtualEndpoint(
                backend.name.clone(),
                vip,
            ));
        }

        if let Some((other, _)) = addresses.iter().find(|(_, addr)| *addr == backend.address) {
            errors.push(ValidationError::DuplicateBackendAddress(
                other.to_string(),
                backend.name.clone(),
                backend.address,
            ));
        }
        addresses.push((&backend.name, backend.address));
    }

    if config.flow_table.capacity < 2 {
        errors.push(ValidationError::TableTooSmall(config.flow_table.capacity));
    }
    if config.flow_table.idle_timeout_secs == 0 && config.flow_table.hard_timeout_secs == 0 {
        errors.push(ValidationError::NeverExpires);
    }
    if config.flow_table.sweep_interval_ms == 0 {
        errors.push(ValidationError::ZeroSweepInterval);
    }
    if config.switch.channel_capacity == 0 {
        errors.push(ValidationError::ZeroChannelCapacity);
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
