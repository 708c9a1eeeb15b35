//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! balancer. All types derive Serde traits for deserialization from TOML.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::flow::Protocol;
use crate::load_balancer::PolicyKind;
use crate::openflow::Timeouts;

/// Root configuration for one virtual service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Virtual endpoint clients address.
    pub service: ServiceConfig,

    /// Selection policy and flow binding behavior.
    pub balancing: BalancingConfig,

    /// Backend server definitions.
    pub backends: Vec<BackendConfig>,

    /// Flow entry timeouts and table limits.
    pub flow_table: FlowTableConfig,

    /// Switch buffers and channels.
    pub switch: SwitchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Virtual endpoint configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Virtual address and port (e.g., "10.1.1.254:9").
    pub address: SocketAddr,

    /// Protocols balanced; other traffic to the address is dropped.
    pub protocol: ProtocolFilter,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([10, 1, 1, 254], 9)),
            protocol: ProtocolFilter::Udp,
        }
    }
}

/// Protocols accepted by the virtual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFilter {
    #[default]
    Any,
    Tcp,
    Udp,
}

impl ProtocolFilter {
    pub fn admits(self, protocol: Protocol) -> bool {
        match self {
            ProtocolFilter::Any => true,
            ProtocolFilter::Tcp => protocol == Protocol::Tcp,
            ProtocolFilter::Udp => protocol == Protocol::Udp,
        }
    }
}

/// How finely flow entries match client traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchGranularity {
    /// One entry pair per 5-tuple.
    #[default]
    Connection,
    /// One entry pair per client address; the client port is wildcarded.
    Client,
}

/// What happens to established flows when their backend dies or leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendDownAction {
    /// Leave the entries until they time out.
    #[default]
    Expire,
    /// Delete the entries right away.
    Evict,
}

/// Balancing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancingConfig {
    /// Backend selection policy.
    pub policy: PolicyKind,

    /// Flow entry granularity.
    pub granularity: MatchGranularity,

    /// Reaction to a backend going down or being removed.
    pub on_backend_down: BackendDownAction,
}

/// Backend server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// Real backend address (e.g., "10.1.2.1:9").
    pub address: SocketAddr,

    /// Switch port the backend hangs off.
    pub switch_port: u16,

    /// Initial liveness.
    #[serde(default = "default_alive")]
    pub alive: bool,
}

fn default_alive() -> bool {
    true
}

/// Flow table configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowTableConfig {
    /// Idle timeout in seconds (0 = none).
    pub idle_timeout_secs: u64,

    /// Hard timeout in seconds (0 = none).
    pub hard_timeout_secs: u64,

    /// Maximum number of entries (each flow uses two).
    pub capacity: usize,

    /// Priority given to installed entries.
    pub priority: u16,

    /// Expiry sweep interval in milliseconds.
    pub sweep_interval_ms: u64,
}

impl FlowTableConfig {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from_secs(self.idle_timeout_secs, self.hard_timeout_secs)
    }
}

impl Default for FlowTableConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 10,
            hard_timeout_secs: 0,
            capacity: 4096,
            priority: 100,
            sweep_interval_ms: 500,
        }
    }
}

/// Switch configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Packets held while awaiting the controller.
    pub buffer_capacity: usize,

    /// Age after which an unanswered buffered packet is discarded.
    pub buffer_timeout_ms: u64,

    /// Depth of the switch/controller channels.
    pub channel_capacity: usize,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
            buffer_timeout_ms: 1000,
            channel_capacity: 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
