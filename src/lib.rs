//! SDN load balancer control plane.
//!
//! Clients address one virtual service endpoint. A software switch forwards
//! packets that match its flow table; the first packet of an unknown flow is
//! buffered and handed to the controller, which picks a backend with the
//! configured policy and installs a forward and reverse entry pair so the
//! rest of the flow never leaves the data plane.

// Data plane and wire messages
pub mod flow;
pub mod openflow;
pub mod switch;

// Control plane
pub mod controller;
pub mod load_balancer;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::BalancerConfig;
pub use controller::{Controller, ControllerHandle};
pub use lifecycle::{Deployment, Shutdown};
pub use switch::{FlowTable, Switch};
