//! Flow identification.
//!
//! # Data Flow
//! ```text
//! Packet arrives at switch
//!     → packet.rs (header tuple + payload handle)
//!     → key.rs (FlowKey: src, dst, protocol)
//!     → used as the lookup key by the flow table
//!     → used as the binding key by the controller
//! ```
//!
//! # Design Decisions
//! - FlowKey is `Copy` and hashable; it never changes once observed
//! - Reverse traffic derives its key with `FlowKey::reverse`
//! - Payloads are `bytes::Bytes` handles so buffering never copies

pub mod key;
pub mod packet;

pub use key::{FlowKey, Protocol};
pub use packet::Packet;
