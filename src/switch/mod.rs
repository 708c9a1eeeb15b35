//! Data plane.
//!
//! # Data Flow
//! ```text
//! Packet on port P
//!     → table.rs lookup
//!         Hit     → apply actions → egress
//!         Expired → sweep (FlowRemoved ↑) → miss path
//!         Miss    → buffer.rs store → PacketIn ↑ controller
//!
//! Controller command ↓
//!     InstallPair  → table.rs (both entries or neither) → FlowInstalled | FlowModFailed ↑
//!     DeleteCookie → table.rs evict → FlowRemoved ↑
//!     PacketOut    → buffer.rs take → apply actions → egress
//!     Drop         → buffer.rs take
//! ```
//!
//! # Design Decisions
//! - The flow table is shared (`Arc`) so observers can read it directly
//! - Only the switch mutates the table; the controller programs it with
//!   messages

pub mod buffer;
pub mod datapath;
pub mod table;

pub use datapath::{Egress, Switch, SwitchError};
pub use table::{EntryStats, FlowTable, Lookup};
