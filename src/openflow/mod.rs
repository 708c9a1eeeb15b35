//! Switch/controller protocol vocabulary.
//!
//! # Data Flow
//! ```text
//! Switch ──SwitchEvent──▶ Controller
//!     PacketIn        (miss: in-port, buffer id, header + payload)
//!     FlowInstalled   (pair committed)
//!     FlowModFailed   (pair rejected, nothing committed)
//!     FlowRemoved     (pair expired or evicted)
//!
//! Controller ──ControllerCommand──▶ Switch
//!     FlowMod         (InstallPair | DeleteCookie)
//!     PacketOut       (release buffered packet through actions)
//!     Drop            (discard buffered packet)
//! ```
//!
//! # Design Decisions
//! - Modeled on OpenFlow 1.0 match/action semantics
//! - Forward and reverse entries travel in one `InstallPair` message so the
//!   switch can commit them atomically
//! - A cookie ties the two entries of a pair together for removal

pub mod action;
pub mod matching;
pub mod message;

pub use action::{apply_actions, Action};
pub use matching::FlowMatch;
pub use message::{
    BufferId, ControllerCommand, Cookie, FlowMod, FlowModError, FlowRemoved, FlowSpec, PacketIn,
    PacketOut, PortNo, RemovalReason, SwitchEvent, Timeouts,
};
