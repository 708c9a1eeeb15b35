//! Control plane.
//!
//! # Data Flow
//! ```text
//! SwitchEvent (mpsc, FIFO)
//!     → runtime.rs (event loop)
//!     → engine.rs:
//!         PacketIn      → admit → bindings entry
//!                           occupied: PacketOut (existing actions)
//!                           vacant:   Policy::select → InstallPair + PacketOut
//!         FlowInstalled → Pending → Established
//!                         (released binding: DeleteCookie)
//!         FlowModFailed → roll binding back
//!         FlowRemoved   → release binding
//!     → ControllerCommand (mpsc) back to the switch
//!     → ControlEvent (broadcast) to observers
//! ```

pub mod binding;
pub mod engine;
pub mod error;
pub mod events;
pub mod runtime;

pub use binding::{Binding, FlowState};
pub use engine::{BackendStats, Controller, ControllerConfig, FlowStats};
pub use error::ControlError;
pub use events::ControlEvent;
pub use runtime::ControllerHandle;
