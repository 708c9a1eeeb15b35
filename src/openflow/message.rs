//! Messages exchanged between switch and controller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::flow::Packet;
use crate::openflow::action::Action;
use crate::openflow::matching::FlowMatch;

/// Switch port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortNo(pub u16);

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque tag shared by the forward and reverse entry of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cookie(pub u64);

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifier of a packet held in the switch's buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Entry timeouts. `None` disables the corresponding timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timeouts {
    pub idle: Option<Duration>,
    pub hard: Option<Duration>,
}

impl Timeouts {
    /// Build from second counts where `0` means "no timeout".
    pub fn from_secs(idle_secs: u64, hard_secs: u64) -> Self {
        let opt = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        Self {
            idle: opt(idle_secs),
            hard: opt(hard_secs),
        }
    }
}

/// One half of an entry pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSpec {
    pub flow_match: FlowMatch,
    pub actions: Arc<[Action]>,
    pub priority: u16,
}

/// Flow-table modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowMod {
    /// Install forward and reverse entries as one transaction.
    InstallPair {
        cookie: Cookie,
        forward: FlowSpec,
        reverse: FlowSpec,
        timeouts: Timeouts,
    },
    /// Remove every entry carrying `cookie`.
    DeleteCookie { cookie: Cookie },
}

impl FlowMod {
    pub fn cookie(&self) -> Cookie {
        match self {
            FlowMod::InstallPair { cookie, .. } | FlowMod::DeleteCookie { cookie } => *cookie,
        }
    }
}

/// Why a pair install was refused. Nothing from the pair is left installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowModError {
    #[error("flow table full ({capacity} entries)")]
    TableFull { capacity: usize },

    #[error("forward and reverse entries share match {0}")]
    OverlappingPair(FlowMatch),
}

/// Miss notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub in_port: PortNo,
    /// Set when the switch kept the packet; `None` means the packet was not
    /// buffered and travels only in this message.
    pub buffer_id: Option<BufferId>,
    pub packet: Packet,
}

/// Instruction to send a packet through an action list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub buffer_id: Option<BufferId>,
    pub in_port: PortNo,
    pub packet: Packet,
    pub actions: Arc<[Action]>,
    /// Release the packet only if this pair is installed; otherwise drop it.
    pub requires: Option<Cookie>,
}

/// Commands consumed by the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCommand {
    FlowMod(FlowMod),
    PacketOut(PacketOut),
    /// Discard a buffered packet.
    Drop { buffer_id: Option<BufferId> },
}

/// Reason a flow-table entry pair went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    IdleTimeout,
    HardTimeout,
    /// Deleted by the controller.
    Evicted,
    /// Displaced by an install that reused one of its matches.
    Replaced,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::IdleTimeout => "idle_timeout",
            RemovalReason::HardTimeout => "hard_timeout",
            RemovalReason::Evicted => "evicted",
            RemovalReason::Replaced => "replaced",
        }
    }
}

/// Removal notice for an entry pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRemoved {
    pub cookie: Cookie,
    pub reason: RemovalReason,
    /// Hits summed over both entries of the pair.
    pub hits: u64,
}

/// Events emitted by the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchEvent {
    PacketIn(PacketIn),
    FlowInstalled { cookie: Cookie },
    FlowModFailed { cookie: Cookie, error: FlowModError },
    FlowRemoved(FlowRemoved),
}
