//! Flow actions and their application to packets.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::flow::Packet;
use crate::openflow::message::PortNo;

/// A single flow action, applied in list order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Emit the packet, as rewritten so far, on a switch port.
    Output(PortNo),
    /// Rewrite the source IP address.
    SetIpSrc(IpAddr),
    /// Rewrite the destination IP address.
    SetIpDst(IpAddr),
    /// Rewrite the source transport port.
    SetTpSrc(u16),
    /// Rewrite the destination transport port.
    SetTpDst(u16),
}

impl Action {
    /// Rewrite the destination to `addr` (address and port).
    pub fn set_dst(addr: SocketAddr) -> [Action; 2] {
        [Action::SetIpDst(addr.ip()), Action::SetTpDst(addr.port())]
    }

    /// Rewrite the source to `addr` (address and port).
    pub fn set_src(addr: SocketAddr) -> [Action; 2] {
        [Action::SetIpSrc(addr.ip()), Action::SetTpSrc(addr.port())]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Output(port) => write!(f, "output:{}", port),
            Action::SetIpSrc(ip) => write!(f, "set_nw_src:{}", ip),
            Action::SetIpDst(ip) => write!(f, "set_nw_dst:{}", ip),
            Action::SetTpSrc(port) => write!(f, "set_tp_src:{}", port),
            Action::SetTpDst(port) => write!(f, "set_tp_dst:{}", port),
        }
    }
}

/// Run an action list over a packet.
///
/// Returns one `(port, packet)` per `Output` action, each carrying the
/// header rewrites applied before it. An empty result means drop.
pub fn apply_actions(actions: &[Action], mut packet: Packet) -> Vec<(PortNo, Packet)> {
    let mut out = Vec::with_capacity(1);
    for action in actions {
        match *action {
            Action::Output(port) => out.push((port, packet.clone())),
            Action::SetIpSrc(ip) => packet.key.src.set_ip(ip),
            Action::SetIpDst(ip) => packet.key.dst.set_ip(ip),
            Action::SetTpSrc(port) => packet.key.src.set_port(port),
            Action::SetTpDst(port) => packet.key.dst.set_port(port),
        }
    }
    out
}
