//! Flow match criteria.
//!
//! # Responsibilities
//! - Match a packet header tuple against optional (wildcarded) fields
//! - Rank matches by specificity for lookup precedence
//!
//! # Design Decisions
//! - `None` is a wildcard; an all-`Some` match is an exact 5-tuple
//! - Matches are plain hashable values so the table can key on them
//! - No masks or prefixes: fields are either exact or wildcarded

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::flow::{FlowKey, Protocol};

/// Header-field match with optional wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlowMatch {
    pub src_ip: Option<IpAddr>,
    pub src_port: Option<u16>,
    pub dst_ip: Option<IpAddr>,
    pub dst_port: Option<u16>,
    pub protocol: Option<Protocol>,
}

impl FlowMatch {
    /// A match with every field wildcarded.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Exact match on the full 5-tuple.
    pub fn exact(key: &FlowKey) -> Self {
        Self {
            src_ip: Some(key.src.ip()),
            src_port: Some(key.src.port()),
            dst_ip: Some(key.dst.ip()),
            dst_port: Some(key.dst.port()),
            protocol: Some(key.protocol),
        }
    }

    /// Exact match with the source port wildcarded.
    pub fn any_src_port(key: &FlowKey) -> Self {
        Self {
            src_port: None,
            ..Self::exact(key)
        }
    }

    /// Exact match with the destination port wildcarded.
    pub fn any_dst_port(key: &FlowKey) -> Self {
        Self {
            dst_port: None,
            ..Self::exact(key)
        }
    }

    /// Returns true if the header tuple satisfies every non-wildcard field.
    pub fn matches(&self, key: &FlowKey) -> bool {
        field_matches(self.src_ip, key.src.ip())
            && field_matches(self.src_port, key.src.port())
            && field_matches(self.dst_ip, key.dst.ip())
            && field_matches(self.dst_port, key.dst.port())
            && field_matches(self.protocol, key.protocol)
    }

    /// Number of non-wildcard fields.
    pub fn specificity(&self) -> u8 {
        [
            self.src_ip.is_some(),
            self.src_port.is_some(),
            self.dst_ip.is_some(),
            self.dst_port.is_some(),
            self.protocol.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count() as u8
    }

    /// The 5-tuple this match pins down, if nothing is wildcarded.
    pub fn as_exact_key(&self) -> Option<FlowKey> {
        Some(FlowKey::new(
            SocketAddr::new(self.src_ip?, self.src_port?),
            SocketAddr::new(self.dst_ip?, self.dst_port?),
            self.protocol?,
        ))
    }

    pub fn is_exact(&self) -> bool {
        self.as_exact_key().is_some()
    }
}

fn field_matches<T: PartialEq>(expected: Option<T>, actual: T) -> bool {
    expected.map(|v| v == actual).unwrap_or(true)
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn part<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "*".to_string())
        }
        write!(
            f,
            "{} {}:{} -> {}:{}",
            part(&self.protocol),
            part(&self.src_ip),
            part(&self.src_port),
            part(&self.dst_ip),
            part(&self.dst_port)
        )
    }
}
