//! Packets as seen by the data plane.

use bytes::Bytes;

use crate::flow::key::FlowKey;

/// A packet: its header tuple plus an opaque payload handle.
///
/// Header rewrites performed by flow actions mutate `key`; the payload is
/// never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub key: FlowKey,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(key: FlowKey, payload: impl Into<Bytes>) -> Self {
        Self {
            key,
            payload: payload.into(),
        }
    }

    pub fn flow_key(&self) -> FlowKey {
        self.key
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
