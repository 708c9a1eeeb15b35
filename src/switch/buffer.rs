//! Packet buffers held while the controller decides.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::flow::Packet;
use crate::openflow::{BufferId, PortNo};

struct Buffered {
    in_port: PortNo,
    packet: Packet,
    stored_at: Instant,
}

/// Bounded pool of packets awaiting a PacketOut or Drop.
pub struct BufferPool {
    slots: HashMap<BufferId, Buffered>,
    capacity: usize,
    max_age: Duration,
    next_id: u32,
}

impl BufferPool {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            capacity,
            max_age,
            next_id: 0,
        }
    }

    /// Store a packet. Returns `None` when the pool is full.
    pub fn store(&mut self, in_port: PortNo, packet: Packet, now: Instant) -> Option<BufferId> {
        if self.slots.len() >= self.capacity {
            return None;
        }
        let id = loop {
            let id = BufferId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            if !self.slots.contains_key(&id) {
                break id;
            }
        };
        self.slots.insert(
            id,
            Buffered {
                in_port,
                packet,
                stored_at: now,
            },
        );
        Some(id)
    }

    /// Take a buffered packet out of the pool.
    pub fn take(&mut self, id: BufferId) -> Option<(PortNo, Packet)> {
        self.slots.remove(&id).map(|b| (b.in_port, b.packet))
    }

    /// Drop buffers older than the configured age. Returns how many went.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.slots.len();
        let max_age = self.max_age;
        self.slots
            .retain(|_, b| now.saturating_duration_since(b.stored_at) < max_age);
        before - self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
