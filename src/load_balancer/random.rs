//! Uniform random load balancing strategy.

use std::sync::Arc;

use rand::Rng;

use crate::load_balancer::backend::Backend;

/// Uniform random selector. Holds no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }

    pub fn select<'a>(&self, live: &'a [Arc<Backend>]) -> Option<&'a Arc<Backend>> {
        match live.len() {
            0 => None,
            1 => live.first(),
            len => live.get(rand::thread_rng().gen_range(0..len)),
        }
    }
}
