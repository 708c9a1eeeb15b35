//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::backend::Backend;

/// Round-robin selector.
/// Stores an internal cursor to rotate through the live backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the rotation at `cursor`.
    pub fn starting_at(cursor: usize) -> Self {
        Self {
            cursor: AtomicUsize::new(cursor),
        }
    }

    /// Next position the cursor will hand out.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Pick `live[cursor mod len]` and advance the cursor.
    ///
    /// The modulo is taken against the slice given to this call, so a
    /// shrinking live set never produces an out-of-range index.
    pub fn select<'a>(&self, live: &'a [Arc<Backend>]) -> Option<&'a Arc<Backend>> {
        if live.is_empty() {
            return None;
        }
        let ticket = self.cursor.fetch_add(1, Ordering::Relaxed);
        live.get(ticket % live.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow::PortNo;

    fn backends(n: u16) -> Vec<Arc<Backend>> {
        (1..=n)
            .map(|i| {
                Arc::new(Backend::new(
                    format!("s{}", i),
                    format!("10.1.2.{}:9", i).parse().unwrap(),
                    PortNo(i),
                ))
            })
            .collect()
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let pool = backends(3);

        let picks: Vec<_> = (0..6).map(|_| lb.select(&pool).unwrap().name.clone()).collect();
        assert_eq!(picks, vec!["s1", "s2", "s3", "s1", "s2", "s3"]);
    }

    #[test]
    fn test_even_distribution() {
        for n in 1..=5u16 {
            let lb = RoundRobin::new();
            let pool = backends(n);
            let calls = 37;
            let mut counts = vec![0usize; n as usize];
            for _ in 0..calls {
                let b = lb.select(&pool).unwrap();
                counts[(b.port.0 - 1) as usize] += 1;
            }
            let floor = calls / n as usize;
            let ceil = calls.div_ceil(n as usize);
            for c in counts {
                assert!(c == floor || c == ceil, "count {} outside [{}, {}]", c, floor, ceil);
            }
        }
    }

    #[test]
    fn test_shrinking_set_stays_in_range() {
        let lb = RoundRobin::starting_at(usize::MAX - 1);
        let pool = backends(3);
        for len in [3, 2, 1, 2, 3] {
            assert!(lb.select(&pool[..len]).is_some());
        }
        assert!(lb.select(&[]).is_none());
    }
}
