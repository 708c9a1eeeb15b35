//! Source-address hashing strategy.
//!
//! Routes every flow from the same client address to the same backend for
//! as long as the live backend list is unchanged.

use std::net::IpAddr;
use std::sync::Arc;

use crate::flow::FlowKey;
use crate::load_balancer::backend::Backend;

/// IP-hash selector.
///
/// The hasher is seeded once at construction, so mappings are stable for
/// the lifetime of the selector.
#[derive(Debug, Clone, Default)]
pub struct IpHash {
    hasher: ahash::RandomState,
}

impl IpHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific hasher.
    pub fn with_hasher(hasher: ahash::RandomState) -> Self {
        Self { hasher }
    }

    pub fn hash(&self, addr: IpAddr) -> u64 {
        self.hasher.hash_one(addr)
    }

    pub fn select<'a>(&self, key: &FlowKey, live: &'a [Arc<Backend>]) -> Option<&'a Arc<Backend>> {
        if live.is_empty() {
            return None;
        }
        let index = (self.hash(key.src.ip()) % live.len() as u64) as usize;
        live.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Protocol;
    use crate::openflow::PortNo;

    fn pool(n: u16) -> Vec<Arc<Backend>> {
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

    fn key(src: &str) -> FlowKey {
        FlowKey::new(src.parse().unwrap(), "10.1.1.254:9".parse().unwrap(), Protocol::Udp)
    }

    #[test]
    fn test_same_client_same_backend() {
        let lb = IpHash::new();
        let backends = pool(2);
        let first = lb.select(&key("10.1.1.7:4000"), &backends).unwrap();
        for port in [4001, 5000, 65000] {
            let again = lb.select(&key(&format!("10.1.1.7:{}", port)), &backends).unwrap();
            assert_eq!(first.name, again.name);
        }
    }

    #[test]
    fn test_deterministic_across_calls() {
        let lb = IpHash::new();
        let backends = pool(5);
        for host in 1..50u8 {
            let k = key(&format!("10.1.1.{}:1234", host));
            let a = lb.select(&k, &backends).unwrap();
            let b = lb.select(&k, &backends).unwrap();
            assert!(Arc::ptr_eq(a, b));
        }
    }

    #[test]
    fn test_clients_spread() {
        let lb = IpHash::new();
        let backends = pool(3);
        let mut seen = [false; 3];
        for host in 1..=200u8 {
            let b = lb.select(&key(&format!("10.1.{}.1:1234", host)), &backends).unwrap();
            seen[(b.port.0 - 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
