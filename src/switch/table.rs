//! Switch flow table.
//!
//! # Responsibilities
//! - Match packets against installed entries (exact before wildcard)
//! - Install forward/reverse entry pairs as one transaction
//! - Expire pairs on idle/hard timeout, evict on request
//! - Count hits per entry
//!
//! # Design Decisions
//! - One `RwLock` over the whole table: lookups share the read lock and
//!   record hits through atomics; install/evict/sweep take the write lock,
//!   so an entry is never removed while a lookup is reading it
//! - Expiry is checked on every lookup; an expired entry is never a hit
//!   even if the sweep has not run yet
//! - Both entries of a pair share one activity clock, so a hit in either
//!   direction keeps both alive and they idle out together

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::flow::FlowKey;
use crate::openflow::{
    Action, Cookie, FlowMatch, FlowModError, FlowRemoved, FlowSpec, RemovalReason, Timeouts,
};

/// Result of a table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit {
        cookie: Cookie,
        actions: Arc<[Action]>,
    },
    /// Nothing matched, and nothing that would have matched is stale.
    Miss,
    /// Only timed-out entries matched; the caller should sweep.
    Expired { cookie: Cookie },
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStats {
    pub flow_match: FlowMatch,
    pub cookie: Cookie,
    pub priority: u16,
    pub hits: u64,
    pub age: Duration,
    pub idle: Duration,
}

struct FlowEntry {
    actions: Arc<[Action]>,
    priority: u16,
    cookie: Cookie,
    timeouts: Timeouts,
    installed_at: Instant,
    hits: AtomicU64,
    /// Nanoseconds since the table epoch of the last hit on either entry of
    /// the pair.
    last_active: Arc<AtomicU64>,
}

#[derive(Default)]
struct TableState {
    entries: HashMap<FlowMatch, FlowEntry>,
    /// Wildcarded matches, most specific (then highest priority) first.
    wildcards: Vec<(u8, u16, FlowMatch)>,
    pairs: HashMap<Cookie, [FlowMatch; 2]>,
}

/// Concurrent flow table with paired entries.
pub struct FlowTable {
    state: RwLock<TableState>,
    capacity: usize,
    epoch: Instant,
}

impl FlowTable {
    /// Create an empty table holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(TableState::default()),
            capacity,
            epoch: Instant::now(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of installed pairs.
    pub fn pair_count(&self) -> usize {
        self.read().pairs.len()
    }

    pub fn contains_cookie(&self, cookie: Cookie) -> bool {
        self.read().pairs.contains_key(&cookie)
    }

    /// Find the entry for a header tuple and record the hit.
    pub fn lookup(&self, key: &FlowKey, now: Instant) -> Lookup {
        let state = self.read();
        let now_nanos = self.nanos(now);
        let mut stale = None;

        let exact = FlowMatch::exact(key);
        let candidates = std::iter::once(&exact).chain(
            state
                .wildcards
                .iter()
                .map(|(_, _, m)| m)
                .filter(|m| m.matches(key)),
        );

        for flow_match in candidates {
            let Some(entry) = state.entries.get(flow_match) else {
                continue;
            };
            if self.expiry(entry, now).is_some() {
                stale.get_or_insert(entry.cookie);
                continue;
            }
            entry.hits.fetch_add(1, Ordering::Relaxed);
            entry.last_active.fetch_max(now_nanos, Ordering::Relaxed);
            return Lookup::Hit {
                cookie: entry.cookie,
                actions: entry.actions.clone(),
            };
        }

        match stale {
            Some(cookie) => Lookup::Expired { cookie },
            None => Lookup::Miss,
        }
    }

    /// Install a forward/reverse pair under `cookie`.
    ///
    /// Either both entries are committed or the table is left untouched.
    /// Re-installing a cookie replaces its previous pair and resets its
    /// timeouts. Pairs owning a match reused here are removed whole and
    /// returned with `RemovalReason::Replaced`.
    pub fn install_pair(
        &self,
        cookie: Cookie,
        forward: FlowSpec,
        reverse: FlowSpec,
        timeouts: Timeouts,
        now: Instant,
    ) -> Result<Vec<FlowRemoved>, FlowModError> {
        if forward.flow_match == reverse.flow_match {
            return Err(FlowModError::OverlappingPair(forward.flow_match));
        }

        let mut state = self.write();

        let mut displaced: Vec<Cookie> = Vec::new();
        for flow_match in [&forward.flow_match, &reverse.flow_match] {
            if let Some(existing) = state.entries.get(flow_match) {
                if existing.cookie != cookie && !displaced.contains(&existing.cookie) {
                    displaced.push(existing.cookie);
                }
            }
        }

        let freed: HashSet<FlowMatch> = std::iter::once(cookie)
            .chain(displaced.iter().copied())
            .filter_map(|c| state.pairs.get(&c))
            .flat_map(|pair| pair.iter().copied())
            .collect();
        let resulting = state.entries.len() - freed.len() + 2;
        if resulting > self.capacity {
            return Err(FlowModError::TableFull {
                capacity: self.capacity,
            });
        }

        let removed = displaced
            .into_iter()
            .filter_map(|c| remove_pair(&mut state, c, RemovalReason::Replaced))
            .collect();
        remove_pair(&mut state, cookie, RemovalReason::Replaced);

        let last_active = Arc::new(AtomicU64::new(self.nanos(now)));
        let matches = [forward.flow_match, reverse.flow_match];
        for spec in [forward, reverse] {
            let entry = FlowEntry {
                actions: spec.actions,
                priority: spec.priority,
                cookie,
                timeouts,
                installed_at: now,
                hits: AtomicU64::new(0),
                last_active: last_active.clone(),
            };
            insert_entry(&mut state, spec.flow_match, entry);
        }
        state.pairs.insert(cookie, matches);

        Ok(removed)
    }

    /// Remove the entry for `flow_match` along with its pair partner.
    pub fn evict(&self, flow_match: &FlowMatch) -> Option<FlowRemoved> {
        let mut state = self.write();
        let cookie = state.entries.get(flow_match)?.cookie;
        remove_pair(&mut state, cookie, RemovalReason::Evicted)
    }

    /// Remove both entries tagged with `cookie`.
    pub fn evict_cookie(&self, cookie: Cookie) -> Option<FlowRemoved> {
        remove_pair(&mut self.write(), cookie, RemovalReason::Evicted)
    }

    /// Remove every pair whose idle or hard timeout has elapsed.
    pub fn sweep(&self, now: Instant) -> Vec<FlowRemoved> {
        let mut state = self.write();

        let expired: Vec<(Cookie, RemovalReason)> = state
            .pairs
            .iter()
            .filter_map(|(cookie, pair)| {
                pair.iter()
                    .filter_map(|m| state.entries.get(m))
                    .find_map(|entry| self.expiry(entry, now))
                    .map(|reason| (*cookie, reason))
            })
            .collect();

        expired
            .into_iter()
            .filter_map(|(cookie, reason)| remove_pair(&mut state, cookie, reason))
            .collect()
    }

    /// Snapshot of every installed entry.
    pub fn entries(&self, now: Instant) -> Vec<EntryStats> {
        let state = self.read();
        let now_nanos = self.nanos(now);
        state
            .entries
            .iter()
            .map(|(flow_match, entry)| EntryStats {
                flow_match: *flow_match,
                cookie: entry.cookie,
                priority: entry.priority,
                hits: entry.hits.load(Ordering::Relaxed),
                age: now.saturating_duration_since(entry.installed_at),
                idle: Duration::from_nanos(
                    now_nanos.saturating_sub(entry.last_active.load(Ordering::Relaxed)),
                ),
            })
            .collect()
    }

    fn expiry(&self, entry: &FlowEntry, now: Instant) -> Option<RemovalReason> {
        if let Some(hard) = entry.timeouts.hard {
            if now.saturating_duration_since(entry.installed_at) >= hard {
                return Some(RemovalReason::HardTimeout);
            }
        }
        if let Some(idle) = entry.timeouts.idle {
            let last = entry.last_active.load(Ordering::Relaxed);
            let idle_for = Duration::from_nanos(self.nanos(now).saturating_sub(last));
            if idle_for >= idle {
                return Some(RemovalReason::IdleTimeout);
            }
        }
        None
    }

    fn nanos(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_nanos() as u64
    }

    fn read(&self) -> RwLockReadGuard<'_, TableState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TableState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn insert_entry(state: &mut TableState, flow_match: FlowMatch, entry: FlowEntry) {
    if !flow_match.is_exact() {
        state.wildcards.retain(|(_, _, m)| *m != flow_match);
        state
            .wildcards
            .push((flow_match.specificity(), entry.priority, flow_match));
        state
            .wildcards
            .sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
    }
    state.entries.insert(flow_match, entry);
}

fn remove_pair(state: &mut TableState, cookie: Cookie, reason: RemovalReason) -> Option<FlowRemoved> {
    let pair = state.pairs.remove(&cookie)?;
    let mut hits = 0;
    for flow_match in pair {
        if let Some(entry) = state.entries.remove(&flow_match) {
            hits += entry.hits.load(Ordering::Relaxed);
        }
        if !flow_match.is_exact() {
            state.wildcards.retain(|(_, _, m)| *m != flow_match);
        }
    }
    Some(FlowRemoved {
        cookie,
        reason,
        hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Protocol;
    use crate::openflow::PortNo;
    use std::net::SocketAddr;

    const VIP: &str = "10.1.1.254:9";

    fn client_key(src: &str) -> FlowKey {
        FlowKey::new(src.parse().unwrap(), VIP.parse().unwrap(), Protocol::Udp)
    }

    fn backend_addr() -> SocketAddr {
        "10.1.2.1:9000".parse().unwrap()
    }

    fn spec(flow_match: FlowMatch, port: u16) -> FlowSpec {
        FlowSpec {
            flow_match,
            actions: Arc::from(vec![Action::Output(PortNo(port))]),
            priority: 100,
        }
    }

    fn pair_for(key: &FlowKey) -> (FlowSpec, FlowSpec) {
        let mut server_side = *key;
        server_side.dst = backend_addr();
        (
            spec(FlowMatch::exact(key), 2),
            spec(FlowMatch::exact(&server_side.reverse()), 1),
        )
    }

    fn idle(secs: u64) -> Timeouts {
        Timeouts::from_secs(secs, 0)
    }

    #[test]
    fn test_install_and_lookup_pair() {
        let table = FlowTable::new(16);
        let now = Instant::now();
        let key = client_key("10.1.1.1:4000");
        let (fwd, rev) = pair_for(&key);
        let rev_match = rev.flow_match;

        table.install_pair(Cookie(1), fwd, rev, idle(10), now).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.pair_count(), 1);

        match table.lookup(&key, now) {
            Lookup::Hit { cookie, actions } => {
                assert_eq!(cookie, Cookie(1));
                assert_eq!(&actions[..], &[Action::Output(PortNo(2))]);
            }
            other => panic!("expected hit, got {:?}", other),
        }
        let reply = rev_match.as_exact_key().unwrap();
        assert!(matches!(table.lookup(&reply, now), Lookup::Hit { .. }));
        assert_eq!(table.lookup(&client_key("10.1.1.2:4000"), now), Lookup::Miss);
    }

    #[test]
    fn test_reinstall_is_idempotent() {
        let table = FlowTable::new(16);
        let t0 = Instant::now();
        let key = client_key("10.1.1.1:4000");
        let (fwd, rev) = pair_for(&key);

        table.install_pair(Cookie(1), fwd.clone(), rev.clone(), idle(10), t0).unwrap();
        let mut updated = fwd.clone();
        updated.actions = Arc::from(vec![Action::Output(PortNo(3))]);
        let t1 = t0 + Duration::from_secs(8);
        let removed = table.install_pair(Cookie(1), updated, rev, idle(10), t1).unwrap();

        assert!(removed.is_empty());
        assert_eq!(table.len(), 2);
        // Timeout restarted at t1, so still alive at t0 + 15s.
        match table.lookup(&key, t0 + Duration::from_secs(15)) {
            Lookup::Hit { actions, .. } => assert_eq!(&actions[..], &[Action::Output(PortNo(3))]),
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_beats_wildcard() {
        let table = FlowTable::new(16);
        let now = Instant::now();
        let key = client_key("10.1.1.1:4000");
        let (_, rev) = pair_for(&key);

        let coarse = spec(FlowMatch::any_src_port(&key), 7);
        let mut coarse_rev = rev.clone();
        coarse_rev.flow_match = FlowMatch::any_dst_port(&rev.flow_match.as_exact_key().unwrap());
        table.install_pair(Cookie(1), coarse, coarse_rev, idle(10), now).unwrap();

        let (fwd, rev) = pair_for(&key);
        table.install_pair(Cookie(2), fwd, rev, idle(10), now).unwrap();

        match table.lookup(&key, now) {
            Lookup::Hit { cookie, .. } => assert_eq!(cookie, Cookie(2)),
            other => panic!("expected hit, got {:?}", other),
        }
        match table.lookup(&client_key("10.1.1.1:4001"), now) {
            Lookup::Hit { cookie, .. } => assert_eq!(cookie, Cookie(1)),
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_pair_expires_together() {
        let table = FlowTable::new(16);
        let t0 = Instant::now();
        let key = client_key("10.1.1.1:4000");
        let (fwd, rev) = pair_for(&key);
        let reply = rev.flow_match.as_exact_key().unwrap();
        table.install_pair(Cookie(1), fwd, rev, idle(10), t0).unwrap();

        // Only forward traffic; reverse entry stays alive through the shared clock.
        let t1 = t0 + Duration::from_secs(6);
        assert!(matches!(table.lookup(&key, t1), Lookup::Hit { .. }));
        let t2 = t0 + Duration::from_secs(12);
        assert!(matches!(table.lookup(&reply, t2), Lookup::Hit { .. }));
        assert!(table.sweep(t2).is_empty());

        let t3 = t2 + Duration::from_secs(10);
        assert_eq!(table.lookup(&key, t3), Lookup::Expired { cookie: Cookie(1) });
        assert_eq!(table.lookup(&reply, t3), Lookup::Expired { cookie: Cookie(1) });

        let removed = table.sweep(t3);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].cookie, Cookie(1));
        assert_eq!(removed[0].reason, RemovalReason::IdleTimeout);
        assert_eq!(removed[0].hits, 2);
        assert!(table.is_empty());
        assert_eq!(table.lookup(&key, t3), Lookup::Miss);
    }

    #[test]
    fn test_hard_timeout_ignores_activity() {
        let table = FlowTable::new(16);
        let t0 = Instant::now();
        let key = client_key("10.1.1.1:4000");
        let (fwd, rev) = pair_for(&key);
        table
            .install_pair(Cookie(1), fwd, rev, Timeouts::from_secs(10, 15), t0)
            .unwrap();

        for s in [5, 10, 14] {
            assert!(matches!(
                table.lookup(&key, t0 + Duration::from_secs(s)),
                Lookup::Hit { .. }
            ));
        }
        let removed = table.sweep(t0 + Duration::from_secs(15));
        assert_eq!(removed[0].reason, RemovalReason::HardTimeout);
        assert!(table.is_empty());
    }

    #[test]
    fn test_evict_takes_partner() {
        let table = FlowTable::new(16);
        let now = Instant::now();
        let key = client_key("10.1.1.1:4000");
        let (fwd, rev) = pair_for(&key);
        let rev_match = rev.flow_match;
        table.install_pair(Cookie(9), fwd, rev, idle(10), now).unwrap();

        let removed = table.evict(&rev_match).unwrap();
        assert_eq!(removed.cookie, Cookie(9));
        assert_eq!(removed.reason, RemovalReason::Evicted);
        assert!(table.is_empty());
        assert!(!table.contains_cookie(Cookie(9)));
        assert!(table.evict_cookie(Cookie(9)).is_none());
    }

    #[test]
    fn test_full_table_rejects_whole_pair() {
        let table = FlowTable::new(3);
        let now = Instant::now();
        let (fwd, rev) = pair_for(&client_key("10.1.1.1:4000"));
        table.install_pair(Cookie(1), fwd, rev, idle(10), now).unwrap();

        let (fwd, rev) = pair_for(&client_key("10.1.1.2:4000"));
        let err = table.install_pair(Cookie(2), fwd, rev, idle(10), now).unwrap_err();
        assert_eq!(err, FlowModError::TableFull { capacity: 3 });
        assert_eq!(table.len(), 2);
        assert!(!table.contains_cookie(Cookie(2)));
    }

    #[test]
    fn test_overlapping_pair_rejected() {
        let table = FlowTable::new(16);
        let key = client_key("10.1.1.1:4000");
        let fwd = spec(FlowMatch::exact(&key), 2);
        let err = table
            .install_pair(Cookie(1), fwd.clone(), fwd, idle(10), Instant::now())
            .unwrap_err();
        assert!(matches!(err, FlowModError::OverlappingPair(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_displaced_pair_removed_whole() {
        let table = FlowTable::new(16);
        let now = Instant::now();
        let key = client_key("10.1.1.1:4000");
        let (fwd, rev) = pair_for(&key);
        table.install_pair(Cookie(1), fwd.clone(), rev, idle(10), now).unwrap();

        let other_rev = spec(FlowMatch::exact(&client_key("10.1.2.9:9000").reverse()), 1);
        let removed = table.install_pair(Cookie(2), fwd, other_rev, idle(10), now).unwrap();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].cookie, Cookie(1));
        assert_eq!(removed[0].reason, RemovalReason::Replaced);
        assert!(!table.contains_cookie(Cookie(1)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_hit_counters() {
        let table = FlowTable::new(16);
        let now = Instant::now();
        let key = client_key("10.1.1.1:4000");
        let (fwd, rev) = pair_for(&key);
        table.install_pair(Cookie(1), fwd, rev, idle(10), now).unwrap();

        for _ in 0..3 {
            table.lookup(&key, now);
        }
        let stats = table.entries(now);
        let fwd_stats = stats
            .iter()
            .find(|s| s.flow_match == FlowMatch::exact(&key))
            .unwrap();
        assert_eq!(fwd_stats.hits, 3);
        assert_eq!(fwd_stats.cookie, Cookie(1));
    }
}
