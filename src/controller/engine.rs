//! Flow assignment engine.
//!
//! # Responsibilities
//! - Turn table misses into backend bindings and paired flow entries
//! - Collapse repeated misses for a flow onto its existing binding
//! - Track the Pending → Established → released lifecycle from switch events
//! - Apply backend membership and liveness changes
//!
//! # Design Decisions
//! - `bindings` is keyed by the forward match; the DashMap entry lock is
//!   the per-flow exclusive section, so concurrent misses for one flow
//!   select exactly once
//! - Handlers return the commands to send instead of sending them, which
//!   keeps the engine synchronous and directly testable
//! - A binding is only released by the switch's removal notice or a
//!   rollback, except under `on_backend_down = "evict"`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::{
    BackendConfig, BackendDownAction, BalancerConfig, MatchGranularity, ProtocolFilter,
};
use crate::controller::binding::{Binding, FlowState};
use crate::controller::error::ControlError;
use crate::controller::events::ControlEvent;
use crate::flow::FlowKey;
use crate::load_balancer::{Backend, BackendPool, Policy, PolicyKind};
use crate::observability::metrics;
use crate::openflow::{
    Action, ControllerCommand, Cookie, FlowMatch, FlowMod, FlowModError, FlowRemoved, FlowSpec,
    PacketIn, PacketOut, PortNo, SwitchEvent, Timeouts,
};

const EVENT_CAPACITY: usize = 1024;

/// Construction parameters for a [`Controller`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub virtual_addr: SocketAddr,
    pub protocol: ProtocolFilter,
    pub policy: PolicyKind,
    pub granularity: MatchGranularity,
    pub on_backend_down: BackendDownAction,
    pub timeouts: Timeouts,
    pub priority: u16,
}

impl From<&BalancerConfig> for ControllerConfig {
    fn from(config: &BalancerConfig) -> Self {
        Self {
            virtual_addr: config.service.address,
            protocol: config.service.protocol,
            policy: config.balancing.policy,
            granularity: config.balancing.granularity,
            on_backend_down: config.balancing.on_backend_down,
            timeouts: config.flow_table.timeouts(),
            priority: config.flow_table.priority,
        }
    }
}

/// Backend row in [`FlowStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStats {
    pub name: String,
    pub addr: SocketAddr,
    pub alive: bool,
    pub active_flows: usize,
}

/// Snapshot of controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStats {
    pub pending: usize,
    pub established: usize,
    pub backends: Vec<BackendStats>,
}

impl FlowStats {
    pub fn bindings(&self) -> usize {
        self.pending + self.established
    }
}

/// The load balancer's control logic for one virtual service.
pub struct Controller {
    config: ControllerConfig,
    pool: BackendPool,
    policy: Policy,
    bindings: DashMap<FlowMatch, Binding>,
    cookies: DashMap<Cookie, FlowMatch>,
    next_cookie: AtomicU64,
    events: broadcast::Sender<ControlEvent>,
}

impl Controller {
    pub fn new(config: ControllerConfig, pool: BackendPool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        tracing::info!(
            service = %config.virtual_addr,
            policy = %config.policy,
            backends = pool.len(),
            "Controller created"
        );
        Self {
            policy: Policy::new(config.policy),
            config,
            pool,
            bindings: DashMap::new(),
            cookies: DashMap::new(),
            next_cookie: AtomicU64::new(1),
            events,
        }
    }

    pub fn from_config(config: &BalancerConfig) -> Self {
        Self::new(ControllerConfig::from(config), BackendPool::from_config(&config.backends))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Subscribe to control events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.events.subscribe()
    }

    /// Dispatch one switch event.
    pub fn handle_event(&self, event: SwitchEvent) -> Vec<ControllerCommand> {
        match event {
            SwitchEvent::PacketIn(packet_in) => self.handle_packet_in(packet_in),
            SwitchEvent::FlowInstalled { cookie } => self.handle_flow_installed(cookie),
            SwitchEvent::FlowModFailed { cookie, error } => {
                self.handle_flow_mod_failed(cookie, error);
                Vec::new()
            }
            SwitchEvent::FlowRemoved(removed) => {
                self.handle_flow_removed(removed);
                Vec::new()
            }
        }
    }

    /// React to a table miss.
    pub fn handle_packet_in(&self, packet_in: PacketIn) -> Vec<ControllerCommand> {
        metrics::record_packet_in();
        let key = packet_in.packet.key;

        if let Err(error) = self.admit(&key) {
            return self.drop_packet(&packet_in, error);
        }

        let forward_match = self.forward_match(&key);
        match self.bindings.entry(forward_match) {
            Entry::Occupied(entry) => {
                let binding = entry.get();
                tracing::debug!(
                    flow = %key,
                    cookie = %binding.cookie,
                    state = %binding.state,
                    backend = %binding.backend().name,
                    "Miss for bound flow, reusing binding"
                );
                metrics::record_duplicate_miss();
                self.publish(ControlEvent::DuplicateMiss {
                    flow: key,
                    cookie: binding.cookie,
                });
                vec![packet_out(
                    packet_in,
                    binding.forward_actions.clone(),
                    binding.cookie,
                )]
            }
            Entry::Vacant(entry) => {
                let backend = match self.policy.select(&key, &self.pool.snapshot()) {
                    Ok(backend) => backend,
                    Err(error) => {
                        drop(entry);
                        return self.drop_packet(&packet_in, error.into());
                    }
                };

                let cookie = Cookie(self.next_cookie.fetch_add(1, Ordering::Relaxed));
                let (forward, reverse) = self.entry_pair(&key, &backend, packet_in.in_port);
                let forward_actions = forward.actions.clone();

                entry.insert(Binding::pending(
                    cookie,
                    key,
                    backend.lease(),
                    forward_actions.clone(),
                ));
                self.cookies.insert(cookie, forward_match);

                tracing::info!(flow = %key, backend = %backend, %cookie, "Flow assigned");
                metrics::record_flow_assigned(&backend.name);
                self.publish(ControlEvent::Assigned {
                    flow: key,
                    backend: backend.name.clone(),
                    cookie,
                });

                vec![
                    ControllerCommand::FlowMod(FlowMod::InstallPair {
                        cookie,
                        forward,
                        reverse,
                        timeouts: self.config.timeouts,
                    }),
                    packet_out(packet_in, forward_actions, cookie),
                ]
            }
        }
    }

    /// The switch installed the pair for `cookie`.
    ///
    /// A confirmation for a binding that was already released means a
    /// deletion reached the switch ahead of the install it targeted; the
    /// returned `DeleteCookie` removes the stray pair.
    pub fn handle_flow_installed(&self, cookie: Cookie) -> Vec<ControllerCommand> {
        let Some(forward_match) = self.cookies.get(&cookie).map(|m| *m) else {
            tracing::debug!(%cookie, "Install confirmed for released binding, deleting pair");
            return vec![ControllerCommand::FlowMod(FlowMod::DeleteCookie { cookie })];
        };
        if let Some(mut binding) = self.bindings.get_mut(&forward_match) {
            if binding.cookie == cookie && binding.state == FlowState::Pending {
                binding.state = FlowState::Established;
                tracing::trace!(%cookie, flow = %binding.flow, "Flow established");
                drop(binding);
                self.publish(ControlEvent::Established { cookie });
            }
        }
        Vec::new()
    }

    /// The switch refused the pair for `cookie`; roll the binding back.
    pub fn handle_flow_mod_failed(&self, cookie: Cookie, error: FlowModError) {
        let Some(binding) = self.release(cookie) else {
            return;
        };
        let error = ControlError::PartialInstallFailure {
            cookie,
            source: error,
        };
        tracing::warn!(flow = %binding.flow, backend = %binding.backend().name, %error, "Rolled back flow binding");
        metrics::record_packet_dropped(error.reason());
        self.publish(ControlEvent::RolledBack {
            flow: binding.flow,
            error,
        });
    }

    /// An entry pair left the switch.
    pub fn handle_flow_removed(&self, removed: FlowRemoved) {
        metrics::record_flow_removed(removed.reason);
        let Some(binding) = self.release(removed.cookie) else {
            tracing::trace!(cookie = %removed.cookie, "Removal for released binding");
            return;
        };
        tracing::debug!(
            flow = %binding.flow,
            cookie = %removed.cookie,
            reason = removed.reason.as_str(),
            hits = removed.hits,
            "Flow binding released"
        );
        self.publish(ControlEvent::Removed {
            flow: binding.flow,
            cookie: removed.cookie,
            reason: removed.reason,
        });
    }

    /// Controller view of the flow `key` belongs to.
    pub fn state_of(&self, key: &FlowKey) -> FlowState {
        self.bindings
            .get(&self.forward_match(key))
            .map(|binding| binding.state)
            .unwrap_or(FlowState::Unseen)
    }

    /// Backend currently bound to the flow `key` belongs to.
    pub fn backend_for(&self, key: &FlowKey) -> Option<Arc<Backend>> {
        self.bindings
            .get(&self.forward_match(key))
            .map(|binding| binding.backend().clone())
    }

    pub fn flow_stats(&self) -> FlowStats {
        let (mut pending, mut established) = (0, 0);
        for binding in self.bindings.iter() {
            match binding.state {
                FlowState::Established => established += 1,
                _ => pending += 1,
            }
        }
        let backends = self
            .pool
            .snapshot()
            .iter()
            .map(|b| BackendStats {
                name: b.name.clone(),
                addr: b.addr,
                alive: b.is_alive(),
                active_flows: b.active_flows(),
            })
            .collect();
        FlowStats {
            pending,
            established,
            backends,
        }
    }

    /// Mark a backend alive or dead.
    ///
    /// Returns the deletions to send when a dead backend's flows are
    /// evicted.
    pub fn set_backend_alive(&self, name: &str, alive: bool) -> Result<Vec<ControllerCommand>, ControlError> {
        let backend = self
            .pool
            .get(name)
            .ok_or_else(|| ControlError::UnknownBackend(name.to_string()))?;
        if !backend.set_alive(alive) {
            return Ok(Vec::new());
        }

        tracing::info!(backend = %backend, alive, "Backend liveness changed");
        self.publish(ControlEvent::BackendAlive {
            backend: name.to_string(),
            alive,
        });
        Ok(if alive { Vec::new() } else { self.backend_down(&backend) })
    }

    /// Add a backend to the pool.
    pub fn add_backend(&self, config: &BackendConfig) -> Result<(), ControlError> {
        if config.address == self.config.virtual_addr {
            return Err(ControlError::BackendIsVirtualEndpoint(config.name.clone()));
        }
        let backend = Arc::new(Backend::from_config(config));
        if !self.pool.add(backend.clone()) {
            return Err(ControlError::DuplicateBackend(config.name.clone()));
        }
        metrics::record_backend_alive(&backend.name, backend.is_alive());
        self.publish(ControlEvent::BackendAdded {
            backend: config.name.clone(),
        });
        Ok(())
    }

    /// Remove a backend from the pool. Existing bindings keep it until they
    /// expire unless the down action is `Evict`.
    pub fn remove_backend(&self, name: &str) -> Result<Vec<ControllerCommand>, ControlError> {
        let backend = self
            .pool
            .remove(name)
            .ok_or_else(|| ControlError::UnknownBackend(name.to_string()))?;
        tracing::debug!(backend = %backend, active_flows = backend.active_flows(), "Backend left with bound flows");
        self.publish(ControlEvent::BackendRemoved {
            backend: name.to_string(),
        });
        Ok(self.backend_down(&backend))
    }

    /// Bring the pool in line with a reloaded backend list.
    pub fn reconcile(&self, configs: &[BackendConfig]) -> Vec<ControllerCommand> {
        let mut commands = Vec::new();

        for existing in self.pool.snapshot().iter() {
            if !configs.iter().any(|c| c.name == existing.name) {
                if let Ok(mut deletes) = self.remove_backend(&existing.name) {
                    commands.append(&mut deletes);
                }
            }
        }

        for config in configs {
            match self.pool.get(&config.name) {
                Some(current) if current.addr != config.address || current.port.0 != config.switch_port => {
                    tracing::warn!(backend = %current, "Backend address changed on reload, ignoring");
                }
                Some(_) => match self.set_backend_alive(&config.name, config.alive) {
                    Ok(mut deletes) => commands.append(&mut deletes),
                    Err(e) => tracing::warn!(error = %e, "Failed to apply backend liveness"),
                },
                None => {
                    if let Err(e) = self.add_backend(config) {
                        tracing::warn!(error = %e, "Failed to add backend from reload");
                    }
                }
            }
        }

        commands
    }

    fn admit(&self, key: &FlowKey) -> Result<(), ControlError> {
        if key.dst == self.config.virtual_addr && self.config.protocol.admits(key.protocol) {
            return Ok(());
        }
        if self.pool.snapshot().iter().any(|b| b.addr == key.src) {
            return Err(ControlError::OrphanReturnTraffic);
        }
        Err(ControlError::NotForService)
    }

    fn drop_packet(&self, packet_in: &PacketIn, error: ControlError) -> Vec<ControllerCommand> {
        let flow = packet_in.packet.key;
        match error {
            ControlError::NoBackendsAvailable => {
                tracing::warn!(%flow, "No live backends, dropping packet")
            }
            _ => tracing::debug!(%flow, %error, "Dropping packet"),
        }
        metrics::record_packet_dropped(error.reason());
        self.publish(ControlEvent::Dropped { flow, error });
        vec![ControllerCommand::Drop {
            buffer_id: packet_in.buffer_id,
        }]
    }

    fn forward_match(&self, key: &FlowKey) -> FlowMatch {
        match self.config.granularity {
            MatchGranularity::Connection => FlowMatch::exact(key),
            MatchGranularity::Client => FlowMatch::any_src_port(key),
        }
    }

    /// Forward: client → VIP rewritten to the backend. Reverse: backend →
    /// client rewritten to appear from the VIP.
    fn entry_pair(&self, key: &FlowKey, backend: &Backend, client_port: PortNo) -> (FlowSpec, FlowSpec) {
        let [set_ip_dst, set_tp_dst] = Action::set_dst(backend.addr);
        let forward = FlowSpec {
            flow_match: self.forward_match(key),
            actions: Arc::from([set_ip_dst, set_tp_dst, Action::Output(backend.port)]),
            priority: self.config.priority,
        };

        let return_key = FlowKey::new(backend.addr, key.src, key.protocol);
        let [set_ip_src, set_tp_src] = Action::set_src(self.config.virtual_addr);
        let reverse = FlowSpec {
            flow_match: match self.config.granularity {
                MatchGranularity::Connection => FlowMatch::exact(&return_key),
                MatchGranularity::Client => FlowMatch::any_dst_port(&return_key),
            },
            actions: Arc::from([set_ip_src, set_tp_src, Action::Output(client_port)]),
            priority: self.config.priority,
        };

        (forward, reverse)
    }

    fn release(&self, cookie: Cookie) -> Option<Binding> {
        let (_, forward_match) = self.cookies.remove(&cookie)?;
        self.bindings
            .remove_if(&forward_match, |_, binding| binding.cookie == cookie)
            .map(|(_, binding)| binding)
    }

    fn backend_down(&self, backend: &Arc<Backend>) -> Vec<ControllerCommand> {
        if self.config.on_backend_down == BackendDownAction::Expire {
            return Vec::new();
        }

        let cookies: Vec<Cookie> = self
            .bindings
            .iter()
            .filter(|binding| binding.is_bound_to(backend))
            .map(|binding| binding.cookie)
            .collect();

        let mut commands = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            if self.release(cookie).is_some() {
                commands.push(ControllerCommand::FlowMod(FlowMod::DeleteCookie { cookie }));
            }
        }

        if !commands.is_empty() {
            tracing::info!(backend = %backend, flows = commands.len(), "Evicting flows of unavailable backend");
            self.publish(ControlEvent::Evicted {
                backend: backend.name.clone(),
                flows: commands.len(),
            });
        }
        commands
    }

    fn publish(&self, event: ControlEvent) {
        let _ = self.events.send(event);
    }
}

fn packet_out(packet_in: PacketIn, actions: Arc<[Action]>, cookie: Cookie) -> ControllerCommand {
    ControllerCommand::PacketOut(PacketOut {
        buffer_id: packet_in.buffer_id,
        in_port: packet_in.in_port,
        packet: packet_in.packet,
        actions,
        requires: Some(cookie),
    })
}
