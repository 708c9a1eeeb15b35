//! Switch data path.
//!
//! # Responsibilities
//! - Forward packets that hit the flow table without controller involvement
//! - Buffer missed packets and notify the controller
//! - Apply controller commands (flow mods, packet-outs, drops)
//! - Run periodic expiry sweeps and report removed pairs
//!
//! # Design Decisions
//! - All controller traffic goes through one FIFO channel per direction
//! - Every table removal and its FlowRemoved notice happen under the
//!   `removals` guard; a miss re-checks the table under the same guard, so
//!   the PacketIn for a flow is queued after the notice for its old pair
//! - An expired hit triggers an immediate sweep before the PacketIn
//! - The buffer pool lock is never held across an await

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::config::SwitchConfig;
use crate::flow::Packet;
use crate::observability::metrics;
use crate::openflow::{
    apply_actions, ControllerCommand, FlowMod, PacketIn, PacketOut, PortNo, SwitchEvent,
};
use crate::switch::buffer::BufferPool;
use crate::switch::table::{FlowTable, Lookup};

/// A packet leaving the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Egress {
    pub port: PortNo,
    pub packet: Packet,
}

/// Errors on the switch's channels.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("controller channel closed")]
    ControllerGone,

    #[error("egress channel closed")]
    EgressClosed,
}

/// Software switch fronting the virtual service.
pub struct Switch {
    table: Arc<FlowTable>,
    buffers: Mutex<BufferPool>,
    removals: tokio::sync::Mutex<()>,
    to_controller: mpsc::Sender<SwitchEvent>,
    egress: mpsc::Sender<Egress>,
}

impl Switch {
    pub fn new(
        table: Arc<FlowTable>,
        config: &SwitchConfig,
        to_controller: mpsc::Sender<SwitchEvent>,
        egress: mpsc::Sender<Egress>,
    ) -> Self {
        Self {
            table,
            buffers: Mutex::new(BufferPool::new(
                config.buffer_capacity,
                Duration::from_millis(config.buffer_timeout_ms),
            )),
            removals: tokio::sync::Mutex::new(()),
            to_controller,
            egress,
        }
    }

    pub fn table(&self) -> &Arc<FlowTable> {
        &self.table
    }

    /// Number of packets currently held for the controller.
    pub fn buffered(&self) -> usize {
        self.buffers().len()
    }

    /// Ingest a packet arriving on `in_port`.
    pub async fn receive(&self, in_port: PortNo, packet: Packet) -> Result<(), SwitchError> {
        let now = Instant::now();
        if let Lookup::Hit { actions, .. } = self.table.lookup(&packet.key, now) {
            return self.emit(apply_actions(&actions, packet)).await;
        }

        // A removal may be between the table and its notice; wait it out.
        let removals = self.removals.lock().await;
        match self.table.lookup(&packet.key, now) {
            Lookup::Hit { actions, .. } => {
                drop(removals);
                self.emit(apply_actions(&actions, packet)).await
            }
            Lookup::Expired { cookie } => {
                tracing::trace!(%cookie, flow = %packet.key, "Matched expired entry, sweeping");
                self.remove_expired(now).await?;
                drop(removals);
                self.packet_in(in_port, packet, now).await
            }
            Lookup::Miss => {
                drop(removals);
                self.packet_in(in_port, packet, now).await
            }
        }
    }

    /// Apply one controller command.
    pub async fn apply(&self, command: ControllerCommand) -> Result<(), SwitchError> {
        match command {
            ControllerCommand::FlowMod(FlowMod::InstallPair {
                cookie,
                forward,
                reverse,
                timeouts,
            }) => {
                let _removals = self.removals.lock().await;
                let result = self
                    .table
                    .install_pair(cookie, forward, reverse, timeouts, Instant::now());
                metrics::record_flow_table_size(self.table.len());
                match result {
                    Ok(displaced) => {
                        for removed in displaced {
                            self.notify(SwitchEvent::FlowRemoved(removed)).await?;
                        }
                        self.notify(SwitchEvent::FlowInstalled { cookie }).await
                    }
                    Err(error) => {
                        tracing::warn!(%cookie, %error, "Rejected flow pair install");
                        self.notify(SwitchEvent::FlowModFailed { cookie, error }).await
                    }
                }
            }
            ControllerCommand::FlowMod(FlowMod::DeleteCookie { cookie }) => {
                let _removals = self.removals.lock().await;
                let removed = self.table.evict_cookie(cookie);
                metrics::record_flow_table_size(self.table.len());
                match removed {
                    Some(removed) => self.notify(SwitchEvent::FlowRemoved(removed)).await,
                    None => Ok(()),
                }
            }
            ControllerCommand::PacketOut(packet_out) => self.packet_out(packet_out).await,
            ControllerCommand::Drop { buffer_id } => {
                if let Some(id) = buffer_id {
                    self.buffers().take(id);
                }
                Ok(())
            }
        }
    }

    /// Expire timed-out pairs and stale buffers now.
    pub async fn sweep(&self) -> Result<(), SwitchError> {
        self.sweep_at(Instant::now()).await
    }

    /// Drive the switch: apply commands and sweep on `sweep_interval` until
    /// shutdown or the controller goes away.
    pub async fn run(
        self: Arc<Self>,
        mut commands: mpsc::Receiver<ControllerCommand>,
        sweep_interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let result = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(command).await,
                    None => {
                        tracing::info!("Controller command channel closed, switch stopping");
                        break;
                    }
                },
                _ = ticker.tick() => self.sweep().await,
                _ = shutdown.recv() => {
                    tracing::info!("Switch received shutdown signal, exiting loop");
                    break;
                }
            };

            if let Err(e) = result {
                tracing::warn!(error = %e, "Switch loop stopping");
                break;
            }
        }
    }

    async fn packet_in(&self, in_port: PortNo, packet: Packet, now: Instant) -> Result<(), SwitchError> {
        let buffer_id = self.buffers().store(in_port, packet.clone(), now);
        if buffer_id.is_none() {
            tracing::debug!(flow = %packet.key, "Buffer pool full, sending unbuffered packet-in");
        }
        self.notify(SwitchEvent::PacketIn(PacketIn {
            in_port,
            buffer_id,
            packet,
        }))
        .await
    }

    async fn packet_out(&self, packet_out: PacketOut) -> Result<(), SwitchError> {
        let PacketOut {
            buffer_id,
            packet,
            actions,
            requires,
            ..
        } = packet_out;

        let packet = buffer_id
            .and_then(|id| self.buffers().take(id))
            .map(|(_, buffered)| buffered)
            .unwrap_or(packet);

        if let Some(cookie) = requires {
            if !self.table.contains_cookie(cookie) {
                tracing::debug!(%cookie, flow = %packet.key, "Pair not installed, dropping packet-out");
                return Ok(());
            }
        }

        self.emit(apply_actions(&actions, packet)).await
    }

    async fn sweep_at(&self, now: Instant) -> Result<(), SwitchError> {
        let _removals = self.removals.lock().await;
        self.remove_expired(now).await
    }

    /// Caller holds `removals`.
    async fn remove_expired(&self, now: Instant) -> Result<(), SwitchError> {
        let removed = self.table.sweep(now);
        let stale_buffers = self.buffers().expire(now);
        if stale_buffers > 0 {
            tracing::debug!(count = stale_buffers, "Discarded unanswered buffered packets");
        }
        if removed.is_empty() {
            return Ok(());
        }

        metrics::record_flow_table_size(self.table.len());
        for flow in removed {
            tracing::debug!(cookie = %flow.cookie, reason = flow.reason.as_str(), hits = flow.hits, "Flow pair removed");
            self.notify(SwitchEvent::FlowRemoved(flow)).await?;
        }
        Ok(())
    }

    async fn emit(&self, outputs: Vec<(PortNo, Packet)>) -> Result<(), SwitchError> {
        for (port, packet) in outputs {
            self.egress
                .send(Egress { port, packet })
                .await
                .map_err(|_| SwitchError::EgressClosed)?;
        }
        Ok(())
    }

    async fn notify(&self, event: SwitchEvent) -> Result<(), SwitchError> {
        self.to_controller
            .send(event)
            .await
            .map_err(|_| SwitchError::ControllerGone)
    }

    fn buffers(&self) -> MutexGuard<'_, BufferPool> {
        self.buffers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowKey, Protocol};
    use crate::openflow::{Action, Cookie, FlowMatch, FlowSpec, RemovalReason, Timeouts};

    struct Harness {
        switch: Arc<Switch>,
        events: mpsc::Receiver<SwitchEvent>,
        egress: mpsc::Receiver<Egress>,
    }

    fn harness(capacity: usize) -> Harness {
        let (event_tx, events) = mpsc::channel(16);
        let (egress_tx, egress) = mpsc::channel(16);
        let switch = Arc::new(Switch::new(
            Arc::new(FlowTable::new(capacity)),
            &SwitchConfig::default(),
            event_tx,
            egress_tx,
        ));
        Harness {
            switch,
            events,
            egress,
        }
    }

    fn client_key() -> FlowKey {
        FlowKey::new(
            "10.0.0.1:5000".parse().unwrap(),
            "10.1.1.254:9".parse().unwrap(),
            Protocol::Udp,
        )
    }

    fn install(cookie: u64, timeouts: Timeouts) -> ControllerCommand {
        let key = client_key();
        let server = "10.1.2.1:9".parse().unwrap();
        let [ip, port] = Action::set_dst(server);
        ControllerCommand::FlowMod(FlowMod::InstallPair {
            cookie: Cookie(cookie),
            forward: FlowSpec {
                flow_match: FlowMatch::exact(&key),
                actions: Arc::from([ip, port, Action::Output(PortNo(1))]),
                priority: 100,
            },
            reverse: FlowSpec {
                flow_match: FlowMatch::exact(&FlowKey::new(server, key.src, Protocol::Udp)),
                actions: Arc::from([Action::Output(PortNo(10))]),
                priority: 100,
            },
            timeouts,
        })
    }

    #[tokio::test]
    async fn test_miss_buffers_and_notifies() {
        let mut h = harness(16);
        h.switch
            .receive(PortNo(10), Packet::new(client_key(), &b"hi"[..]))
            .await
            .unwrap();

        match h.events.recv().await.unwrap() {
            SwitchEvent::PacketIn(packet_in) => {
                assert_eq!(packet_in.in_port, PortNo(10));
                assert!(packet_in.buffer_id.is_some());
                assert_eq!(packet_in.packet.key, client_key());
            }
            other => panic!("expected packet-in, got {:?}", other),
        }
        assert_eq!(h.switch.buffered(), 1);
    }

    #[tokio::test]
    async fn test_hit_forwards_with_rewrite() {
        let mut h = harness(16);
        h.switch.apply(install(7, Timeouts::default())).await.unwrap();
        assert_eq!(
            h.events.recv().await.unwrap(),
            SwitchEvent::FlowInstalled { cookie: Cookie(7) }
        );

        h.switch
            .receive(PortNo(10), Packet::new(client_key(), &b"hi"[..]))
            .await
            .unwrap();
        let out = h.egress.recv().await.unwrap();
        assert_eq!(out.port, PortNo(1));
        assert_eq!(out.packet.key.dst, "10.1.2.1:9".parse().unwrap());
        assert_eq!(out.packet.key.src, client_key().src);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_packet_out_releases_buffer() {
        let mut h = harness(16);
        h.switch
            .receive(PortNo(10), Packet::new(client_key(), &b"hi"[..]))
            .await
            .unwrap();
        let SwitchEvent::PacketIn(packet_in) = h.events.recv().await.unwrap() else {
            panic!("expected packet-in");
        };

        h.switch.apply(install(1, Timeouts::default())).await.unwrap();
        h.switch
            .apply(ControllerCommand::PacketOut(PacketOut {
                buffer_id: packet_in.buffer_id,
                in_port: packet_in.in_port,
                packet: packet_in.packet,
                actions: Arc::from([Action::Output(PortNo(1))]),
                requires: Some(Cookie(1)),
            }))
            .await
            .unwrap();

        assert_eq!(h.egress.recv().await.unwrap().port, PortNo(1));
        assert_eq!(h.switch.buffered(), 0);
    }

    #[tokio::test]
    async fn test_packet_out_dropped_without_pair() {
        let mut h = harness(16);
        h.switch
            .apply(ControllerCommand::PacketOut(PacketOut {
                buffer_id: None,
                in_port: PortNo(10),
                packet: Packet::new(client_key(), &b"hi"[..]),
                actions: Arc::from([Action::Output(PortNo(1))]),
                requires: Some(Cookie(3)),
            }))
            .await
            .unwrap();
        assert!(h.egress.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_install_reports_failure() {
        let mut h = harness(1);
        h.switch.apply(install(2, Timeouts::default())).await.unwrap();
        match h.events.recv().await.unwrap() {
            SwitchEvent::FlowModFailed { cookie, error } => {
                assert_eq!(cookie, Cookie(2));
                assert_eq!(error, crate::openflow::FlowModError::TableFull { capacity: 1 });
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(h.switch.table().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cookie_reports_removal() {
        let mut h = harness(16);
        h.switch.apply(install(5, Timeouts::default())).await.unwrap();
        let _ = h.events.recv().await;

        h.switch
            .apply(ControllerCommand::FlowMod(FlowMod::DeleteCookie { cookie: Cookie(5) }))
            .await
            .unwrap();
        match h.events.recv().await.unwrap() {
            SwitchEvent::FlowRemoved(removed) => {
                assert_eq!(removed.cookie, Cookie(5));
                assert_eq!(removed.reason, RemovalReason::Evicted);
            }
            other => panic!("expected removal, got {:?}", other),
        }
        assert!(h.switch.table().is_empty());
    }

    #[tokio::test]
    async fn test_drop_discards_buffer() {
        let mut h = harness(16);
        h.switch
            .receive(PortNo(10), Packet::new(client_key(), &b"hi"[..]))
            .await
            .unwrap();
        let SwitchEvent::PacketIn(packet_in) = h.events.recv().await.unwrap() else {
            panic!("expected packet-in");
        };
        h.switch
            .apply(ControllerCommand::Drop {
                buffer_id: packet_in.buffer_id,
            })
            .await
            .unwrap();
        assert_eq!(h.switch.buffered(), 0);
        assert!(h.egress.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_removal_notice_precedes_miss() {
        let mut h = harness(16);
        let timeouts = Timeouts {
            idle: Some(Duration::from_millis(1)),
            hard: None,
        };
        h.switch.apply(install(4, timeouts)).await.unwrap();
        let _ = h.events.recv().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Hold the guard between the table removal and its notice.
        let removals = h.switch.removals.lock().await;
        let removed = h.switch.table().sweep(Instant::now());
        assert_eq!(removed.len(), 1);

        let switch = h.switch.clone();
        let miss = tokio::spawn(async move {
            switch
                .receive(PortNo(10), Packet::new(client_key(), &b"hi"[..]))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.events.try_recv().is_err());

        for flow in removed {
            h.switch.notify(SwitchEvent::FlowRemoved(flow)).await.unwrap();
        }
        drop(removals);
        miss.await.unwrap().unwrap();

        assert!(matches!(
            h.events.recv().await.unwrap(),
            SwitchEvent::FlowRemoved(removed) if removed.cookie == Cookie(4)
        ));
        assert!(matches!(h.events.recv().await.unwrap(), SwitchEvent::PacketIn(_)));
    }

    #[tokio::test]
    async fn test_expired_hit_reports_removal_first() {
        let mut h = harness(16);
        let timeouts = Timeouts {
            idle: Some(Duration::from_millis(1)),
            hard: None,
        };
        h.switch.apply(install(6, timeouts)).await.unwrap();
        let _ = h.events.recv().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.switch
            .receive(PortNo(10), Packet::new(client_key(), &b"hi"[..]))
            .await
            .unwrap();
        assert!(matches!(
            h.events.recv().await.unwrap(),
            SwitchEvent::FlowRemoved(removed) if removed.cookie == Cookie(6)
        ));
        assert!(matches!(h.events.recv().await.unwrap(), SwitchEvent::PacketIn(_)));
        assert!(h.switch.table().is_empty());
    }
}
