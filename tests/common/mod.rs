//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;

use sdn_balancer::config::{BackendConfig, BalancerConfig};
use sdn_balancer::flow::{FlowKey, Packet, Protocol};
use sdn_balancer::load_balancer::PolicyKind;
use sdn_balancer::switch::Egress;

pub const CLIENT_PORT: u16 = 100;

pub fn vip() -> SocketAddr {
    "10.1.1.254:9".parse().unwrap()
}

/// Backend `i` lives at 10.1.2.i:9 behind switch port `i`.
pub fn backend_addr(i: u16) -> SocketAddr {
    format!("10.1.2.{}:9", i).parse().unwrap()
}

pub fn config(policy: PolicyKind, backends: u16) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.balancing.policy = policy;
    config.backends = (1..=backends)
        .map(|i| BackendConfig {
            name: format!("s{}", i),
            address: backend_addr(i),
            switch_port: i,
            alive: true,
        })
        .collect();
    config
}

pub fn client(host: u8, port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, host], port))
}

/// A UDP datagram from `client` to the virtual service.
pub fn to_service(client: SocketAddr, payload: &'static [u8]) -> Packet {
    Packet::new(FlowKey::new(client, vip(), Protocol::Udp), payload)
}

/// Next packet out of the switch, failing the test after a second.
pub async fn next_egress(rx: &mut mpsc::Receiver<Egress>) -> Egress {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for egress")
        .expect("egress channel closed")
}

/// Assert nothing leaves the switch for a short while.
pub async fn assert_no_egress(rx: &mut mpsc::Receiver<Egress>) {
    let quiet = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(quiet.is_err(), "unexpected egress: {:?}", quiet);
}
