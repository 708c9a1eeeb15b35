//! Concurrent miss handling through the running tasks.

use std::collections::HashSet;
use std::sync::Arc;

use sdn_balancer::lifecycle::Deployment;
use sdn_balancer::load_balancer::PolicyKind;
use sdn_balancer::openflow::PortNo;

mod common;
use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_misses_bind_one_backend() {
    let mut deployment = Deployment::start(&config(PolicyKind::Random, 5));
    let mut egress = deployment.take_egress().unwrap();
    let c = client(9, 9999);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let switch = Arc::clone(&deployment.switch);
        tasks.push(tokio::spawn(async move {
            switch.receive(PortNo(CLIENT_PORT), to_service(c, b"x")).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut ports = HashSet::new();
    for _ in 0..16 {
        ports.insert(next_egress(&mut egress).await.port);
    }
    assert_eq!(ports.len(), 1, "all packets of one flow reach one backend");
    assert_eq!(deployment.controller.flow_stats().bindings(), 1);
    assert_eq!(deployment.switch.table().len(), 2);

    let active: usize = deployment
        .controller
        .flow_stats()
        .backends
        .iter()
        .map(|b| b.active_flows)
        .sum();
    assert_eq!(active, 1);
    deployment.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_round_robin_even_under_parallel_clients() {
    let mut deployment = Deployment::start(&config(PolicyKind::RoundRobin, 3));
    let mut egress = deployment.take_egress().unwrap();

    let mut tasks = Vec::new();
    for host in 1..=30u8 {
        let switch = Arc::clone(&deployment.switch);
        tasks.push(tokio::spawn(async move {
            switch
                .receive(PortNo(CLIENT_PORT), to_service(client(host, 1000), b"x"))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut counts = [0usize; 4];
    for _ in 0..30 {
        counts[next_egress(&mut egress).await.port.0 as usize] += 1;
    }
    assert_eq!(&counts[1..], &[10, 10, 10]);
    deployment.stop().await;
}
