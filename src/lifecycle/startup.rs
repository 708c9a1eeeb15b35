//! Startup orchestration.
//!
//! Builds the flow table, switch and controller from a validated config,
//! connects them with bounded channels and spawns their tasks. Must be
//! called from within a Tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::BalancerConfig;
use crate::controller::{runtime, Controller, ControllerHandle};
use crate::lifecycle::shutdown::Shutdown;
use crate::switch::{Egress, FlowTable, Switch};

/// A running switch/controller pair.
pub struct Deployment {
    pub controller: ControllerHandle,
    pub switch: Arc<Switch>,
    egress: Option<mpsc::Receiver<Egress>>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Deployment {
    pub fn start(config: &BalancerConfig) -> Self {
        let depth = config.switch.channel_capacity;
        let (event_tx, event_rx) = mpsc::channel(depth);
        let (command_tx, command_rx) = mpsc::channel(depth);
        let (egress_tx, egress_rx) = mpsc::channel(depth);

        let table = Arc::new(FlowTable::new(config.flow_table.capacity));
        let switch = Arc::new(Switch::new(table, &config.switch, event_tx, egress_tx));
        let controller = Arc::new(Controller::from_config(config));
        let shutdown = Shutdown::new();

        let switch_task = tokio::spawn(switch.clone().run(
            command_rx,
            Duration::from_millis(config.flow_table.sweep_interval_ms),
            shutdown.subscribe(),
        ));
        let controller_task = tokio::spawn(runtime::run(
            controller.clone(),
            event_rx,
            command_tx.clone(),
            shutdown.subscribe(),
        ));

        tracing::info!(
            service = %config.service.address,
            policy = %config.balancing.policy,
            backends = config.backends.len(),
            table_capacity = config.flow_table.capacity,
            "Balancer started"
        );

        Self {
            controller: ControllerHandle::new(controller, command_tx),
            switch,
            egress: Some(egress_rx),
            shutdown,
            tasks: vec![switch_task, controller_task],
        }
    }

    /// Packets leaving the switch. The receiver must be drained or the
    /// switch stalls once the channel fills.
    pub fn take_egress(&mut self) -> Option<mpsc::Receiver<Egress>> {
        self.egress.take()
    }

    /// Signal both tasks and wait for them to exit.
    pub async fn stop(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Task failed during shutdown");
            }
        }
        tracing::info!("Shutdown complete");
    }
}
