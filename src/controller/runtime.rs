//! Controller task and its management handle.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::BackendConfig;
use crate::controller::engine::{Controller, FlowStats};
use crate::controller::error::ControlError;
use crate::controller::events::ControlEvent;
use crate::openflow::{ControllerCommand, SwitchEvent};

/// Serve switch events until shutdown or the switch goes away.
pub async fn run(
    controller: Arc<Controller>,
    mut events: mpsc::Receiver<SwitchEvent>,
    commands: mpsc::Sender<ControllerCommand>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Switch event channel closed, controller stopping");
                    break;
                };
                for command in controller.handle_event(event) {
                    if commands.send(command).await.is_err() {
                        tracing::warn!("Switch command channel closed, controller stopping");
                        return;
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Controller received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

/// Cloneable access to a running controller.
///
/// Management operations that produce flow deletions send them down the
/// same command channel the event loop uses.
#[derive(Clone)]
pub struct ControllerHandle {
    controller: Arc<Controller>,
    commands: mpsc::Sender<ControllerCommand>,
}

impl ControllerHandle {
    pub fn new(controller: Arc<Controller>, commands: mpsc::Sender<ControllerCommand>) -> Self {
        Self {
            controller,
            commands,
        }
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.controller.subscribe()
    }

    pub fn flow_stats(&self) -> FlowStats {
        self.controller.flow_stats()
    }

    pub async fn set_backend_alive(&self, name: &str, alive: bool) -> Result<(), ControlError> {
        let commands = self.controller.set_backend_alive(name, alive)?;
        self.send_all(commands).await
    }

    pub fn add_backend(&self, config: &BackendConfig) -> Result<(), ControlError> {
        self.controller.add_backend(config)
    }

    pub async fn remove_backend(&self, name: &str) -> Result<(), ControlError> {
        let commands = self.controller.remove_backend(name)?;
        self.send_all(commands).await
    }

    /// Apply a reloaded backend list.
    pub async fn reconcile(&self, backends: &[BackendConfig]) -> Result<(), ControlError> {
        let commands = self.controller.reconcile(backends);
        self.send_all(commands).await
    }

    async fn send_all(&self, commands: Vec<ControllerCommand>) -> Result<(), ControlError> {
        for command in commands {
            self.commands
                .send(command)
                .await
                .map_err(|_| ControlError::SwitchGone)?;
        }
        Ok(())
    }
}
