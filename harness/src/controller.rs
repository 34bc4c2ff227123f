//! Per-node lifecycle wrapper. A controller keeps its slot even after
//! its node is killed so index numbering never shifts.

use std::sync::Arc;

use drover_lib::{short_id, PeerId};
use drover_node::{NodeHandle, SimNetwork};
use log::info;
use tokio::sync::Mutex;

use crate::error::HarnessError;
use crate::topology::NodeConfig;

/// `Unstarted -> Running -> Killed`, with `Killed` terminal. The tag is
/// checked before every dispatch; a dead handle is never inferred from
/// nullability.
pub enum Lifecycle {
    Unstarted,
    Running(Arc<dyn NodeHandle>),
    Killed,
}

impl Lifecycle {
    pub fn name(&self) -> &'static str {
        match self {
            Lifecycle::Unstarted => "unstarted",
            Lifecycle::Running(_) => "running",
            Lifecycle::Killed => "killed",
        }
    }
}

/// The slot mutex serializes lifecycle transitions and handle checkout
/// on the same index. An in-flight command holds a cloned handle, not
/// the lock, so a racing `kill` closes the node under it and the
/// command surfaces a clean `Closed` error instead of racing.
pub struct NodeController {
    index: usize,
    config: NodeConfig,
    slot: Mutex<Lifecycle>,
}

impl NodeController {
    pub fn new(index: usize, config: NodeConfig) -> Self {
        Self {
            index,
            config,
            slot: Mutex::new(Lifecycle::Unstarted),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The configured identity; valid in every lifecycle state.
    pub fn peer_id(&self) -> PeerId {
        self.config.identity.peer_id
    }

    pub async fn state_name(&self) -> &'static str {
        self.slot.lock().await.name()
    }

    /// `Unstarted -> Running`: construct the node from this slot's
    /// config, at which point it starts listening and joins its
    /// bootstrap peers.
    pub async fn start(&self, network: &SimNetwork) -> Result<(), HarnessError> {
        let mut slot = self.slot.lock().await;
        match *slot {
            Lifecycle::Running(_) => Err(HarnessError::AlreadyRunning(self.index)),
            Lifecycle::Killed => Err(HarnessError::DeadNode(self.index)),
            Lifecycle::Unstarted => {
                info!(
                    "starting node {} ({}) on {}",
                    self.index,
                    short_id(&self.config.identity.peer_id),
                    self.config.address
                );
                let node = network.spawn(self.config.to_spec()).await;
                *slot = Lifecycle::Running(Arc::new(node));
                Ok(())
            }
        }
    }

    /// `Running -> Killed`: release the node's resources. The slot is
    /// retained so later commands fail with `DeadNode` rather than
    /// shifting indices.
    pub async fn kill(&self) -> Result<(), HarnessError> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Lifecycle::Unstarted => Err(HarnessError::NotStarted(self.index)),
            Lifecycle::Killed => Err(HarnessError::DeadNode(self.index)),
            Lifecycle::Running(handle) => {
                info!("killing node {}", self.index);
                handle.close().await;
                *slot = Lifecycle::Killed;
                Ok(())
            }
        }
    }

    /// Check out the live handle for a command. Fails fast on any
    /// non-running state with no side effect.
    pub async fn handle(&self) -> Result<Arc<dyn NodeHandle>, HarnessError> {
        match &*self.slot.lock().await {
            Lifecycle::Running(handle) => Ok(handle.clone()),
            Lifecycle::Unstarted => Err(HarnessError::NotStarted(self.index)),
            Lifecycle::Killed => Err(HarnessError::DeadNode(self.index)),
        }
    }

    /// Seat an arbitrary handle in the slot, bypassing `start`.
    #[cfg(test)]
    pub(crate) async fn install(&self, handle: Arc<dyn NodeHandle>) {
        *self.slot.lock().await = Lifecycle::Running(handle);
    }

    /// Quiet shutdown for end-of-run cleanup; a no-op off the Running
    /// state.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let Lifecycle::Running(handle) = &*slot {
            handle.close().await;
            *slot = Lifecycle::Killed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Topology;

    fn controller(index: usize) -> (NodeController, SimNetwork) {
        let topology = Topology::build(index + 1, false).unwrap();
        let config = topology.configs.into_iter().nth(index).unwrap();
        (NodeController::new(index, config), SimNetwork::new())
    }

    #[tokio::test]
    async fn start_and_kill_walk_the_lifecycle() {
        let (controller, network) = controller(0);
        assert_eq!(controller.state_name().await, "unstarted");

        controller.start(&network).await.unwrap();
        assert_eq!(controller.state_name().await, "running");
        assert!(network.is_registered(&controller.peer_id()).await);

        controller.kill().await.unwrap();
        assert_eq!(controller.state_name().await, "killed");
        assert!(!network.is_registered(&controller.peer_id()).await);
    }

    #[tokio::test]
    async fn commands_against_unstarted_and_killed_slots_fail_fast() {
        let (controller, network) = controller(1);

        assert!(matches!(
            controller.handle().await,
            Err(HarnessError::NotStarted(1))
        ));

        controller.start(&network).await.unwrap();
        controller.kill().await.unwrap();
        assert!(matches!(
            controller.handle().await,
            Err(HarnessError::DeadNode(1))
        ));
    }

    #[tokio::test]
    async fn double_start_and_killed_restart_are_errors() {
        let (controller, network) = controller(0);
        controller.start(&network).await.unwrap();

        assert!(matches!(
            controller.start(&network).await,
            Err(HarnessError::AlreadyRunning(0))
        ));

        controller.kill().await.unwrap();
        assert!(matches!(
            controller.start(&network).await,
            Err(HarnessError::DeadNode(0))
        ));
        assert!(matches!(
            controller.kill().await,
            Err(HarnessError::DeadNode(0))
        ));
    }

    #[tokio::test]
    async fn kill_races_an_in_flight_handle_cleanly() {
        let (controller, network) = controller(0);
        controller.start(&network).await.unwrap();

        let handle = controller.handle().await.unwrap();
        controller.kill().await.unwrap();

        // The checked-out handle observes a clean Closed error.
        assert!(handle.get_value("anything").await.is_err());
    }
}
