//! drover: a scripted/interactive test harness that provisions
//! simulated peer nodes in a content-addressed peer-to-peer network,
//! wires them into a bootstrap topology, and drives verb-based
//! commands against arbitrary subsets of nodes, synchronously or
//! concurrently.

use std::collections::HashSet;
use std::sync::Arc;

use drover_node::{NodeHandle, SimNetwork};
use tokio_util::sync::CancellationToken;

pub mod commands;
pub mod controller;
pub mod error;
pub mod fixture;
pub mod range;
pub mod script;
pub mod stats;
pub mod topology;
pub mod viz;

pub use error::HarnessError;

use controller::NodeController;
use fixture::FixtureStore;
use stats::StatsCollector;
use topology::{NodeConfig, Topology};

/// The shared run context: configs and controllers (equal length,
/// index-correspondent for the whole process lifetime), the fixture
/// store, the stats log and the process-wide cancellation token.
pub struct Harness {
    pub network: SimNetwork,
    pub configs: Vec<NodeConfig>,
    pub controllers: Vec<Arc<NodeController>>,
    pub fixtures: FixtureStore,
    pub stats: StatsCollector,
    pub cancel: CancellationToken,
    disabled: HashSet<usize>,
}

impl Harness {
    pub fn new(topology: Topology) -> Arc<Self> {
        let configs = topology.configs;
        let controllers = configs
            .iter()
            .enumerate()
            .map(|(i, config)| Arc::new(NodeController::new(i, config.clone())))
            .collect();

        Arc::new(Self {
            network: SimNetwork::new(),
            configs,
            controllers,
            fixtures: FixtureStore::new(),
            stats: StatsCollector::new(),
            cancel: CancellationToken::new(),
            disabled: topology.disabled,
        })
    }

    /// Start every node that was not disabled by an `off` directive.
    /// Disabled nodes keep their slot and must be started explicitly.
    pub async fn start_enabled(&self) -> Result<(), HarnessError> {
        for controller in &self.controllers {
            if !self.disabled.contains(&controller.index()) {
                controller.start(&self.network).await?;
            }
        }
        Ok(())
    }

    pub fn controller(&self, index: usize) -> Result<&Arc<NodeController>, HarnessError> {
        self.controllers
            .get(index)
            .ok_or(HarnessError::OutOfRange(index))
    }

    /// The live handle for `index`, or a lifecycle error.
    pub async fn node(&self, index: usize) -> Result<Arc<dyn NodeHandle>, HarnessError> {
        self.controller(index)?.handle().await
    }

    /// End-of-run cleanup: close every running node and fire the
    /// process-wide cancellation exactly once.
    pub async fn shutdown(&self) {
        for controller in &self.controllers {
            controller.shutdown().await;
        }
        self.cancel.cancel();
    }
}
