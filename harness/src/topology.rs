//! Per-node configuration records and the bootstrap graph between
//! them, built once from the script's directive lines before any
//! command runs.

use std::collections::HashSet;

use drover_lib::keys::{generate_identity, Identity};
use drover_lib::short_id;
use drover_node::NodeSpec;
use log::info;

use crate::error::HarnessError;
use crate::range::parse_range;

pub const SWARM_PORT_BASE: u16 = 10_000;
pub const CONTROL_PORT_BASE: u16 = 9_000;
pub const DEFAULT_NODE_COUNT: usize = 15;

/// Highest node count whose swarm ports still fit in a u16.
pub const MAX_NODE_COUNT: usize = (u16::MAX - SWARM_PORT_BASE) as usize + 1;

/// Immutable per-node record: network address, generated identity and
/// the peers this node bootstraps to. Index `i` in the config list
/// refers to the same logical node for the whole run.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub address: String,
    pub control_address: Option<String>,
    pub identity: Identity,
    pub bootstrap: Vec<BootstrapPeer>,
}

#[derive(Debug, Clone)]
pub struct BootstrapPeer {
    pub address: String,
    pub peer_id: drover_lib::PeerId,
}

impl NodeConfig {
    pub fn to_spec(&self) -> NodeSpec {
        NodeSpec {
            peer_id: self.identity.peer_id,
            address: self.address.clone(),
            control_address: self.control_address.clone(),
            bootstrap: self.bootstrap.iter().map(|b| b.peer_id).collect(),
        }
    }
}

/// What a single setup line turned out to be.
#[derive(Debug, PartialEq, Eq)]
pub enum TopologyLine {
    Applied,
    /// The `--` terminator.
    End,
    /// Not a directive; the caller should treat it as the first command.
    Command,
}

pub struct Topology {
    pub configs: Vec<NodeConfig>,
    pub disabled: HashSet<usize>,
    bootstrapped: bool,
}

impl Topology {
    /// Allocate `n` sequential addresses from the base port, a fresh
    /// identity each, and (in remote-control mode) a secondary control
    /// address per node. Counts whose ports would not fit in a u16 are
    /// rejected before any identity is generated.
    pub fn build(n: usize, remote_control: bool) -> Result<Self, HarnessError> {
        if n > MAX_NODE_COUNT {
            return Err(HarnessError::Parse(format!(
                "node count {n} exceeds the maximum of {MAX_NODE_COUNT}"
            )));
        }

        let configs = (0..n)
            .map(|i| NodeConfig {
                address: format!("127.0.0.1:{}", u32::from(SWARM_PORT_BASE) + i as u32),
                control_address: remote_control
                    .then(|| format!("127.0.0.1:{}", u32::from(CONTROL_PORT_BASE) + i as u32)),
                identity: generate_identity(),
                bootstrap: Vec::new(),
            })
            .collect();

        Ok(Self {
            configs,
            disabled: HashSet::new(),
            bootstrapped: false,
        })
    }

    /// The 15-node star used by `--default`.
    pub fn default_star(remote_control: bool) -> Result<Self, HarnessError> {
        let mut topology = Self::build(DEFAULT_NODE_COUNT, remote_control)?;
        topology.finish();
        Ok(topology)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Record that node `from` bootstraps *to* node `to`.
    pub fn bootstrap_to(&mut self, from: usize, to: usize) -> Result<(), HarnessError> {
        let target = self
            .configs
            .get(to)
            .ok_or(HarnessError::OutOfRange(to))?;
        let peer = BootstrapPeer {
            address: target.address.clone(),
            peer_id: target.identity.peer_id,
        };
        info!(
            "{} will connect to {} on startup",
            short_id(
                &self
                    .configs
                    .get(from)
                    .ok_or(HarnessError::OutOfRange(from))?
                    .identity
                    .peer_id
            ),
            short_id(&peer.peer_id)
        );
        let config = self
            .configs
            .get_mut(from)
            .ok_or(HarnessError::OutOfRange(from))?;
        config.bootstrap.push(peer);
        self.bootstrapped = true;
        Ok(())
    }

    pub fn mark_off(&mut self, index: usize) -> Result<(), HarnessError> {
        if index >= self.configs.len() {
            return Err(HarnessError::OutOfRange(index));
        }
        self.disabled.insert(index);
        Ok(())
    }

    /// Interpret one setup line: `L -> R` connects the cross product,
    /// `off R` disables nodes at start, `#` comments and blanks are
    /// skipped, `--` ends the phase. Anything else is a command line.
    pub fn apply_line(&mut self, line: &str) -> Result<TopologyLine, HarnessError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(TopologyLine::Applied);
        }
        if line == "--" {
            return Ok(TopologyLine::End);
        }

        if let Some((left, right)) = line.split_once("->") {
            let left = parse_range(left.trim())?;
            let right = parse_range(right.trim())?;
            for &from in &left {
                for &to in &right {
                    self.bootstrap_to(from, to)?;
                }
            }
            return Ok(TopologyLine::Applied);
        }

        if let Some(rest) = line.strip_prefix("off ") {
            for index in parse_range(rest.trim())? {
                self.mark_off(index)?;
            }
            return Ok(TopologyLine::Applied);
        }

        Ok(TopologyLine::Command)
    }

    /// Apply the default star if the script declared no bootstrap
    /// directive: every node with index >= 1 bootstraps to node 0.
    pub fn finish(&mut self) {
        if self.bootstrapped || self.configs.len() < 2 {
            self.bootstrapped = true;
            return;
        }
        info!("no bootstrap directives given, applying default star topology");
        for i in 1..self.configs.len() {
            // Indices are in bounds by construction.
            let _ = self.bootstrap_to(i, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_allocates_sequential_addresses_and_distinct_identities() {
        let topology = Topology::build(3, false).unwrap();

        assert_eq!(topology.configs[0].address, "127.0.0.1:10000");
        assert_eq!(topology.configs[2].address, "127.0.0.1:10002");
        assert!(topology.configs[0].control_address.is_none());
        assert_ne!(
            topology.configs[0].identity.peer_id,
            topology.configs[1].identity.peer_id
        );
    }

    #[test]
    fn node_count_beyond_the_port_space_is_rejected() {
        assert!(matches!(
            Topology::build(MAX_NODE_COUNT + 1, false),
            Err(HarnessError::Parse(_))
        ));
        // The last admissible node lands exactly on the top u16 port.
        assert_eq!(
            SWARM_PORT_BASE as usize + MAX_NODE_COUNT - 1,
            u16::MAX as usize
        );
    }

    #[test]
    fn remote_control_mode_allocates_a_secondary_address() {
        let topology = Topology::build(2, true).unwrap();
        assert_eq!(
            topology.configs[1].control_address.as_deref(),
            Some("127.0.0.1:9001")
        );
    }

    #[test]
    fn connect_directive_applies_the_cross_product() {
        let mut topology = Topology::build(4, false).unwrap();
        assert_eq!(
            topology.apply_line("[1-2] -> [0]").unwrap(),
            TopologyLine::Applied
        );

        for i in 1..=2 {
            assert_eq!(topology.configs[i].bootstrap.len(), 1);
            assert_eq!(
                topology.configs[i].bootstrap[0].peer_id,
                topology.configs[0].identity.peer_id
            );
        }
        assert!(topology.configs[3].bootstrap.is_empty());
    }

    #[test]
    fn off_directive_disables_nodes_at_start() {
        let mut topology = Topology::build(5, false).unwrap();
        topology.apply_line("off [2-3]").unwrap();

        assert!(topology.disabled.contains(&2));
        assert!(topology.disabled.contains(&3));
        assert!(!topology.disabled.contains(&0));
    }

    #[test]
    fn terminator_comments_and_commands_are_distinguished() {
        let mut topology = Topology::build(2, false).unwrap();

        assert_eq!(topology.apply_line("--").unwrap(), TopologyLine::End);
        assert_eq!(topology.apply_line("# note").unwrap(), TopologyLine::Applied);
        assert_eq!(
            topology.apply_line("0 put foo bar").unwrap(),
            TopologyLine::Command
        );
    }

    #[test]
    fn directive_with_out_of_range_index_errors() {
        let mut topology = Topology::build(2, false).unwrap();
        assert!(topology.apply_line("0 -> 9").is_err());
        assert!(topology.apply_line("off 9").is_err());
    }

    #[test]
    fn finish_applies_star_only_without_explicit_directives() {
        let mut star = Topology::build(4, false).unwrap();
        star.finish();
        assert!(star.configs[0].bootstrap.is_empty());
        for i in 1..4 {
            assert_eq!(star.configs[i].bootstrap.len(), 1);
            assert_eq!(
                star.configs[i].bootstrap[0].peer_id,
                star.configs[0].identity.peer_id
            );
        }

        let mut explicit = Topology::build(3, false).unwrap();
        explicit.apply_line("2 -> 1").unwrap();
        explicit.finish();
        assert!(explicit.configs[1].bootstrap.is_empty());
        assert_eq!(explicit.configs[2].bootstrap.len(), 1);
    }
}
