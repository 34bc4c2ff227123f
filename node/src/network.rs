use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex, MutexGuard};

use drover_lib::content::{hash_block, ContentKey};
use drover_lib::diag::{DiagPeer, DiagSnapshot};
use drover_lib::{short_id, xor_distance, PeerId};
use log::{debug, info};
use tokio::sync::RwLock;

use crate::node::SimNode;

/// Immutable description of a node to spawn, derived from the harness's
/// per-node configuration record.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub peer_id: PeerId,
    pub address: String,
    pub control_address: Option<String>,
    /// Peers this node attempts to contact at startup.
    pub bootstrap: Vec<PeerId>,
}

/// Per-peer state shared between a live `SimNode` and the network
/// registry. Values, blocks and provider records are node-local; the
/// registry only decides which node's maps a routing operation touches.
pub(crate) struct PeerState {
    pub id: PeerId,
    pub address: String,
    pub control_address: Option<String>,
    pub bootstrap: Vec<PeerId>,
    pub values: Mutex<HashMap<String, Vec<u8>>>,
    /// Written by direct local stores only; never consulted by routed
    /// lookups from other peers.
    pub local_values: Mutex<HashMap<String, Vec<u8>>>,
    pub blocks: Mutex<HashMap<ContentKey, Vec<u8>>>,
    pub providers: Mutex<HashMap<String, Vec<PeerId>>>,
    pub bw_in: AtomicU64,
    pub bw_out: AtomicU64,
    pub closed: AtomicBool,
}

/// Recover the guard even if a writer panicked while holding the lock;
/// the maps stay usable either way.
pub(crate) fn safe_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-process registry of live peers. Bootstrap edges between
/// registered peers form an undirected graph; routing operations only
/// see peers reachable from the issuing node through that graph.
#[derive(Clone, Default)]
pub struct SimNetwork {
    peers: Arc<RwLock<HashMap<PeerId, Arc<PeerState>>>>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and hand back its live handle. The node starts
    /// "listening" immediately; its bootstrap edges materialize as soon
    /// as both endpoints are registered.
    pub async fn spawn(&self, spec: NodeSpec) -> SimNode {
        let state = Arc::new(PeerState {
            id: spec.peer_id,
            address: spec.address.clone(),
            control_address: spec.control_address.clone(),
            bootstrap: spec.bootstrap.clone(),
            values: Mutex::new(HashMap::new()),
            local_values: Mutex::new(HashMap::new()),
            blocks: Mutex::new(HashMap::new()),
            providers: Mutex::new(HashMap::new()),
            bw_in: AtomicU64::new(0),
            bw_out: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        info!(
            "node {} listening on {} ({} bootstrap peers)",
            short_id(&spec.peer_id),
            spec.address,
            spec.bootstrap.len()
        );
        self.peers.write().await.insert(spec.peer_id, state.clone());

        SimNode::new(state, self.clone())
    }

    pub(crate) async fn unregister(&self, id: &PeerId) {
        if self.peers.write().await.remove(id).is_some() {
            debug!("node {} left the network", short_id(id));
        }
    }

    pub async fn is_registered(&self, id: &PeerId) -> bool {
        self.peers.read().await.contains_key(id)
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// All peers reachable from `from` (inclusive) via bootstrap edges,
    /// treating edges as undirected. Closed or unregistered starting
    /// points see an empty network.
    pub(crate) async fn reachable_from(&self, from: &PeerId) -> Vec<Arc<PeerState>> {
        let peers = self.peers.read().await;
        if !peers.contains_key(from) {
            return Vec::new();
        }

        let mut adjacency: HashMap<PeerId, Vec<PeerId>> = HashMap::new();
        for (id, state) in peers.iter() {
            for target in &state.bootstrap {
                if peers.contains_key(target) {
                    adjacency.entry(*id).or_default().push(*target);
                    adjacency.entry(*target).or_default().push(*id);
                }
            }
        }

        let mut seen: HashSet<PeerId> = HashSet::new();
        let mut queue = VecDeque::from([*from]);
        seen.insert(*from);
        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = adjacency.get(&current) {
                for neighbor in neighbors {
                    if seen.insert(*neighbor) {
                        queue.push_back(*neighbor);
                    }
                }
            }
        }

        let mut out: Vec<Arc<PeerState>> = seen
            .iter()
            .filter_map(|id| peers.get(id).cloned())
            .collect();
        // Deterministic owner selection needs a stable order.
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// The peer responsible for a routing key: minimal XOR distance
    /// between the key's hash and the peer id, ties broken by id.
    pub(crate) fn owner_of(key: &str, peers: &[Arc<PeerState>]) -> Option<Arc<PeerState>> {
        let target = hash_block(key.as_bytes());
        peers
            .iter()
            .min_by_key(|p| (xor_distance(&p.id, &target), p.id))
            .cloned()
    }

    /// Known-peer graph from `from`'s point of view, rendered with
    /// hex-encoded ids for serialization.
    pub(crate) async fn snapshot_from(&self, from: &PeerId) -> DiagSnapshot {
        let reachable = self.reachable_from(from).await;
        let known: HashSet<PeerId> = reachable.iter().map(|p| p.id).collect();

        let peers = reachable
            .iter()
            .map(|state| {
                let mut connections: Vec<String> = Vec::new();
                for other in &reachable {
                    let linked = state.bootstrap.contains(&other.id)
                        || other.bootstrap.contains(&state.id);
                    if linked && other.id != state.id && known.contains(&other.id) {
                        connections.push(hex::encode(other.id));
                    }
                }
                DiagPeer {
                    id: hex::encode(state.id),
                    address: state.address.clone(),
                    control_address: state.control_address.clone(),
                    connections,
                }
            })
            .collect();

        DiagSnapshot {
            self_id: hex::encode(from),
            peers,
        }
    }
}
