use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drover_lib::content::{
    chunks, decode_manifest, encode_manifest, hash_block, ContentKey, Manifest,
};
use drover_lib::diag::DiagSnapshot;
use drover_lib::{short_id, PeerId};
use log::debug;
use tokio::sync::mpsc;

use crate::error::NodeError;
use crate::handle::NodeHandle;
use crate::network::{safe_lock, PeerState, SimNetwork};

/// A live in-memory peer. Owns its local key/value, block and provider
/// maps; routing operations consult the shared [`SimNetwork`] to decide
/// which reachable peer's maps to touch, charging bandwidth counters on
/// both ends for remote traffic.
pub struct SimNode {
    state: Arc<PeerState>,
    network: SimNetwork,
}

impl SimNode {
    pub(crate) fn new(state: Arc<PeerState>, network: SimNetwork) -> Self {
        Self { state, network }
    }

    fn ensure_open(&self) -> Result<(), NodeError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(NodeError::Closed);
        }
        Ok(())
    }

    async fn reachable(&self) -> Result<Vec<Arc<PeerState>>, NodeError> {
        self.ensure_open()?;
        let peers = self.network.reachable_from(&self.state.id).await;
        if peers.is_empty() {
            // A registered node always reaches at least itself.
            return Err(NodeError::Closed);
        }
        Ok(peers)
    }

    fn charge_transfer(&self, remote: &PeerState, inbound: bool, len: usize) {
        if remote.id == self.state.id {
            return;
        }
        let len = len as u64;
        if inbound {
            self.state.bw_in.fetch_add(len, Ordering::Relaxed);
            remote.bw_out.fetch_add(len, Ordering::Relaxed);
        } else {
            self.state.bw_out.fetch_add(len, Ordering::Relaxed);
            remote.bw_in.fetch_add(len, Ordering::Relaxed);
        }
    }

    /// Look a block up locally, then on any reachable peer, charging
    /// bandwidth for remote hits.
    async fn fetch_block(&self, key: &ContentKey) -> Result<Vec<u8>, NodeError> {
        if let Some(block) = safe_lock(&self.state.blocks).get(key).cloned() {
            return Ok(block);
        }
        for peer in self.reachable().await? {
            let found = safe_lock(&peer.blocks).get(key).cloned();
            if let Some(block) = found {
                self.charge_transfer(&peer, true, block.len());
                return Ok(block);
            }
        }
        Err(NodeError::NotFound(hex::encode(key)))
    }
}

#[async_trait]
impl NodeHandle for SimNode {
    fn peer_id(&self) -> PeerId {
        self.state.id
    }

    fn address(&self) -> String {
        self.state.address.clone()
    }

    async fn put_value(&self, key: &str, value: Vec<u8>) -> Result<(), NodeError> {
        let peers = self.reachable().await?;
        let owner = SimNetwork::owner_of(key, &peers).ok_or(NodeError::Closed)?;
        debug!(
            "put '{}' routed to {} from {}",
            key,
            short_id(&owner.id),
            short_id(&self.state.id)
        );
        self.charge_transfer(&owner, false, value.len());
        safe_lock(&owner.values).insert(key.to_string(), value);
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Vec<u8>, NodeError> {
        let peers = self.reachable().await?;
        let owner = SimNetwork::owner_of(key, &peers).ok_or(NodeError::Closed)?;
        let routed = safe_lock(&owner.values).get(key).cloned();
        if let Some(value) = routed {
            self.charge_transfer(&owner, true, value.len());
            return Ok(value);
        }
        // A value stored locally with `store` bypassed routing entirely.
        safe_lock(&self.state.local_values)
            .get(key)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(key.to_string()))
    }

    async fn store_local(&self, key: &str, value: Vec<u8>) -> Result<(), NodeError> {
        self.ensure_open()?;
        safe_lock(&self.state.local_values).insert(key.to_string(), value);
        Ok(())
    }

    async fn provide(&self, key: &str) -> Result<(), NodeError> {
        let peers = self.reachable().await?;
        let owner = SimNetwork::owner_of(key, &peers).ok_or(NodeError::Closed)?;
        let mut providers = safe_lock(&owner.providers);
        let entry = providers.entry(key.to_string()).or_default();
        if !entry.contains(&self.state.id) {
            entry.push(self.state.id);
        }
        Ok(())
    }

    async fn find_providers(
        &self,
        key: &str,
        count: usize,
    ) -> Result<mpsc::Receiver<PeerId>, NodeError> {
        let peers = self.reachable().await?;
        let owner = SimNetwork::owner_of(key, &peers).ok_or(NodeError::Closed)?;
        let found: Vec<PeerId> = safe_lock(&owner.providers)
            .get(key)
            .map(|ids| ids.iter().take(count.max(1)).copied().collect())
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(count.max(1));
        tokio::spawn(async move {
            for id in found {
                if tx.send(id).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn find_peer(&self, id: PeerId) -> Result<String, NodeError> {
        let peers = self.reachable().await?;
        peers
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.address.clone())
            .ok_or_else(|| NodeError::Unreachable(short_id(&id)))
    }

    async fn add_bytes(&self, data: &[u8]) -> Result<ContentKey, NodeError> {
        self.ensure_open()?;

        let mut manifest = Manifest {
            chunks: Vec::new(),
            total_len: data.len() as u64,
        };
        {
            let mut blocks = safe_lock(&self.state.blocks);
            for chunk in chunks(data) {
                let key = hash_block(chunk);
                manifest.chunks.push(key);
                blocks.insert(key, chunk.to_vec());
            }
        }

        let encoded = encode_manifest(&manifest)
            .map_err(|e| NodeError::CorruptBlock(e.to_string()))?;
        let root = hash_block(&encoded);
        safe_lock(&self.state.blocks).insert(root, encoded);
        debug!(
            "node {} added {} bytes as {}",
            short_id(&self.state.id),
            data.len(),
            short_id(&root)
        );
        Ok(root)
    }

    async fn read_bytes(&self, root: ContentKey) -> Result<Vec<u8>, NodeError> {
        let encoded = self.fetch_block(&root).await?;
        let manifest =
            decode_manifest(&encoded).map_err(|e| NodeError::CorruptBlock(e.to_string()))?;

        let mut out = Vec::with_capacity(manifest.total_len as usize);
        for key in &manifest.chunks {
            out.extend_from_slice(&self.fetch_block(key).await?);
        }
        Ok(out)
    }

    async fn diagnostics(&self, timeout: Duration) -> Result<DiagSnapshot, NodeError> {
        self.ensure_open()?;
        tokio::time::timeout(timeout, self.network.snapshot_from(&self.state.id))
            .await
            .map_err(|_| NodeError::Timeout)
    }

    fn bandwidth_totals(&self) -> (u64, u64) {
        (
            self.state.bw_in.load(Ordering::Relaxed),
            self.state.bw_out.load(Ordering::Relaxed),
        )
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.network.unregister(&self.state.id).await;
    }
}
