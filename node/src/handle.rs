use std::time::Duration;

use async_trait::async_trait;
use drover_lib::content::ContentKey;
use drover_lib::diag::DiagSnapshot;
use drover_lib::PeerId;
use tokio::sync::mpsc;

use crate::error::NodeError;

/// The capability surface the harness consumes per node. Every verb
/// handler goes through this trait, never through a concrete node type,
/// so alternative node implementations can be swapped in for tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeHandle: Send + Sync + 'static {
    fn peer_id(&self) -> PeerId;

    fn address(&self) -> String;

    /// Write `value` under `key` through the routing layer.
    async fn put_value(&self, key: &str, value: Vec<u8>) -> Result<(), NodeError>;

    /// Read `key` through the routing layer.
    async fn get_value(&self, key: &str) -> Result<Vec<u8>, NodeError>;

    /// Write directly to this node's local store, bypassing routing.
    async fn store_local(&self, key: &str, value: Vec<u8>) -> Result<(), NodeError>;

    /// Announce this node as a provider for `key`.
    async fn provide(&self, key: &str) -> Result<(), NodeError>;

    /// Stream up to `count` provider ids for `key` as they are found.
    async fn find_providers(
        &self,
        key: &str,
        count: usize,
    ) -> Result<mpsc::Receiver<PeerId>, NodeError>;

    /// Resolve a peer's network address through routing.
    async fn find_peer(&self, id: PeerId) -> Result<String, NodeError>;

    /// Ingest a payload into the content-addressed store, returning its
    /// root key.
    async fn add_bytes(&self, data: &[u8]) -> Result<ContentKey, NodeError>;

    /// Recursively read a payload back by root key, fetching missing
    /// blocks from reachable peers.
    async fn read_bytes(&self, root: ContentKey) -> Result<Vec<u8>, NodeError>;

    /// Collect a snapshot of this node's known-peer graph.
    async fn diagnostics(&self, timeout: Duration) -> Result<DiagSnapshot, NodeError>;

    /// Cumulative (inbound, outbound) byte counters.
    fn bandwidth_totals(&self) -> (u64, u64);

    /// Release the node's resources. Further calls fail with `Closed`.
    async fn close(&self);
}
