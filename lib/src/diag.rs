use serde::{Deserialize, Serialize};

/// A point-in-time view of the peer graph as seen from one node, used
/// by the `diag` command and the visualization endpoint. Identifiers
/// are hex-encoded so snapshots serialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagSnapshot {
    pub self_id: String,
    pub peers: Vec<DiagPeer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagPeer {
    pub id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_address: Option<String>,
    /// Ids of the peers this peer is directly connected to.
    pub connections: Vec<String>,
}
