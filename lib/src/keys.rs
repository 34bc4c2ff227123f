use p256::ecdsa::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use crate::PeerId;

/// A node's identity: a fresh P-256 keypair plus the peer id derived
/// from it. The peer id is the SHA-256 hash of the SEC1-encoded public
/// key, so it can be recomputed by anyone holding the public key.
#[derive(Debug, Clone)]
pub struct Identity {
    pub peer_id: PeerId,
    pub public_key: String,
    pub private_key: String,
}

pub fn generate_identity() -> Identity {
    let private_key = SigningKey::random(&mut OsRng);
    let public_key = VerifyingKey::from(&private_key);

    let public_bytes = public_key.to_sec1_bytes();
    let peer_id = derive_peer_id(&public_bytes);

    Identity {
        peer_id,
        public_key: hex::encode(public_bytes),
        private_key: hex::encode(private_key.to_bytes()),
    }
}

pub fn derive_peer_id(public_key_bytes: &[u8]) -> PeerId {
    let mut hasher = Sha256::new();
    hasher.update(public_key_bytes);
    hasher.finalize().into()
}

/// Parse a full-length hex peer id, as typed on a `findpeer` command line.
pub fn parse_peer_id(s: &str) -> Result<PeerId, String> {
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    let id: PeerId = bytes
        .try_into()
        .map_err(|_| "peer id must be 32 bytes of hex".to_string())?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_identities_are_distinct() {
        let a = generate_identity();
        let b = generate_identity();

        assert_ne!(a.peer_id, b.peer_id);
        assert_ne!(a.private_key, b.private_key);
    }

    #[test]
    fn peer_id_matches_public_key_hash() {
        let identity = generate_identity();
        let public_bytes = hex::decode(&identity.public_key).unwrap();

        assert_eq!(identity.peer_id, derive_peer_id(&public_bytes));
    }

    #[test]
    fn parse_peer_id_round_trips() {
        let identity = generate_identity();
        let parsed = parse_peer_id(&hex::encode(identity.peer_id)).unwrap();
        assert_eq!(parsed, identity.peer_id);
    }

    #[test]
    fn parse_peer_id_rejects_short_input() {
        assert!(parse_peer_id("abcd").is_err());
        assert!(parse_peer_id("not hex").is_err());
    }
}
