//! Content addressing for the simulated block store: payloads are split
//! into fixed-size chunks, each chunk is stored under its SHA-256 hash,
//! and the root key is the hash of a bincode-encoded manifest listing
//! the chunk hashes in order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of a single content block (chunk or manifest).
pub type ContentKey = [u8; 32];

pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub chunks: Vec<ContentKey>,
    pub total_len: u64,
}

pub fn hash_block(data: &[u8]) -> ContentKey {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn encode_manifest(manifest: &Manifest) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(manifest)
}

pub fn decode_manifest(bytes: &[u8]) -> Result<Manifest, bincode::Error> {
    bincode::deserialize(bytes)
}

/// Split a payload into chunks. An empty payload yields a single empty
/// chunk so that zero-length fixtures still get a root key.
pub fn chunks(data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        return vec![&[]];
    }
    data.chunks(CHUNK_SIZE).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_bincode() {
        let manifest = Manifest {
            chunks: vec![[1u8; 32], [2u8; 32]],
            total_len: 70_000,
        };

        let encoded = encode_manifest(&manifest).unwrap();
        assert_eq!(decode_manifest(&encoded).unwrap(), manifest);
    }

    #[test]
    fn chunking_covers_the_payload() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 17];
        let parts = chunks(&data);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts.iter().map(|c| c.len()).sum::<usize>(), data.len());
        assert_eq!(parts[2].len(), 17);
    }

    #[test]
    fn empty_payload_still_has_a_chunk() {
        assert_eq!(chunks(&[]).len(), 1);
    }

    #[test]
    fn identical_payloads_hash_identically() {
        let a = vec![42u8; 1000];
        let b = a.clone();
        assert_eq!(hash_block(&a), hash_block(&b));
        assert_ne!(hash_block(&a), hash_block(&[1, 2, 3]));
    }
}
