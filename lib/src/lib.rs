//! Shared leaf types for the drover harness and its simulated peer nodes:
//! peer identities, content-addressed keys, and diagnostic snapshots.

pub mod content;
pub mod diag;
pub mod keys;

/// A peer's identifier: the SHA-256 digest of its public key.
pub type PeerId = [u8; 32];

/// Byte-wise XOR distance between two identifiers, used to pick the
/// peer responsible for a routing key.
pub fn xor_distance(a: &PeerId, b: &PeerId) -> [u8; 32] {
    let mut out = [0u8; 32];
    for ((byte, x), y) in out.iter_mut().zip(a).zip(b) {
        *byte = x ^ y;
    }
    out
}

/// Short hex form of an identifier for log lines and command output.
pub fn short_id(id: &PeerId) -> String {
    hex::encode(id.get(..4).unwrap_or(id.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_distance_is_symmetric_and_zero_on_self() {
        let a: PeerId = [0xAB; 32];
        let b: PeerId = [0x13; 32];

        assert_eq!(xor_distance(&a, &b), xor_distance(&b, &a));
        assert_eq!(xor_distance(&a, &a), [0u8; 32]);
    }

    #[test]
    fn short_id_is_eight_hex_chars() {
        let id: PeerId = [0xFF; 32];
        assert_eq!(short_id(&id), "ffffffff");
    }
}
