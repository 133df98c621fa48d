//! Blake2b hashing for fingerprints and key derivation.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use lattice_types::{PeerId, PublicKey};

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Derive the identity fingerprint of a public key.
pub fn fingerprint(public: &PublicKey) -> PeerId {
    PeerId::new(blake2b_256(public.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_deterministic() {
        let h1 = blake2b_256(b"hello lattice");
        let h2 = blake2b_256(b"hello lattice");
        assert_eq!(h1, h2);
    }

    #[test]
    fn blake2b_different_inputs() {
        assert_ne!(blake2b_256(b"hello"), blake2b_256(b"world"));
    }

    #[test]
    fn blake2b_multi_equivalent() {
        let single = blake2b_256(b"helloworld");
        let multi = blake2b_256_multi(&[b"hello", b"world"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn fingerprint_is_not_the_key() {
        let key = PublicKey([9u8; 32]);
        let id = fingerprint(&key);
        assert_ne!(id.as_bytes(), key.as_bytes());
        assert!(!id.is_unknown());
    }
}
