// Cryptographic hashing wrappers
use sha2::{Digest, Sha256};

/// SHA-256: the single hash function used across transactions, blocks, and
/// proof-of-work. Every component hashes through this wrapper so the
/// algorithm stays in one place.
pub fn hash_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes `a` then `b` without allocating a temporary concatenated buffer.
pub fn hash_sha256_concat(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_length() {
        let hash = hash_sha256(b"knotchain");
        assert_eq!(hash.len(), 32);
    }

    #[test]
    fn test_sha256_deterministic() {
        assert_eq!(hash_sha256(b"abc"), hash_sha256(b"abc"));
        assert_ne!(hash_sha256(b"abc"), hash_sha256(b"abd"));
    }

    #[test]
    fn test_concat_matches_manual_concat() {
        let a = b"hello ";
        let b = b"world";
        let mut combined = a.to_vec();
        combined.extend_from_slice(b);
        assert_eq!(hash_sha256_concat(a, b), hash_sha256(&combined));
    }
}
