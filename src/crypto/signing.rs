// Ed25519 digital signatures.
//
// Ed25519 is a fast, well-reviewed EdDSA instantiation with fixed-size
// 32-byte public keys and 64-byte signatures — no parameter sets to choose,
// no detached-signature ceremony. Addresses are derived directly from the
// public key (see crypto::address), so every key pair produced here is
// immediately usable as a chain identity.
//
// Key generation is deterministic from a caller-supplied 32-byte seed so
// that a wallet's recovery phrase always reproduces the same keys.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

pub const PUBKEY_BYTES: usize = 32;
pub const SECKEY_BYTES: usize = 32;
pub const SIG_BYTES: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub [u8; PUBKEY_BYTES]);

impl serde::Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        if bytes.len() != PUBKEY_BYTES {
            return Err(serde::de::Error::custom("invalid public key length"));
        }
        let mut arr = [0u8; PUBKEY_BYTES];
        arr.copy_from_slice(&bytes);
        Ok(PublicKey(arr))
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({} bytes)", PUBKEY_BYTES)
    }
}

#[derive(Clone)]
pub struct SecretKey(pub [u8; SECKEY_BYTES]);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

#[derive(Clone)]
pub struct Signature(pub [u8; SIG_BYTES]);

impl serde::Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        if bytes.len() != SIG_BYTES {
            return Err(serde::de::Error::custom("invalid signature length"));
        }
        let mut arr = [0u8; SIG_BYTES];
        arr.copy_from_slice(&bytes);
        Ok(Signature(arr))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({} bytes)", SIG_BYTES)
    }
}

/// Generates an Ed25519 keypair deterministically from a 32-byte seed.
/// The same seed always yields the same keys, so a lost wallet file can be
/// regenerated from a recovery phrase alone.
pub fn generate_keypair(seed: &[u8; 32]) -> (PublicKey, SecretKey) {
    let signing_key = SigningKey::from_bytes(seed);
    let verifying_key = signing_key.verifying_key();
    (PublicKey(verifying_key.to_bytes()), SecretKey(*seed))
}

/// Generates a fresh keypair from OS randomness.
pub fn generate_random_keypair() -> (PublicKey, SecretKey) {
    let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
    let verifying_key = signing_key.verifying_key();
    (PublicKey(verifying_key.to_bytes()), SecretKey(signing_key.to_bytes()))
}

/// Signs a message with Ed25519.
pub fn sign(message: &[u8], sk: &SecretKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&sk.0);
    Signature(signing_key.sign(message).to_bytes())
}

/// Verifies an Ed25519 signature. Returns false on any malformed input —
/// never panics.
pub fn verify(message: &[u8], sig: &Signature, pk: &PublicKey) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(&pk.0) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let signature = ed25519_dalek::Signature::from_bytes(&sig.0);
    verifying_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let (pk, sk) = generate_keypair(&[0u8; 32]);
        let msg = b"knotchain genesis";
        let sig = sign(msg, &sk);
        assert!(verify(msg, &sig, &pk), "valid signature must verify");
    }

    #[test]
    fn test_wrong_message_fails() {
        let (pk, sk) = generate_keypair(&[0u8; 32]);
        let sig = sign(b"correct message", &sk);
        assert!(!verify(b"wrong message", &sig, &pk));
    }

    #[test]
    fn test_wrong_key_fails() {
        let (_pk1, sk1) = generate_keypair(&[0u8; 32]);
        let (pk2, _sk2) = generate_keypair(&[1u8; 32]);
        let sig = sign(b"test", &sk1);
        assert!(!verify(b"test", &sig, &pk2));
    }

    #[test]
    fn test_signature_size() {
        let (_pk, sk) = generate_keypair(&[0u8; 32]);
        let sig = sign(b"knotchain", &sk);
        assert_eq!(sig.0.len(), SIG_BYTES);
        assert_eq!(SIG_BYTES, 64);
    }

    #[test]
    fn test_corrupted_signature_rejected() {
        let (pk, sk) = generate_keypair(&[0u8; 32]);
        let msg = b"knotchain";
        let mut sig = sign(msg, &sk);
        sig.0[10] ^= 0xFF;
        assert!(!verify(msg, &sig, &pk), "corrupted signature must fail");
    }

    #[test]
    fn test_key_sizes() {
        let (pk, sk) = generate_keypair(&[42u8; 32]);
        assert_eq!(pk.0.len(), PUBKEY_BYTES);
        assert_eq!(sk.0.len(), SECKEY_BYTES);
    }

    #[test]
    fn test_deterministic_keygen() {
        let seed = [42u8; 32];
        let (pk1, sk1) = generate_keypair(&seed);
        let (pk2, sk2) = generate_keypair(&seed);

        assert_eq!(pk1.0, pk2.0, "same seed must produce same public key");
        assert_eq!(sk1.0, sk2.0, "same seed must produce same secret key");

        let seed2 = [43u8; 32];
        let (pk3, _sk3) = generate_keypair(&seed2);
        assert_ne!(pk1.0, pk3.0, "different seeds must produce different keys");
    }
}
