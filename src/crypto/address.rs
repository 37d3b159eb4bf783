// Address encoding.
//
// An address is the textual form of a public key, not a hash of it —
// addresses appear verbatim inside transactions and block mappings, and
// the node must be able to recover the signing key's bytes straight back
// out of an address string to verify a signature. Encoding is standard
// base64 so `decode(encode(pubkey)) == pubkey` exactly.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use crate::crypto::signing::{PublicKey, PUBKEY_BYTES};

pub const ADDRESS_BYTES: usize = PUBKEY_BYTES;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base64 encoding")]
    InvalidEncoding,
    #[error("decoded address has the wrong length")]
    InvalidLength,
}

/// The address of a public key is simply the key's canonical bytes.
pub fn derive_address(pk: &PublicKey) -> [u8; ADDRESS_BYTES] {
    pk.0
}

/// Encodes raw address bytes as standard base64.
pub fn encode_address_string(addr: &[u8; ADDRESS_BYTES]) -> String {
    B64.encode(addr)
}

/// Decodes a base64 address string back to raw bytes.
pub fn decode_address_string(s: &str) -> Result<[u8; ADDRESS_BYTES], AddressError> {
    let bytes = B64.decode(s).map_err(|_| AddressError::InvalidEncoding)?;
    if bytes.len() != ADDRESS_BYTES {
        return Err(AddressError::InvalidLength);
    }
    let mut addr = [0u8; ADDRESS_BYTES];
    addr.copy_from_slice(&bytes);
    Ok(addr)
}

/// Recovers the public key a textual address encodes.
pub fn public_key_from_address(addr: &[u8; ADDRESS_BYTES]) -> PublicKey {
    PublicKey(*addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::generate_keypair;

    #[test]
    fn address_roundtrips_through_encoding() {
        let (pk, _sk) = generate_keypair(&[7u8; 32]);
        let addr = derive_address(&pk);
        let encoded = encode_address_string(&addr);
        let decoded = decode_address_string(&encoded).unwrap();
        assert_eq!(addr, decoded);
    }

    #[test]
    fn address_recovers_original_public_key() {
        let (pk, _sk) = generate_keypair(&[9u8; 32]);
        let addr = derive_address(&pk);
        assert_eq!(public_key_from_address(&addr).0, pk.0);
    }

    #[test]
    fn malformed_base64_is_rejected() {
        assert!(decode_address_string("not valid base64!!").is_err());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 10]);
        assert!(decode_address_string(&short).is_err());
    }
}
