// Genesis block construction.
use std::collections::BTreeMap;

use crate::config::{DIFFICULTY, GENESIS_BLOCK, GENESIS_REWARD, STORAGE_VALUE};
use crate::crypto::address::{encode_address_string, ADDRESS_BYTES};
use crate::crypto::signing::{self, Signature};
use crate::primitives::block::storage_chain_address;
use crate::primitives::Block;

/// Builds height-1 of the chain: no predecessor, no PoW, no signature —
/// its authority is the literal hash tag every node hard-codes, not a
/// cryptographic proof. `creator` receives GENESIS_REWARD; the reserved
/// storage address receives STORAGE_VALUE.
pub fn create_genesis_block(creator: [u8; ADDRESS_BYTES]) -> Block {
    let mut curr_hash = [0u8; 32];
    let tag = GENESIS_BLOCK.as_bytes();
    curr_hash[..tag.len()].copy_from_slice(tag);

    let mut mapping = BTreeMap::new();
    mapping.insert(encode_address_string(&storage_chain_address()), STORAGE_VALUE);
    mapping.insert(encode_address_string(&creator), GENESIS_REWARD);

    Block {
        curr_hash,
        prev_hash: [0u8; 32],
        nonce: 0,
        difficulty: DIFFICULTY,
        miner: creator,
        signature: Signature([0u8; signing::SIG_BYTES]),
        timestamp: "1970-01-01T00:00:00Z".to_string(),
        transactions: Vec::new(),
        mapping,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_allocations() {
        let creator = [4u8; ADDRESS_BYTES];
        let genesis = create_genesis_block(creator);

        assert_eq!(
            genesis.mapping.get(&encode_address_string(&creator)),
            Some(&GENESIS_REWARD)
        );
        assert_eq!(
            genesis.mapping.get(&encode_address_string(&storage_chain_address())),
            Some(&STORAGE_VALUE)
        );
    }

    #[test]
    fn test_genesis_hash_tag() {
        let genesis = create_genesis_block([1u8; ADDRESS_BYTES]);
        assert!(genesis.curr_hash.starts_with(GENESIS_BLOCK.as_bytes()));
    }
}
