// Transaction: structure, hashing, self-signature.
use crate::config::{RAND_BYTES, START_PERCENT, STORAGE_REWARD};
use crate::crypto::address::{derive_address, public_key_from_address, ADDRESS_BYTES};
use crate::crypto::hash::hash_sha256;
use crate::crypto::signing::{self, PublicKey, SecretKey, Signature};
use crate::error::TxError;

/// A single value transfer, immutable once hashed.
///
/// `hash = H(randBytes ‖ prevBlockHash ‖ sender ‖ receiver ‖ value ‖ storageReward)`.
/// The signature is computed over that hash, so any field change invalidates
/// both the hash and the signature — there is no way to mutate a transaction
/// in place without detection.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub rand_bytes: [u8; RAND_BYTES],
    pub prev_block_hash: [u8; 32],
    pub sender: [u8; ADDRESS_BYTES],
    pub receiver: [u8; ADDRESS_BYTES],
    pub value: u64,
    pub storage_reward: u64,
    pub hash: [u8; 32],
    pub signature: Signature,
}

impl Transaction {
    fn compute_hash(
        rand_bytes: &[u8; RAND_BYTES],
        prev_block_hash: &[u8; 32],
        sender: &[u8; ADDRESS_BYTES],
        receiver: &[u8; ADDRESS_BYTES],
        value: u64,
        storage_reward: u64,
    ) -> [u8; 32] {
        let mut buf = Vec::with_capacity(RAND_BYTES + 32 + ADDRESS_BYTES * 2 + 16);
        buf.extend_from_slice(rand_bytes);
        buf.extend_from_slice(prev_block_hash);
        buf.extend_from_slice(sender);
        buf.extend_from_slice(receiver);
        buf.extend_from_slice(&value.to_le_bytes());
        buf.extend_from_slice(&storage_reward.to_le_bytes());
        hash_sha256(&buf)
    }

    /// Builds and signs a new transaction. `storageReward` is derived from
    /// the §3 rule: STORAGE_REWARD whenever `value > START_PERCENT`, else 0.
    pub fn build(
        sender_pk: &PublicKey,
        sender_sk: &SecretKey,
        prev_block_hash: [u8; 32],
        receiver: [u8; ADDRESS_BYTES],
        value: u64,
    ) -> Result<Self, TxError> {
        if value == 0 {
            return Err(TxError::ZeroValue);
        }
        let sender = derive_address(sender_pk);
        let storage_reward = if value > START_PERCENT { STORAGE_REWARD } else { 0 };

        let mut rand_bytes = [0u8; RAND_BYTES];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut rand_bytes);

        let hash = Self::compute_hash(&rand_bytes, &prev_block_hash, &sender, &receiver, value, storage_reward);
        let signature = signing::sign(&hash, sender_sk);

        Ok(Transaction {
            rand_bytes,
            prev_block_hash,
            sender,
            receiver,
            value,
            storage_reward,
            hash,
            signature,
        })
    }

    /// Builds the structural-only storage-reward transaction minted by
    /// `Block::accept`. Per the design notes, this transaction carries no
    /// signature requirement — it is validated structurally, not
    /// cryptographically, because its authority is implicit in the block.
    pub fn build_storage_reward(storage_chain: [u8; ADDRESS_BYTES], miner: [u8; ADDRESS_BYTES], prev_block_hash: [u8; 32]) -> Self {
        let mut rand_bytes = [0u8; RAND_BYTES];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut rand_bytes);
        let value = STORAGE_REWARD;
        let storage_reward = 0;
        let hash = Self::compute_hash(&rand_bytes, &prev_block_hash, &storage_chain, &miner, value, storage_reward);
        Transaction {
            rand_bytes,
            prev_block_hash,
            sender: storage_chain,
            receiver: miner,
            value,
            storage_reward,
            hash,
            signature: Signature([0u8; signing::SIG_BYTES]),
        }
    }

    /// True if `sender` equals the reserved storage-chain address bytes.
    pub fn is_storage_reward(&self, storage_chain_addr: &[u8; ADDRESS_BYTES]) -> bool {
        &self.sender == storage_chain_addr
    }

    /// Re-derives the hash and verifies the signature against the sender
    /// address. Does not check balances — that is the block's job.
    pub fn is_valid(&self) -> Result<(), TxError> {
        if self.sender == [0u8; ADDRESS_BYTES] {
            return Err(TxError::NullSender);
        }
        if self.value == 0 {
            return Err(TxError::ZeroValue);
        }
        let expected = Self::compute_hash(
            &self.rand_bytes,
            &self.prev_block_hash,
            &self.sender,
            &self.receiver,
            self.value,
            self.storage_reward,
        );
        if expected != self.hash {
            return Err(TxError::HashMismatch);
        }
        let pk = public_key_from_address(&self.sender);
        if !signing::verify(&self.hash, &self.signature, &pk) {
            return Err(TxError::InvalidSignature);
        }
        Ok(())
    }

    /// Like [`is_valid`](Self::is_valid) but skips the signature check,
    /// for the unsigned storage-reward transaction.
    pub fn is_structurally_valid_unsigned(&self) -> Result<(), TxError> {
        if self.sender == [0u8; ADDRESS_BYTES] {
            return Err(TxError::NullSender);
        }
        if self.value == 0 {
            return Err(TxError::ZeroValue);
        }
        let expected = Self::compute_hash(
            &self.rand_bytes,
            &self.prev_block_hash,
            &self.sender,
            &self.receiver,
            self.value,
            self.storage_reward,
        );
        if expected != self.hash {
            return Err(TxError::HashMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::generate_keypair;

    fn mock_tx(value: u64) -> Transaction {
        let (pk, sk) = generate_keypair(&[1u8; 32]);
        let receiver = [2u8; ADDRESS_BYTES];
        Transaction::build(&pk, &sk, [0u8; 32], receiver, value).unwrap()
    }

    #[test]
    fn test_build_and_validate() {
        let tx = mock_tx(50);
        assert!(tx.is_valid().is_ok());
    }

    #[test]
    fn test_storage_reward_applied_above_threshold() {
        let tx = mock_tx(11);
        assert_eq!(tx.storage_reward, STORAGE_REWARD);
    }

    #[test]
    fn test_no_storage_reward_at_threshold() {
        let tx = mock_tx(10);
        assert_eq!(tx.storage_reward, 0);
    }

    #[test]
    fn test_zero_value_rejected_at_build() {
        let (pk, sk) = generate_keypair(&[1u8; 32]);
        let err = Transaction::build(&pk, &sk, [0u8; 32], [2u8; ADDRESS_BYTES], 0).unwrap_err();
        assert_eq!(err, TxError::ZeroValue);
    }

    #[test]
    fn test_hash_mismatch_detected() {
        let mut tx = mock_tx(5);
        tx.value = 999;
        assert_eq!(tx.is_valid().unwrap_err(), TxError::HashMismatch);
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let mut tx = mock_tx(5);
        tx.signature.0[0] ^= 0xFF;
        assert_eq!(tx.is_valid().unwrap_err(), TxError::InvalidSignature);
    }

    #[test]
    fn test_storage_reward_tx_structurally_valid_without_signature() {
        let miner = [9u8; ADDRESS_BYTES];
        let storage = [8u8; ADDRESS_BYTES];
        let tx = Transaction::build_storage_reward(storage, miner, [0u8; 32]);
        assert!(tx.is_structurally_valid_unsigned().is_ok());
        assert!(tx.is_storage_reward(&storage));
    }

    #[test]
    fn test_distinct_nonces_across_builds() {
        let tx1 = mock_tx(5);
        let tx2 = mock_tx(5);
        assert_ne!(tx1.rand_bytes, tx2.rand_bytes);
    }
}
