//! Mempool: a concurrent-safe pool of unconfirmed transactions.
//!
//! Deliberately simple — a hash map from transaction hash to transaction
//! behind a reader-writer lock, with no fee-priority ordering, no
//! replace-by-fee, and no size-based eviction. Concurrency model:
//! multi-reader / single-writer, with `take` atomic (the caller owns
//! whatever it returns; nobody else can take the same transactions twice).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::primitives::Transaction;

pub struct MemPool {
    entries: RwLock<HashMap<[u8; 32], Transaction>>,
}

impl MemPool {
    pub fn new() -> Self {
        MemPool { entries: RwLock::new(HashMap::new()) }
    }

    /// Idempotent by `tx.hash` — adding the same transaction twice leaves
    /// the pool's size unchanged.
    pub fn add(&self, tx: Transaction) {
        let mut guard = self.entries.write().expect("mempool lock poisoned");
        let hash = tx.hash;
        if guard.entry(tx.hash).or_insert(tx).hash == hash {
            log::debug!("mempool admitted tx {}", hex::encode(hash));
        }
    }

    pub fn get_by_id(&self, hash: &[u8; 32]) -> Option<Transaction> {
        self.entries.read().expect("mempool lock poisoned").get(hash).cloned()
    }

    /// Returns up to `n` transactions and removes them atomically — no
    /// other caller can observe or take the same entries.
    pub fn take(&self, n: usize) -> Vec<Transaction> {
        let mut guard = self.entries.write().expect("mempool lock poisoned");
        let keys: Vec<[u8; 32]> = guard.keys().take(n).copied().collect();
        keys.into_iter().filter_map(|k| guard.remove(&k)).collect()
    }

    /// Returns up to `n` transactions without removing them.
    pub fn peek(&self, n: usize) -> Vec<Transaction> {
        self.entries
            .read()
            .expect("mempool lock poisoned")
            .values()
            .take(n)
            .cloned()
            .collect()
    }

    pub fn delete_by_id(&self, hash: &[u8; 32]) {
        self.entries.write().expect("mempool lock poisoned").remove(hash);
    }

    pub fn size(&self) -> usize {
        self.entries.read().expect("mempool lock poisoned").len()
    }

    /// Rewrites pooled transactions to anchor on `new_prev_hash` when the
    /// tip advances. A transaction's hash covers `prevBlockHash`, so a
    /// rewritten transaction would fail its own `is_valid` unless re-signed
    /// — and the mempool does not hold signing keys. Per the open question
    /// this leaves unresolved upstream, this does not attempt to silently
    /// "fix" the hash: anchored-to-a-stale-tip transactions are simply
    /// dropped, and the caller is expected to resubmit.
    pub fn update_for_new_tip(&self, new_prev_hash: [u8; 32]) {
        let mut guard = self.entries.write().expect("mempool lock poisoned");
        let before = guard.len();
        guard.retain(|_, tx| tx.prev_block_hash == new_prev_hash);
        let dropped = before - guard.len();
        if dropped > 0 {
            log::warn!("dropped {} mempool tx(es) anchored to a stale tip", dropped);
        }
    }
}

impl Default for MemPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::generate_keypair;

    fn mock_tx(seed: u8, prev: [u8; 32]) -> Transaction {
        let (pk, sk) = generate_keypair(&[seed; 32]);
        Transaction::build(&pk, &sk, prev, [9u8; 32], 5).unwrap()
    }

    #[test]
    fn test_add_is_idempotent() {
        let pool = MemPool::new();
        let tx = mock_tx(1, [0u8; 32]);
        pool.add(tx.clone());
        pool.add(tx.clone());
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.get_by_id(&tx.hash).unwrap().hash, tx.hash);
    }

    #[test]
    fn test_take_removes_atomically() {
        let pool = MemPool::new();
        for i in 0..5 {
            pool.add(mock_tx(i, [0u8; 32]));
        }
        let taken = pool.take(3);
        assert_eq!(taken.len(), 3);
        assert_eq!(pool.size(), 2);
        for tx in &taken {
            assert!(pool.get_by_id(&tx.hash).is_none());
        }
    }

    #[test]
    fn test_peek_does_not_remove() {
        let pool = MemPool::new();
        pool.add(mock_tx(1, [0u8; 32]));
        let peeked = pool.peek(10);
        assert_eq!(peeked.len(), 1);
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_delete_by_id() {
        let pool = MemPool::new();
        let tx = mock_tx(1, [0u8; 32]);
        pool.add(tx.clone());
        pool.delete_by_id(&tx.hash);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_update_for_new_tip_drops_stale_anchors() {
        let pool = MemPool::new();
        let old_prev = [1u8; 32];
        let new_prev = [2u8; 32];
        pool.add(mock_tx(1, old_prev));
        pool.add(mock_tx(2, new_prev));

        pool.update_for_new_tip(new_prev);
        assert_eq!(pool.size(), 1);
    }
}
