// The node's view of its own chain: the store plus the one piece of
// chain-state that is legitimately mutable outside of appending a block —
// the currently-required difficulty, which a longer foreign chain can
// cause this node to adopt during fork reconciliation.
//
// The source threaded `&BlockChain` into block methods directly. Here the
// chain instead implements `BalanceOracle` and is handed to block methods
// as a trait object, so block logic never holds a back-reference to its
// chain and can be exercised against a fake oracle in tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::DIFFICULTY;
use crate::consensus::genesis::create_genesis_block;
use crate::crypto::address::ADDRESS_BYTES;
use crate::error::StoreError;
use crate::primitives::{BalanceOracle, Block};
use crate::store::ChainDB;

pub struct ChainView {
    pub store: Arc<ChainDB>,
    difficulty: AtomicU32,
}

impl ChainView {
    pub fn open<P: AsRef<std::path::Path>>(path: P, creator: [u8; ADDRESS_BYTES]) -> Result<Self, StoreError> {
        let store = Arc::new(ChainDB::open(path)?);
        if store.size() == 0 {
            store.append(&create_genesis_block(creator))?;
        }
        Ok(ChainView { store, difficulty: AtomicU32::new(DIFFICULTY) })
    }

    /// Wraps an already-populated store, e.g. the scratch store built up by
    /// fork reconciliation before it replaces the node's current view.
    pub fn from_store(store: Arc<ChainDB>, difficulty: u32) -> Self {
        ChainView { store, difficulty: AtomicU32::new(difficulty) }
    }

    pub fn size(&self) -> u64 {
        self.store.size()
    }

    pub fn last_hash(&self) -> [u8; 32] {
        self.store.last_hash()
    }

    pub fn get_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        self.store.get_by_height(height)
    }

    pub fn lookup_height_by_hash(&self, hash: &[u8; 32]) -> Result<Option<u64>, StoreError> {
        self.store.lookup_height_by_hash(hash)
    }

    pub fn append(&self, block: &Block) -> Result<u64, StoreError> {
        self.store.append(block)
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty.load(Ordering::SeqCst)
    }

    /// Adopts a foreign chain's difficulty during fork reconciliation.
    /// Never a true global — this is a field of this node's current view,
    /// updated under the node mutex by the caller.
    pub fn adopt_difficulty(&self, new_difficulty: u32) {
        self.difficulty.store(new_difficulty, Ordering::SeqCst);
    }
}

impl BalanceOracle for ChainView {
    fn balance(&self, addr: &[u8; ADDRESS_BYTES], upper_height: u64) -> u64 {
        self.store.balance(addr, upper_height)
    }

    fn last_hash(&self) -> [u8; 32] {
        self.store.last_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    static CTR: AtomicU64 = AtomicU64::new(0);

    fn tmp() -> std::path::PathBuf {
        let id = CTR.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("knotchain_chainview_{}_{}", std::process::id(), id));
        let _ = std::fs::remove_dir_all(&path);
        path
    }

    #[test]
    fn test_open_applies_genesis_once() {
        let path = tmp();
        let creator = [2u8; ADDRESS_BYTES];
        let view = ChainView::open(&path, creator).unwrap();
        assert_eq!(view.size(), 1);

        drop(view);
        let reopened = ChainView::open(&path, creator).unwrap();
        assert_eq!(reopened.size(), 1, "reopening must not re-apply genesis");
    }

    #[test]
    fn test_difficulty_starts_at_protocol_constant() {
        let path = tmp();
        let view = ChainView::open(&path, [3u8; ADDRESS_BYTES]).unwrap();
        assert_eq!(view.difficulty(), DIFFICULTY);
        view.adopt_difficulty(10);
        assert_eq!(view.difficulty(), 10);
    }
}
