//! Append-only block store.
//!
//! Backed by an embedded column-family key-value engine, the same engine
//! family this codebase has always used for on-disk state. Three column
//! families: height -> serialised block, hash -> height (for
//! `lookup_height_by_hash`), and a single-key metadata CF holding the
//! current tip so `last_hash`/`size` are O(1) instead of a scan. All three
//! are updated in one atomic write batch per `append`, so a crash never
//! leaves the index out of sync with the block body.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};

use crate::crypto::address::ADDRESS_BYTES;
use crate::error::StoreError;
use crate::primitives::{BalanceOracle, Block};

const CF_BLOCKS: &str = "blocks";
const CF_HASH_INDEX: &str = "hash_index";
const CF_META: &str = "meta";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// An append-only, height-indexed store of committed blocks.
pub struct ChainDB {
    db: DB,
    // Cached so `size()`/`last_hash()` never need to touch the engine on
    // the hot orchestrator path; refreshed on every successful append.
    tip_height: AtomicU64,
}

impl ChainDB {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let cf_opts = Options::default();
        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_HASH_INDEX, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_META, cf_opts),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cfs)?;

        let tip_height = match db.get_cf(db.cf_handle(CF_META).unwrap(), KEY_TIP_HEIGHT)? {
            Some(bytes) if bytes.len() == 8 => u64::from_be_bytes(bytes.try_into().unwrap()),
            _ => 0,
        };

        Ok(ChainDB { db, tip_height: AtomicU64::new(tip_height) })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db.cf_handle(name).ok_or(StoreError::Corrupt)
    }

    /// Appends `block` at `size() + 1`. Writes the block body, the
    /// hash->height index, and the tip metadata in one atomic batch.
    pub fn append(&self, block: &Block) -> Result<u64, StoreError> {
        let height = self.tip_height.load(Ordering::SeqCst) + 1;
        let serialized = serde_json::to_vec(block)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_BLOCKS)?, height_key(height), &serialized);
        batch.put_cf(self.cf(CF_HASH_INDEX)?, block.curr_hash, height_key(height));
        batch.put_cf(self.cf(CF_META)?, KEY_TIP_HEIGHT, height.to_be_bytes());
        batch.put_cf(self.cf(CF_META)?, KEY_TIP_HASH, block.curr_hash);

        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(batch, &write_opts)?;

        self.tip_height.store(height, Ordering::SeqCst);
        log::info!(
            "block committed: height={} hash={} miner={} txs={}",
            height,
            hex::encode(block.curr_hash),
            hex::encode(block.miner),
            block.transactions.len()
        );
        Ok(height)
    }

    pub fn get_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        match self.db.get_cf(self.cf(CF_BLOCKS)?, height_key(height))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn lookup_height_by_hash(&self, hash: &[u8; 32]) -> Result<Option<u64>, StoreError> {
        match self.db.get_cf(self.cf(CF_HASH_INDEX)?, hash)? {
            Some(bytes) if bytes.len() == 8 => Ok(Some(u64::from_be_bytes(bytes.try_into().unwrap()))),
            _ => Ok(None),
        }
    }

    pub fn size(&self) -> u64 {
        self.tip_height.load(Ordering::SeqCst)
    }

    pub fn last_hash(&self) -> [u8; 32] {
        match self.db.get_cf(self.cf(CF_META).expect("meta cf always opened"), KEY_TIP_HASH) {
            Ok(Some(bytes)) if bytes.len() == 32 => {
                let mut h = [0u8; 32];
                h.copy_from_slice(&bytes);
                h
            }
            _ => [0u8; 32],
        }
    }

    /// Scans from `upper_height` down to 1 and returns `mapping[addr]` of
    /// the first block whose mapping contains it, else 0. This is the
    /// *only* way balance is computed — there is no running ledger kept
    /// alongside the blocks.
    pub fn balance(&self, addr: &[u8; ADDRESS_BYTES], upper_height: u64) -> u64 {
        let key = crate::crypto::address::encode_address_string(addr);
        let mut h = upper_height;
        while h >= 1 {
            if let Ok(Some(block)) = self.get_by_height(h) {
                if let Some(bal) = block.mapping.get(&key) {
                    return *bal;
                }
            }
            h -= 1;
        }
        0
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl BalanceOracle for ChainDB {
    fn balance(&self, addr: &[u8; ADDRESS_BYTES], upper_height: u64) -> u64 {
        ChainDB::balance(self, addr, upper_height)
    }

    fn last_hash(&self) -> [u8; 32] {
        ChainDB::last_hash(self)
    }
}

/// Shared handle used by the orchestrator and the fork-reconciliation
/// worker, which is the only code permitted to replace the underlying
/// store file.
pub type SharedChainDB = Arc<ChainDB>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::genesis::create_genesis_block;
    use std::sync::atomic::AtomicU64 as TestCtr;

    static CTR: TestCtr = TestCtr::new(0);

    fn tmp() -> std::path::PathBuf {
        let id = CTR.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("knotchain_store_{}_{}", std::process::id(), id));
        let _ = std::fs::remove_dir_all(&path);
        path
    }

    #[test]
    fn test_append_and_read_back() {
        let path = tmp();
        let db = ChainDB::open(&path).unwrap();
        let creator = [7u8; ADDRESS_BYTES];
        let genesis = create_genesis_block(creator);

        let height = db.append(&genesis).unwrap();
        assert_eq!(height, 1);
        assert_eq!(db.size(), 1);
        assert_eq!(db.last_hash(), genesis.curr_hash);

        let fetched = db.get_by_height(1).unwrap().unwrap();
        assert_eq!(fetched.curr_hash, genesis.curr_hash);
    }

    #[test]
    fn test_hash_index_lookup() {
        let path = tmp();
        let db = ChainDB::open(&path).unwrap();
        let genesis = create_genesis_block([1u8; ADDRESS_BYTES]);
        db.append(&genesis).unwrap();

        assert_eq!(db.lookup_height_by_hash(&genesis.curr_hash).unwrap(), Some(1));
        assert_eq!(db.lookup_height_by_hash(&[0xAAu8; 32]).unwrap(), None);
    }

    #[test]
    fn test_balance_scans_newest_first() {
        let path = tmp();
        let db = ChainDB::open(&path).unwrap();
        let creator = [3u8; ADDRESS_BYTES];
        let genesis = create_genesis_block(creator);
        db.append(&genesis).unwrap();

        let bal = BalanceOracle::balance(&db, &creator, db.size());
        assert_eq!(bal, crate::config::GENESIS_REWARD);

        let unknown_bal = BalanceOracle::balance(&db, &[0xEEu8; ADDRESS_BYTES], db.size());
        assert_eq!(unknown_bal, 0);
    }
}
