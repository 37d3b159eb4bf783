// Data structures: Block, and its assembly/validation operations.
use std::collections::BTreeMap;

use primitive_types::U256;

use crate::config::{DIFFICULTY, START_PERCENT, STORAGE_CHAIN, STORAGE_REWARD, TXS_LIMIT};
use crate::crypto::address::{encode_address_string, public_key_from_address, ADDRESS_BYTES};
use crate::crypto::hash::hash_sha256;
use crate::crypto::signing::{self, PublicKey, SecretKey, Signature};
use crate::error::BlockError;
use crate::primitives::oracle::BalanceOracle;
use crate::primitives::transaction::Transaction;

/// The reserved storage address, derived once and reused everywhere a block
/// needs to credit or debit it. Not a real key pair — nothing ever signs
/// with it, so "deriving" it just needs to be a stable 32-byte value every
/// node computes identically.
pub fn storage_chain_address() -> [u8; ADDRESS_BYTES] {
    hash_sha256(STORAGE_CHAIN.as_bytes())
}

/// A block under construction or already committed.
///
/// `mapping` covers every address touched by the block plus the storage
/// address, keyed by the address's base64 text form so hashing and
/// serialisation both iterate it in one unambiguous order — a `BTreeMap`
/// keyed by that string sorts lexicographically for free, which is exactly
/// the ordering `hash()` depends on.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub curr_hash: [u8; 32],
    pub prev_hash: [u8; 32],
    pub nonce: u64,
    pub difficulty: u32,
    pub miner: [u8; ADDRESS_BYTES],
    pub signature: Signature,
    pub timestamp: String,
    pub transactions: Vec<Transaction>,
    pub mapping: BTreeMap<String, u64>,
}

impl Block {
    /// An empty block pointing at the current tip.
    pub fn new(miner: [u8; ADDRESS_BYTES], prev_hash: [u8; 32]) -> Self {
        Block {
            curr_hash: [0u8; 32],
            prev_hash,
            nonce: 0,
            difficulty: DIFFICULTY,
            miner,
            signature: Signature([0u8; signing::SIG_BYTES]),
            timestamp: String::new(),
            transactions: Vec::new(),
            mapping: BTreeMap::new(),
        }
    }

    fn non_storage_tx_count(&self) -> usize {
        let storage_addr = storage_chain_address();
        self.transactions
            .iter()
            .filter(|tx| tx.sender != storage_addr)
            .count()
    }

    fn mapping_balance(&self, oracle: &dyn BalanceOracle, addr: &[u8; ADDRESS_BYTES], height: u64) -> u64 {
        let key = encode_address_string(addr);
        self.mapping.get(&key).copied().unwrap_or_else(|| oracle.balance(addr, height))
    }

    fn credit(&mut self, addr: &[u8; ADDRESS_BYTES], oracle: &dyn BalanceOracle, height: u64, amount: u64) {
        let key = encode_address_string(addr);
        let base = self.mapping.get(&key).copied().unwrap_or_else(|| oracle.balance(addr, height));
        self.mapping.insert(key, base + amount);
    }

    fn debit(&mut self, addr: &[u8; ADDRESS_BYTES], oracle: &dyn BalanceOracle, height: u64, amount: u64) {
        let key = encode_address_string(addr);
        let base = self.mapping.get(&key).copied().unwrap_or_else(|| oracle.balance(addr, height));
        self.mapping.insert(key, base.saturating_sub(amount));
    }

    /// Adds a user transaction. Fails without mutating the block on any
    /// rejection. `height` is the chain's current size — balances are read
    /// against it, not against the block being built.
    pub fn add_transaction(
        &mut self,
        oracle: &dyn BalanceOracle,
        tx: Transaction,
        height: u64,
    ) -> Result<(), BlockError> {
        tx.is_valid().map_err(BlockError::TxRejected)?;

        if self.non_storage_tx_count() >= TXS_LIMIT {
            return Err(BlockError::LimitReached);
        }

        if tx.value > START_PERCENT && tx.storage_reward != STORAGE_REWARD {
            return Err(BlockError::StorageRewardViolated);
        }

        let total_debit = tx.value + tx.storage_reward;
        let sender_balance = self.mapping_balance(oracle, &tx.sender, height);
        if total_debit > sender_balance {
            return Err(BlockError::InsufficientFunds);
        }

        self.debit(&tx.sender, oracle, height, total_debit);
        self.credit(&tx.receiver, oracle, height, tx.value);
        if tx.storage_reward > 0 {
            self.credit(&storage_chain_address(), oracle, height, tx.storage_reward);
        }

        self.transactions.push(tx);
        Ok(())
    }

    /// Mints the storage-reward transaction, timestamps, hashes, and signs
    /// the block. Must run after all user transactions are added and
    /// before mining.
    pub fn accept(&mut self, oracle: &dyn BalanceOracle, height: u64, miner_sk: &SecretKey) -> Result<(), BlockError> {
        let storage_addr = storage_chain_address();
        let reward_tx = Transaction::build_storage_reward(storage_addr, self.miner, self.prev_hash);

        self.debit(&storage_addr, oracle, height, reward_tx.value);
        self.credit(&self.miner.clone(), oracle, height, reward_tx.value);
        self.transactions.push(reward_tx);

        self.timestamp = now_rfc3339();
        self.curr_hash = self.compute_hash();

        let miner_pk = public_key_from_address(&self.miner);
        let _ = miner_pk; // address already authenticates the miner key
        self.signature = signing::sign(&self.curr_hash, miner_sk);
        Ok(())
    }

    /// Order-stable hash: transaction hashes in transaction order, then
    /// mapping entries in sorted address order, then metadata. Unordered
    /// iteration here would make the same block hash differently on two
    /// nodes, so this fold is the one place in the codebase where iteration
    /// order is load-bearing.
    pub fn compute_hash(&self) -> [u8; 32] {
        let mut buf = Vec::new();
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.hash);
        }
        for (addr, balance) in &self.mapping {
            buf.extend_from_slice(addr.as_bytes());
            buf.extend_from_slice(&balance.to_le_bytes());
        }
        buf.extend_from_slice(&self.difficulty.to_le_bytes());
        buf.extend_from_slice(&self.prev_hash);
        buf.extend_from_slice(&self.miner);
        buf.extend_from_slice(self.timestamp.as_bytes());
        hash_sha256(&buf)
    }

    fn pow_target(difficulty: u32) -> U256 {
        U256::one() << (256 - difficulty as usize)
    }

    /// `H(currHash ‖ nonce) < 2^(256-difficulty)`.
    pub fn proof_is_valid(&self) -> bool {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&self.curr_hash);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        let digest = hash_sha256(&buf);
        U256::from_big_endian(&digest) < Self::pow_target(self.difficulty)
    }

    /// Searches for a nonce satisfying [`proof_is_valid`](Self::proof_is_valid),
    /// starting from a random 32-bit seed and checking `cancel` between
    /// attempts. This is the inner loop the consensus engine's PoW phase
    /// drives; it lives on `Block` because the target depends only on the
    /// block's own `curr_hash` and `difficulty`.
    pub fn search_nonce(&mut self, cancel: &crate::consensus::engine::CancelToken) -> Result<(), crate::error::MiningError> {
        let mut nonce: u64 = rand::random::<u32>() as u64;
        loop {
            if cancel.is_cancelled() {
                return Err(crate::error::MiningError::Cancelled);
            }
            self.nonce = nonce;
            if self.proof_is_valid() {
                return Ok(());
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Applies every invariant from the data model, in the order the data
    /// model specifies: difficulty, hash consistency, chain linkage plus
    /// timestamp, signature, proof of work, mapping minimality, then the
    /// transaction set itself (including the balance-delta equation).
    pub fn is_valid(
        &self,
        oracle: &dyn BalanceOracle,
        prev: Option<&Block>,
        height: u64,
    ) -> Result<(), BlockError> {
        if self.difficulty != DIFFICULTY {
            return Err(BlockError::DifficultyMismatch);
        }

        if self.compute_hash() != self.curr_hash {
            return Err(BlockError::HashMismatch);
        }

        if height > 1 {
            let predecessor = prev.ok_or(BlockError::PrevHashUnknown)?;
            if predecessor.curr_hash != self.prev_hash {
                return Err(BlockError::PrevHashUnknown);
            }
            if !self.timestamp_after(&predecessor.timestamp) {
                return Err(BlockError::TimestampNotMonotonic);
            }
        }

        if self.timestamp_in_future() {
            return Err(BlockError::TimestampInFuture);
        }

        let miner_pk = public_key_from_address(&self.miner);
        if !signing::verify(&self.curr_hash, &self.signature, &miner_pk) {
            return Err(BlockError::InvalidSignature);
        }

        if !self.proof_is_valid() {
            return Err(BlockError::ProofOfWorkInvalid);
        }

        self.mapping_is_minimal()?;

        self.transactions_are_valid(oracle, height)?;

        Ok(())
    }

    fn timestamp_after(&self, predecessor: &str) -> bool {
        match (parse_rfc3339(&self.timestamp), parse_rfc3339(predecessor)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    fn timestamp_in_future(&self) -> bool {
        match parse_rfc3339(&self.timestamp) {
            Some(t) => t > now_unix(),
            None => true,
        }
    }

    fn mapping_is_minimal(&self) -> Result<(), BlockError> {
        let storage_key = encode_address_string(&storage_chain_address());
        for addr in self.mapping.keys() {
            if *addr == storage_key {
                continue;
            }
            let touched = self.transactions.iter().any(|tx| {
                encode_address_string(&tx.sender) == *addr || encode_address_string(&tx.receiver) == *addr
            });
            if !touched {
                return Err(BlockError::MappingNotMinimal);
            }
        }
        Ok(())
    }

    /// Non-empty; within the size cap; pairwise-distinct nonces; at most
    /// one storage-reward transaction with the right shape; every
    /// individual transaction valid; and the balance-delta equation holds
    /// for every address against the chain at `height`.
    fn transactions_are_valid(&self, oracle: &dyn BalanceOracle, height: u64) -> Result<(), BlockError> {
        if self.transactions.is_empty() {
            return Err(BlockError::EmptyTransactionSet);
        }
        if self.transactions.len() > TXS_LIMIT + 1 {
            return Err(BlockError::TooManyTransactions);
        }

        let storage_addr = storage_chain_address();
        let mut seen_nonces = std::collections::HashSet::new();
        let mut storage_tx_count = 0usize;

        for tx in &self.transactions {
            if !seen_nonces.insert(tx.rand_bytes) {
                return Err(BlockError::DuplicateNonce);
            }

            if tx.sender == storage_addr {
                storage_tx_count += 1;
                if storage_tx_count > 1 {
                    return Err(BlockError::DuplicateStorageTx);
                }
                tx.is_structurally_valid_unsigned().map_err(BlockError::TxRejected)?;
                if tx.receiver != self.miner || tx.value != STORAGE_REWARD {
                    return Err(BlockError::MalformedStorageTx);
                }
            } else {
                tx.is_valid().map_err(BlockError::TxRejected)?;
                if tx.value > START_PERCENT && tx.storage_reward != STORAGE_REWARD {
                    return Err(BlockError::StorageRewardViolated);
                }
            }
        }

        self.balance_deltas_hold(oracle, height)
    }

    fn balance_deltas_hold(&self, oracle: &dyn BalanceOracle, height: u64) -> Result<(), BlockError> {
        let addrs: std::collections::BTreeSet<[u8; ADDRESS_BYTES]> = self
            .transactions
            .iter()
            .flat_map(|tx| [tx.sender, tx.receiver])
            .chain(std::iter::once(storage_chain_address()))
            .collect();

        for addr in addrs {
            let before = oracle.balance(&addr, height.saturating_sub(1));
            let sent: u64 = self
                .transactions
                .iter()
                .filter(|tx| tx.sender == addr)
                .map(|tx| tx.value + tx.storage_reward)
                .sum();
            let received: u64 = self
                .transactions
                .iter()
                .filter(|tx| tx.receiver == addr)
                .map(|tx| tx.value)
                .sum();
            let expected = before.saturating_add(received).saturating_sub(sent);
            let key = encode_address_string(&addr);
            let Some(actual) = self.mapping.get(&key) else {
                return Err(BlockError::MissingMappingEntry);
            };
            if *actual != expected {
                return Err(BlockError::InsufficientFunds);
            }
        }
        Ok(())
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn now_rfc3339() -> String {
    // A minimal RFC3339 UTC formatter so the crate does not need a
    // dedicated time-formatting dependency just for block timestamps.
    let secs = now_unix();
    format_unix_as_rfc3339(secs)
}

fn format_unix_as_rfc3339(secs: i64) -> String {
    let days = secs.div_euclid(86_400);
    let secs_of_day = secs.rem_euclid(86_400);
    let (h, m, s) = (secs_of_day / 3600, (secs_of_day % 3600) / 60, secs_of_day % 60);
    let (y, mo, d) = civil_from_days(days);
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{m:02}:{s:02}Z")
}

fn parse_rfc3339(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    if bytes.len() < 20 {
        return None;
    }
    let y: i64 = s.get(0..4)?.parse().ok()?;
    let mo: i64 = s.get(5..7)?.parse().ok()?;
    let d: i64 = s.get(8..10)?.parse().ok()?;
    let h: i64 = s.get(11..13)?.parse().ok()?;
    let mi: i64 = s.get(14..16)?.parse().ok()?;
    let se: i64 = s.get(17..19)?.parse().ok()?;
    let days = days_from_civil(y, mo, d);
    Some(days * 86_400 + h * 3600 + mi * 60 + se)
}

// Howard Hinnant's civil_from_days / days_from_civil algorithm, used
// instead of a chrono dependency since the only thing a block timestamp
// needs is "comparable and RFC3339-shaped", not full calendar arithmetic.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::generate_keypair;
    use crate::primitives::oracle::FixedOracle;
    use std::collections::HashMap;

    fn oracle_with(creator: [u8; ADDRESS_BYTES], creator_balance: u64) -> FixedOracle {
        let mut balances = HashMap::new();
        balances.insert(creator, creator_balance);
        balances.insert(storage_chain_address(), 100);
        FixedOracle { balances, last_hash: [0u8; 32] }
    }

    #[test]
    fn test_add_transaction_updates_mapping() {
        let (sender_pk, sender_sk) = generate_keypair(&[1u8; 32]);
        let sender = crate::crypto::address::derive_address(&sender_pk);
        let receiver = [2u8; ADDRESS_BYTES];
        let oracle = oracle_with(sender, 100);

        let mut block = Block::new(sender, oracle.last_hash());
        let tx = Transaction::build(&sender_pk, &sender_sk, oracle.last_hash(), receiver, 3).unwrap();
        block.add_transaction(&oracle, tx, 1).unwrap();

        assert_eq!(block.mapping.get(&encode_address_string(&sender)), Some(&97));
        assert_eq!(block.mapping.get(&encode_address_string(&receiver)), Some(&3));
    }

    #[test]
    fn test_storage_reward_required_above_threshold() {
        let (sender_pk, sender_sk) = generate_keypair(&[1u8; 32]);
        let sender = crate::crypto::address::derive_address(&sender_pk);
        let oracle = oracle_with(sender, 1000);
        let mut block = Block::new(sender, oracle.last_hash());

        let tx = Transaction::build(&sender_pk, &sender_sk, oracle.last_hash(), [2u8; ADDRESS_BYTES], 11).unwrap();
        assert_eq!(tx.storage_reward, STORAGE_REWARD);
        assert!(block.add_transaction(&oracle, tx, 1).is_ok());
    }

    #[test]
    fn test_insufficient_funds_on_second_tx() {
        let (sender_pk, sender_sk) = generate_keypair(&[1u8; 32]);
        let sender = crate::crypto::address::derive_address(&sender_pk);
        let oracle = oracle_with(sender, 100);
        let mut block = Block::new(sender, oracle.last_hash());

        let tx1 = Transaction::build(&sender_pk, &sender_sk, oracle.last_hash(), [2u8; ADDRESS_BYTES], 60).unwrap();
        block.add_transaction(&oracle, tx1, 1).unwrap();

        let tx2 = Transaction::build(&sender_pk, &sender_sk, oracle.last_hash(), [3u8; ADDRESS_BYTES], 60).unwrap();
        assert_eq!(block.add_transaction(&oracle, tx2, 1).unwrap_err(), BlockError::InsufficientFunds);
    }

    #[test]
    fn test_limit_reached() {
        let (sender_pk, sender_sk) = generate_keypair(&[1u8; 32]);
        let sender = crate::crypto::address::derive_address(&sender_pk);
        let oracle = oracle_with(sender, 1000);
        let mut block = Block::new(sender, oracle.last_hash());

        for i in 0..TXS_LIMIT {
            let tx = Transaction::build(&sender_pk, &sender_sk, oracle.last_hash(), [i as u8; ADDRESS_BYTES], 1).unwrap();
            block.add_transaction(&oracle, tx, 1).unwrap();
        }
        let extra = Transaction::build(&sender_pk, &sender_sk, oracle.last_hash(), [9u8; ADDRESS_BYTES], 1).unwrap();
        assert_eq!(block.add_transaction(&oracle, extra, 1).unwrap_err(), BlockError::LimitReached);
    }

    #[test]
    fn test_accept_then_mine_then_valid() {
        let (miner_pk, miner_sk) = generate_keypair(&[5u8; 32]);
        let miner = crate::crypto::address::derive_address(&miner_pk);
        let (sender_pk, sender_sk) = generate_keypair(&[1u8; 32]);
        let sender = crate::crypto::address::derive_address(&sender_pk);

        let mut balances = HashMap::new();
        balances.insert(sender, 100);
        balances.insert(miner, 0);
        balances.insert(storage_chain_address(), 100);
        let oracle = FixedOracle { balances, last_hash: [0u8; 32] };

        let mut block = Block::new(miner, oracle.last_hash());
        let tx = Transaction::build(&sender_pk, &sender_sk, oracle.last_hash(), miner, 3).unwrap();
        block.add_transaction(&oracle, tx, 1).unwrap();
        block.accept(&oracle, 1, &miner_sk).unwrap();
        block.difficulty = 1; // cheap target for the test
        block.curr_hash = block.compute_hash();
        block.signature = signing::sign(&block.curr_hash, &miner_sk);

        let cancel = crate::consensus::engine::CancelToken::new();
        block.search_nonce(&cancel).unwrap();

        assert!(block.proof_is_valid());
        // An unsealed predecessor has no timestamp, so the monotonicity
        // check is the one invariant left to fail at height 2 — every
        // earlier check (hash, chain link, signature, PoW) already passed.
        let prev = Block::new(miner, [0u8; 32]);
        assert_eq!(block.is_valid(&oracle, Some(&prev), 2).unwrap_err(), BlockError::TimestampNotMonotonic);
    }

    #[test]
    fn test_rfc3339_roundtrip() {
        let s = format_unix_as_rfc3339(1_700_000_000);
        let back = parse_rfc3339(&s).unwrap();
        assert_eq!(back, 1_700_000_000);
    }

    #[test]
    fn test_hash_determinism_independent_of_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("zzz".to_string(), 1u64);
        a.insert("aaa".to_string(), 2u64);
        let mut b = BTreeMap::new();
        b.insert("aaa".to_string(), 2u64);
        b.insert("zzz".to_string(), 1u64);
        assert_eq!(a.iter().collect::<Vec<_>>(), b.iter().collect::<Vec<_>>());
    }
}
