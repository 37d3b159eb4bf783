// Balance-oracle capability.
//
// Blocks do not hold a reference back to their chain. Instead, the
// add_transaction and validation routines take a capability object that can
// answer two questions: what is an address's balance as of some height, and
// what is the chain's current tip hash. This inverts the dependency the
// source code had (block -> chain) so that block logic can be unit tested
// against a fake oracle with no storage engine involved.

use crate::crypto::address::ADDRESS_BYTES;

pub trait BalanceOracle {
    /// The value of `mapping[addr]` in the highest-numbered block at or
    /// below `upper_height` whose mapping contains `addr`, else 0.
    fn balance(&self, addr: &[u8; ADDRESS_BYTES], upper_height: u64) -> u64;

    /// The current chain tip's hash.
    fn last_hash(&self) -> [u8; 32];
}

/// An in-memory oracle for tests: a fixed set of starting balances with no
/// chain history behind them.
#[cfg(test)]
pub struct FixedOracle {
    pub balances: std::collections::HashMap<[u8; ADDRESS_BYTES], u64>,
    pub last_hash: [u8; 32],
}

#[cfg(test)]
impl BalanceOracle for FixedOracle {
    fn balance(&self, addr: &[u8; ADDRESS_BYTES], _upper_height: u64) -> u64 {
        self.balances.get(addr).copied().unwrap_or(0)
    }

    fn last_hash(&self) -> [u8; 32] {
        self.last_hash
    }
}
