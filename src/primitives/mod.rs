pub mod block;
pub mod oracle;
pub mod transaction;

pub use block::Block;
pub use oracle::BalanceOracle;
pub use transaction::Transaction;
