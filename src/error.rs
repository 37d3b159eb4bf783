//! Crate-wide error taxonomy.
//!
//! Each layer owns its own error enum rather than funnelling everything
//! through one flat type — storage errors are not domain errors are not
//! transport errors, and callers need to match on the kind that actually
//! occurred. [`NodeError`] is the orchestration-level umbrella that `?`
//! chains through, via `#[from]` conversions, to cross component
//! boundaries without manual mapping at every call site.

use thiserror::Error;

/// Errors from transaction construction and structural validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction has no sender")]
    NullSender,
    #[error("transaction value is zero")]
    ZeroValue,
    #[error("transaction hash does not match its contents")]
    HashMismatch,
    #[error("transaction signature does not verify")]
    InvalidSignature,
}

/// Errors from block assembly and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("transaction rejected: {0}")]
    TxRejected(#[from] TxError),
    #[error("block already holds the maximum number of transactions")]
    LimitReached,
    #[error("value exceeds START_PERCENT but storage reward was not applied")]
    StorageRewardViolated,
    #[error("sender balance insufficient for value plus storage reward")]
    InsufficientFunds,
    #[error("mapping omits an address touched by the block's transactions")]
    MissingMappingEntry,
    #[error("block difficulty does not match the required difficulty")]
    DifficultyMismatch,
    #[error("recomputed block hash does not match the stored hash")]
    HashMismatch,
    #[error("previous hash does not resolve to the preceding height")]
    PrevHashUnknown,
    #[error("miner signature does not verify")]
    InvalidSignature,
    #[error("proof of work does not satisfy the difficulty target")]
    ProofOfWorkInvalid,
    #[error("block mapping is not minimal: an address appears with no corresponding transaction")]
    MappingNotMinimal,
    #[error("block timestamp is not strictly greater than its predecessor's")]
    TimestampNotMonotonic,
    #[error("block timestamp lies in the future")]
    TimestampInFuture,
    #[error("block has no transactions")]
    EmptyTransactionSet,
    #[error("block exceeds the transaction count limit")]
    TooManyTransactions,
    #[error("two transactions in the block share a random nonce")]
    DuplicateNonce,
    #[error("block contains more than one storage-reward transaction")]
    DuplicateStorageTx,
    #[error("storage-reward transaction is malformed")]
    MalformedStorageTx,
}

/// Errors from the block store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage engine error: {0}")]
    Io(#[from] rocksdb::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no block at the requested height")]
    HeightNotFound,
    #[error("no block with the requested hash")]
    HashNotFound,
    #[error("store is corrupt")]
    Corrupt,
}

/// Errors from the consensus engine.
///
/// Cancellation is the only variant because it is not a fault — it is the
/// signal under which the caller discards a partially sealed candidate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MiningError {
    #[error("mining attempt was cancelled")]
    Cancelled,
}

/// Errors from the peer transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not connect to peer")]
    Dial,
    #[error("peer did not reply within the response timeout")]
    Timeout,
    #[error("message exceeds the maximum wire size")]
    OversizedMessage,
    #[error("malformed JSON on the wire")]
    MalformedJson(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal startup configuration errors. The daemon binary maps these to
/// process exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("incompatible combination of command-line flags")]
    BadCliCombination,
    #[error("wallet file could not be read: {0}")]
    UnreadableWallet(String),
    #[error("peer list file is missing or unreadable")]
    MissingPeerList,
}

/// Top-level orchestration error. A single `?`-chain crosses component
/// boundaries through this type.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mining(#[from] MiningError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
