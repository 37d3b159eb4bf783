// Consensus engine: PoET wait followed by an optional PoW search, with a
// single cooperative cancellation signal shared by both phases.
//
// The source this is modelled on used a boolean channel callers had to
// remember to send to exactly once, or risk deadlocking a miner that never
// reads it. `CancelToken` makes cancellation idempotent instead: sending
// twice, or to nobody waiting, is always a safe no-op, and any number of
// clones may observe the same cancellation.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;
use tokio::time::sleep;

use crate::config::{MAX_POET_WAIT_SECS, MIN_POET_WAIT_SECS};
use crate::error::MiningError;
use crate::primitives::Block;

/// A single-slot, idempotent cancellation signal.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Idempotent: cancelling a token that is not being waited on, or
    /// cancelling one twice, does nothing beyond setting the flag.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled, otherwise waits.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether this node is currently engaged in the PoET wait. Modelled as a
/// single atomic enum with compare-and-set transitions rather than the
/// brittle two-slot signalling it replaces — the wake-up wire handler reads
/// it directly with no separate coordination channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SleepState {
    Awake = 0,
    Sleeping = 1,
}

pub struct SleepFlag(AtomicU8);

impl SleepFlag {
    pub fn new() -> Self {
        SleepFlag(AtomicU8::new(SleepState::Awake as u8))
    }

    pub fn get(&self) -> SleepState {
        match self.0.load(Ordering::SeqCst) {
            1 => SleepState::Sleeping,
            _ => SleepState::Awake,
        }
    }

    pub fn set(&self, state: SleepState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

impl Default for SleepFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks a PoET wait duration uniformly at random in
/// `[MIN_POET_WAIT, MAX_POET_WAIT]` and suspends cooperatively until it
/// elapses or `cancel` fires.
pub async fn poet_wait(cancel: &CancelToken) -> Result<Duration, MiningError> {
    let secs = rand::thread_rng().gen_range(MIN_POET_WAIT_SECS..=MAX_POET_WAIT_SECS);
    let duration = Duration::from_secs(secs);
    log::debug!("poet wait chosen: {}s", secs);

    tokio::select! {
        _ = sleep(duration) => Ok(duration),
        _ = cancel.cancelled() => Err(MiningError::Cancelled),
    }
}

/// Outcome of a sealing attempt: whether the PoW grind actually ran.
pub struct SealOutcome {
    pub ran_pow: bool,
}

/// Seals `block` in place. The PoET wait always happens and its duration
/// becomes the block's nonce; the PoW grind additionally runs — replacing
/// that nonce with one that satisfies the difficulty target — only when
/// `awake_count` clears `quorum`. A solo node with no peers to ask, or a
/// node whose peers are themselves asleep, seals with the PoET nonce alone.
pub async fn seal_block(
    block: &mut Block,
    cancel: &CancelToken,
    awake_count: usize,
    quorum: usize,
) -> Result<SealOutcome, MiningError> {
    let wait = poet_wait(cancel).await?;
    block.nonce = wait.as_secs();

    if awake_count > quorum {
        log::debug!("pow quorum met: awake={} quorum={}, grinding nonce", awake_count, quorum);
        block.search_nonce(cancel)?;
        Ok(SealOutcome { ran_pow: true })
    } else {
        log::debug!("pow quorum not met: awake={} quorum={}, sealing with poet nonce", awake_count, quorum);
        Ok(SealOutcome { ran_pow: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_set() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() must not block once already cancelled");
    }

    #[tokio::test]
    async fn poet_wait_honours_cancellation() {
        let token = CancelToken::new();
        let t2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            t2.cancel();
        });
        let result = poet_wait(&token).await;
        assert_eq!(result.unwrap_err(), MiningError::Cancelled);
    }

    #[test]
    fn sleep_flag_defaults_to_awake() {
        let flag = SleepFlag::new();
        assert_eq!(flag.get(), SleepState::Awake);
        flag.set(SleepState::Sleeping);
        assert_eq!(flag.get(), SleepState::Sleeping);
    }
}
