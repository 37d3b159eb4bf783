pub mod chain;
pub mod engine;
pub mod genesis;

pub use chain::ChainView;
pub use engine::{CancelToken, SleepFlag, SleepState};
