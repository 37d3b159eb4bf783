pub mod file;

pub use file::{create, load, save, WalletFileError, WALLET_FILE_NAME};
