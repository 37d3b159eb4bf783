pub mod address;
pub mod hash;
pub mod signing;

pub use address::{derive_address, ADDRESS_BYTES};
pub use hash::hash_sha256;
