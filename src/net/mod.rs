pub mod protocol;
pub mod transport;

pub use protocol::{Opcode, Packet};

