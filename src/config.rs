//! Process-wide constants and deployment settings.
//!
//! Two tiers, deliberately kept apart. The protocol constants below are
//! consensus-critical and compiled in — every node on the network must
//! agree on them, so none of them are environment-overridable.
//! [`NetworkConfig`] is the operational tier: bind address, data directory,
//! peer list path. Those may vary node to node without splitting the
//! network.

/// Required proof-of-work difficulty. Fixed; no retargeting.
pub const DIFFICULTY: u32 = 21;
/// Maximum user transactions per block (the storage-reward tx is additional).
pub const TXS_LIMIT: usize = 2;
/// Length of a transaction's random uniqueness witness.
pub const RAND_BYTES: usize = 32;
/// Threshold above which a transaction owes a storage tribute.
pub const START_PERCENT: u64 = 10;
/// Fixed storage tribute owed by transactions above START_PERCENT, and the
/// miner's reward minted by every `accept`.
pub const STORAGE_REWARD: u64 = 1;
/// Genesis allocation to the reserved storage address.
pub const STORAGE_VALUE: u64 = 100;
/// Genesis allocation to the chain's creator address.
pub const GENESIS_REWARD: u64 = 100;
/// Reserved address that accrues storage tribute.
pub const STORAGE_CHAIN: &str = "STORAGE-CHAIN";
/// Literal hash tag of the genesis block.
pub const GENESIS_BLOCK: &str = "GENESIS-BLOCK";
/// Lower bound of the PoET wait.
pub const MIN_POET_WAIT_SECS: u64 = 1;
/// Upper bound of the PoET wait.
pub const MAX_POET_WAIT_SECS: u64 = 10;
/// Peer transport response timeout.
pub const WAITTIME_SECS: u64 = 1;
/// Maximum accumulated message size before a frame is rejected.
pub const DMAXSIZE: usize = 2 * 1024 * 1024;
/// Read scratch buffer size for the peer transport.
pub const BUFFSIZE: usize = 4 * 1024;
/// 8-byte end-of-message sentinel terminating every wire frame.
pub const ENDBYTES: [u8; 8] = [0x00, 0x05, 0x07, 0x01, 0x01, 0x07, 0x05, 0x00];
/// Separator between fields of an ADD_BLOCK payload.
pub const SEPARATOR: &str = "_SEPARATOR_";

const DEFAULT_P2P_PORT: u16 = 9000;

/// Bind address for P2P — default 0.0.0.0 so peers can dial in.
/// Set KNOTCHAIN_P2P_BIND=127.0.0.1 to disable external connections.
pub const P2P_BIND_ADDRESS_DEFAULT: &str = "0.0.0.0";

/// Data directory name, relative to the resolved home directory.
pub const DATA_DIR: &str = ".knotchain/mainnet";

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub p2p_port: u16,
    pub data_dir: String,
    pub peer_list_path: Option<String>,
}

impl NetworkConfig {
    /// Baseline configuration before environment overrides are applied.
    pub fn mainnet() -> Self {
        let home = resolve_home_dir();
        NetworkConfig {
            p2p_port: DEFAULT_P2P_PORT,
            data_dir: format!("{}/{}", home, DATA_DIR),
            peer_list_path: None,
        }
    }

    pub fn p2p_bind_address(&self) -> String {
        format!("{}:{}", p2p_bind_address(), self.p2p_port)
    }

    /// Applies `KNOTCHAIN_*` environment variable overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("KNOTCHAIN_P2P_PORT") {
            if let Ok(parsed) = port.parse() {
                self.p2p_port = parsed;
            }
        }
        if let Ok(dir) = std::env::var("KNOTCHAIN_DATA_DIR") {
            self.data_dir = dir;
        }
        if let Ok(peers) = std::env::var("KNOTCHAIN_PEER_LIST") {
            self.peer_list_path = Some(peers);
        }
    }
}

pub fn p2p_bind_address() -> String {
    let v = std::env::var("KNOTCHAIN_P2P_BIND").unwrap_or_else(|_| P2P_BIND_ADDRESS_DEFAULT.to_string());
    if v.trim().is_empty() {
        P2P_BIND_ADDRESS_DEFAULT.to_string()
    } else {
        v
    }
}

pub fn default_data_dir() -> std::path::PathBuf {
    std::path::PathBuf::from(resolve_home_dir()).join(DATA_DIR)
}

fn resolve_home_dir() -> String {
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return home;
        }
    }
    #[cfg(windows)]
    {
        if let Ok(home) = std::env::var("USERPROFILE") {
            if !home.trim().is_empty() {
                return home;
            }
        }
        let drive = std::env::var("HOMEDRIVE").unwrap_or_default();
        let path = std::env::var("HOMEPATH").unwrap_or_default();
        if !drive.is_empty() || !path.is_empty() {
            return format!("{drive}{path}");
        }
    }
    ".".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_defaults_to_standard_port() {
        let cfg = NetworkConfig::mainnet();
        assert_eq!(cfg.p2p_port, DEFAULT_P2P_PORT);
        assert!(cfg.data_dir.ends_with(DATA_DIR));
    }

    #[test]
    fn env_override_wins_over_default_port() {
        std::env::set_var("KNOTCHAIN_P2P_PORT", "9100");
        let mut cfg = NetworkConfig::mainnet();
        cfg.apply_env_overrides();
        assert_eq!(cfg.p2p_port, 9100);
        std::env::remove_var("KNOTCHAIN_P2P_PORT");
    }

    #[test]
    fn sentinel_is_eight_bytes() {
        assert_eq!(ENDBYTES.len(), 8);
    }
}
