// Wallet file management.
//
// Unencrypted by design: `wallet.dat` is a JSON object holding the PEM
// encoding of both halves of an Ed25519 key pair. There is no passphrase,
// no KDF, no at-rest encryption — the security boundary here is the
// filesystem, not the format. A PEM block is just a label plus standard
// base64, so this is a thin struct over the `pem` crate's encoder.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::signing::{PublicKey, SecretKey, PUBKEY_BYTES, SECKEY_BYTES};

pub const WALLET_FILE_NAME: &str = "wallet.dat";

const PUBLIC_PEM_LABEL: &str = "KNOTCHAIN PUBLIC KEY";
const PRIVATE_PEM_LABEL: &str = "KNOTCHAIN PRIVATE KEY";

#[derive(Debug, thiserror::Error)]
pub enum WalletFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("malformed PEM block: {0}")]
    Pem(#[from] pem::PemError),
    #[error("PEM block has the wrong key length")]
    WrongLength,
    #[error("wallet file not found")]
    NotFound,
}

#[derive(Serialize, Deserialize)]
struct WalletFile {
    #[serde(rename = "Public")]
    public: String,
    #[serde(rename = "Private")]
    private: String,
}

/// Generates a fresh Ed25519 key pair from OS randomness and writes it to
/// `<dir>/wallet.dat` as unencrypted PEM-wrapped JSON.
pub fn create<P: AsRef<Path>>(dir: P) -> Result<(PublicKey, SecretKey), WalletFileError> {
    let (pk, sk) = crate::crypto::signing::generate_random_keypair();
    save(&dir, &pk, &sk)?;
    Ok((pk, sk))
}

/// Writes `pk`/`sk` to `<dir>/wallet.dat`, overwriting any existing file.
pub fn save<P: AsRef<Path>>(dir: P, pk: &PublicKey, sk: &SecretKey) -> Result<(), WalletFileError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let public = pem::encode(&pem::Pem::new(PUBLIC_PEM_LABEL, pk.0.to_vec()));
    let private = pem::encode(&pem::Pem::new(PRIVATE_PEM_LABEL, sk.0.to_vec()));

    let file = WalletFile { public, private };
    let json = serde_json::to_string_pretty(&file)?;
    fs::write(dir.join(WALLET_FILE_NAME), json)?;
    Ok(())
}

/// Reads `<dir>/wallet.dat` and PEM-decodes both halves of the key pair.
pub fn load<P: AsRef<Path>>(dir: P) -> Result<(PublicKey, SecretKey), WalletFileError> {
    let path = dir.as_ref().join(WALLET_FILE_NAME);
    if !path.exists() {
        return Err(WalletFileError::NotFound);
    }
    let json = fs::read_to_string(path)?;
    let file: WalletFile = serde_json::from_str(&json)?;

    let pk_pem = pem::parse(&file.public)?;
    let sk_pem = pem::parse(&file.private)?;

    if pk_pem.contents().len() != PUBKEY_BYTES || sk_pem.contents().len() != SECKEY_BYTES {
        return Err(WalletFileError::WrongLength);
    }

    let mut pk_bytes = [0u8; PUBKEY_BYTES];
    pk_bytes.copy_from_slice(pk_pem.contents());
    let mut sk_bytes = [0u8; SECKEY_BYTES];
    sk_bytes.copy_from_slice(sk_pem.contents());

    Ok((PublicKey(pk_bytes), SecretKey(sk_bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_then_load_roundtrips_keys() {
        let dir = tempdir().unwrap();
        let (pk, sk) = create(dir.path()).unwrap();

        let (loaded_pk, loaded_sk) = load(dir.path()).unwrap();
        assert_eq!(pk.0, loaded_pk.0);
        assert_eq!(sk.0, loaded_sk.0);
    }

    #[test]
    fn test_wallet_file_is_unencrypted_pem_json() {
        let dir = tempdir().unwrap();
        create(dir.path()).unwrap();

        let raw = fs::read_to_string(dir.path().join(WALLET_FILE_NAME)).unwrap();
        assert!(raw.contains("\"Public\""));
        assert!(raw.contains("\"Private\""));
        assert!(raw.contains("BEGIN KNOTCHAIN PUBLIC KEY"));
        assert!(raw.contains("BEGIN KNOTCHAIN PRIVATE KEY"));
    }

    #[test]
    fn test_load_missing_wallet_is_not_found() {
        let dir = tempdir().unwrap();
        assert!(matches!(load(dir.path()), Err(WalletFileError::NotFound)));
    }
}
