use onion_types::{OnionError, OnionResult};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::Path;
use tracing::{debug, info};

/// Modulus size for the hop keypair (§3): 2048 bits, 256-byte wrapped key.
pub const RSA_BITS: usize = 2048;
pub const WRAPPED_KEY_SIZE: usize = RSA_BITS / 8;

/// Generate a fresh 2048-bit RSA keypair. Called once at hop startup (§4.A).
pub fn generate_keypair() -> OnionResult<(RsaPublicKey, RsaPrivateKey)> {
    let private = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
        .map_err(|e| OnionError::Crypto(format!("RSA key generation failed: {e}")))?;
    let public = RsaPublicKey::from(&private);
    Ok((public, private))
}

pub fn public_key_to_pem(public: &RsaPublicKey) -> OnionResult<String> {
    public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| OnionError::Crypto(format!("failed to encode public key: {e}")))
}

pub fn public_key_from_pem(pem: &str) -> OnionResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| OnionError::Crypto(format!("malformed peer public key: {e}")))
}

fn private_key_to_pem(private: &RsaPrivateKey) -> OnionResult<rsa::pkcs8::zeroize::Zeroizing<String>> {
    private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| OnionError::Crypto(format!("failed to encode private key: {e}")))
}

/// Generate a fresh keypair and persist it as `public.pem`/`private.pem`
/// under `data_dir`, or load an existing pair if one is already there. This
/// is what makes `GET /get-public-key` idempotent across a same-circuit
/// restart without ever regenerating the key (§4.A, §9).
pub fn generate_or_load_keypair(data_dir: &Path) -> OnionResult<(RsaPublicKey, RsaPrivateKey)> {
    let public_path = data_dir.join("public.pem");
    let private_path = data_dir.join("private.pem");

    if private_path.exists() && public_path.exists() {
        debug!(path = %private_path.display(), "loading existing hop keypair");
        let private = RsaPrivateKey::read_pkcs8_pem_file(&private_path)
            .map_err(|e| OnionError::Crypto(format!("failed to load private key: {e}")))?;
        let public = RsaPublicKey::from(&private);
        return Ok((public, private));
    }

    std::fs::create_dir_all(data_dir)
        .map_err(|e| OnionError::Config(format!("failed to create data dir: {e}")))?;

    let (public, private) = generate_keypair()?;

    let private_pem = private_key_to_pem(&private)?;
    write_private_key_file(&private_path, private_pem.as_bytes())?;

    let public_pem = public_key_to_pem(&public)?;
    std::fs::write(&public_path, public_pem)
        .map_err(|e| OnionError::Config(format!("failed to write public key: {e}")))?;

    info!(path = %private_path.display(), "generated and persisted new hop keypair");
    Ok((public, private))
}

#[cfg(unix)]
fn write_private_key_file(path: &Path, pem_bytes: &[u8]) -> OnionResult<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| OnionError::Config(format!("failed to write private key: {e}")))?;
    use std::io::Write;
    file.write_all(pem_bytes)
        .map_err(|e| OnionError::Config(format!("failed to write private key: {e}")))
}

#[cfg(not(unix))]
fn write_private_key_file(path: &Path, pem_bytes: &[u8]) -> OnionResult<()> {
    std::fs::write(path, pem_bytes)
        .map_err(|e| OnionError::Config(format!("failed to write private key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_round_trip() {
        let (public, _private) = generate_keypair().unwrap();
        let pem = public_key_to_pem(&public).unwrap();
        let parsed = public_key_from_pem(&pem).unwrap();
        assert_eq!(public, parsed);
    }

    #[test]
    fn rejects_malformed_pem() {
        assert!(public_key_from_pem("not a pem").is_err());
    }

    #[test]
    fn load_recovers_same_key_across_calls() {
        let dir = tempdir();
        let (pub1, _priv1) = generate_or_load_keypair(&dir).unwrap();
        let (pub2, _priv2) = generate_or_load_keypair(&dir).unwrap();
        assert_eq!(pub1, pub2);
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("onion-crypto-test-{}", rand::random::<u64>()));
        dir
    }
}
