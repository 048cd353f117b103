#![forbid(unsafe_code)]

//! Component A (`SPEC_FULL.md` §4.A): RSA-2048 keypair generation/persistence
//! and the hybrid RSA-OAEP + AES-256-GCM layer wrap/unwrap primitive.

mod hybrid;
mod keys;

pub use hybrid::{unwrap, wrap, SESSION_KEY_SIZE};
pub use keys::{
    generate_keypair, generate_or_load_keypair, public_key_from_pem, public_key_to_pem, RSA_BITS,
    WRAPPED_KEY_SIZE,
};
pub use onion_types::OnionError as CryptoError;
pub use rsa::{RsaPrivateKey, RsaPublicKey};
