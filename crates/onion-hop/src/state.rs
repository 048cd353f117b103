use crate::config::HopConfig;
use onion_crypto::{RsaPrivateKey, RsaPublicKey};
use onion_types::OnionResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-local state for one hop (§4.C). The private key never leaves this
/// struct; it is read-only after generation.
pub struct HopState {
    pub config: HopConfig,
    pub public_key: RsaPublicKey,
    private_key: RsaPrivateKey,
    pub public_key_pem: String,
    pub originator_public_key: RsaPublicKey,
    pub http_client: reqwest::Client,
    pub started_at: Instant,
    request_count: AtomicU64,
}

impl HopState {
    pub fn new(config: HopConfig) -> OnionResult<Self> {
        let (public_key, private_key) = onion_crypto::generate_or_load_keypair(&config.data_dir)?;
        let public_key_pem = onion_crypto::public_key_to_pem(&public_key)?;
        let originator_public_key =
            onion_crypto::public_key_from_pem(&config.originator_public_key_pem)?;

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build hop HTTP client");

        Ok(Self {
            config,
            public_key,
            private_key,
            public_key_pem,
            originator_public_key,
            http_client,
            started_at: Instant::now(),
            request_count: AtomicU64::new(0),
        })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn record_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}
