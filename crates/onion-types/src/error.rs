use thiserror::Error;

/// The crate-wide error taxonomy for the onion overlay (see `SPEC_FULL.md` §7).
#[derive(Error, Debug)]
pub enum OnionError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("frame error: {0}")]
    Frame(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    #[error("notify transport error: {0}")]
    NotifyTransport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type OnionResult<T> = Result<T, OnionError>;
