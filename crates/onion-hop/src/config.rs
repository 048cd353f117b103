use onion_types::{OnionError, OnionResult};
use std::path::PathBuf;

/// Startup inputs to a hop (`SPEC_FULL.md` §4.C), read exhaustively from the
/// environment; a hop is a short-lived, fully-parameterized process with no
/// file-based configuration of its own.
#[derive(Clone, Debug)]
pub struct HopConfig {
    pub port: u16,
    pub directory_node: String,
    pub this_node: String,
    pub tracking_id: String,
    pub originator_public_key_pem: String,
    pub data_dir: PathBuf,
}

impl HopConfig {
    pub fn from_env() -> OnionResult<Self> {
        let port = env_var("PORT")?
            .parse::<u16>()
            .map_err(|e| OnionError::Config(format!("PORT must be a u16: {e}")))?;

        let directory_node = env_var("DIRECTORY_NODE")?;
        let this_node = env_var("THIS_NODE")?;
        let tracking_id = env_var("TRACKING_ID")?;
        let originator_public_key_pem = env_var("PUBLIC_KEY")?;

        let data_dir = std::env::var("ONION_HOP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir(&this_node));

        let config = Self {
            port,
            directory_node,
            this_node,
            tracking_id,
            originator_public_key_pem,
            data_dir,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OnionResult<()> {
        if self.port == 0 {
            return Err(OnionError::Config("PORT must be nonzero".into()));
        }
        if self.directory_node.is_empty() || self.this_node.is_empty() {
            return Err(OnionError::Config(
                "DIRECTORY_NODE and THIS_NODE must be non-empty URLs".into(),
            ));
        }
        if self.tracking_id.len() != 32 || !self.tracking_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(OnionError::Config(
                "TRACKING_ID must be 32 hex characters".into(),
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> OnionResult<String> {
    std::env::var(name).map_err(|_| OnionError::Config(format!("missing required env var {name}")))
}

fn default_data_dir(this_node: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let slug: String = this_node
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    dir.push(format!("onion-hop-{slug}"));
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_port() {
        let config = HopConfig {
            port: 0,
            directory_node: "https://directory.example".into(),
            this_node: "https://node-001.example".into(),
            tracking_id: "a".repeat(32),
            originator_public_key_pem: "pem".into(),
            data_dir: PathBuf::from("/tmp/x"),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_tracking_id() {
        let config = HopConfig {
            port: 9000,
            directory_node: "https://directory.example".into(),
            this_node: "https://node-001.example".into(),
            tracking_id: "not-hex".into(),
            originator_public_key_pem: "pem".into(),
            data_dir: PathBuf::from("/tmp/x"),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        let config = HopConfig {
            port: 9000,
            directory_node: "https://directory.example".into(),
            this_node: "https://node-001.example".into(),
            tracking_id: "0".repeat(32),
            originator_public_key_pem: "pem".into(),
            data_dir: PathBuf::from("/tmp/x"),
        };
        assert!(config.validate().is_ok());
    }
}
