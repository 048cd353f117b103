use onion_types::{LoggingConfig, NodeId, OnionError, OnionResult};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Controller startup configuration (§4.D). Loadable from a TOML file with an
/// environment-variable overlay, the same `NodeConfig::load` shape this stack
/// uses for its daemon.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub node_url_template: String,
    pub hop_binary_path: PathBuf,
    #[serde(with = "duration_secs")]
    pub check_poll_interval: Duration,
    #[serde(with = "duration_secs")]
    pub check_timeout: Duration,
    pub id_range_low: u32,
    pub id_range_high: u32,
    pub logging: LoggingConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([127, 0, 0, 1]),
            port: 8800,
            node_url_template: "https://directory.example.org".into(),
            hop_binary_path: PathBuf::from("onion-hop"),
            check_poll_interval: Duration::from_millis(50),
            check_timeout: Duration::from_secs(1),
            id_range_low: 1,
            id_range_high: 99,
            logging: LoggingConfig::default(),
        }
    }
}

impl DirectoryConfig {
    pub fn load(path: impl AsRef<std::path::Path>) -> OnionResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| OnionError::Config(format!("failed to read config: {e}")))?;
            toml::from_str(&contents)
                .map_err(|e| OnionError::Config(format!("failed to parse config: {e}")))?
        } else {
            info!("config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("ONION_DIRECTORY_BIND") {
            if let Ok(addr) = bind.parse() {
                self.bind_address = addr;
            }
        }
        if let Ok(port) = std::env::var("ONION_DIRECTORY_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }
        if let Ok(url) = std::env::var("ONION_DIRECTORY_NODE_URL") {
            self.node_url_template = url;
        }
        if let Ok(path) = std::env::var("ONION_DIRECTORY_HOP_BINARY") {
            self.hop_binary_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> OnionResult<()> {
        if self.port == 0 {
            return Err(OnionError::Config("port must be nonzero".into()));
        }
        if self.node_url_template.is_empty() {
            return Err(OnionError::Config("node_url_template must be non-empty".into()));
        }
        if self.id_range_low == 0 || self.id_range_high < self.id_range_low {
            return Err(OnionError::Config("invalid id_range bounds".into()));
        }
        Ok(())
    }

    pub fn id_range(&self) -> RangeInclusive<u32> {
        self.id_range_low..=self.id_range_high
    }

    /// Derive a hop's externally reachable URL by substituting the
    /// `directory` segment of this controller's own URL with `node-<id>`
    /// (§4.D).
    pub fn node_url(&self, node_id: NodeId) -> String {
        self.node_url_template
            .replacen("directory", &node_id.node_name(), 1)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_port() {
        let mut config = DirectoryConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn derives_node_url_from_template() {
        let config = DirectoryConfig {
            node_url_template: "https://directory.example.org".into(),
            ..DirectoryConfig::default()
        };
        assert_eq!(
            config.node_url(NodeId::new(7).unwrap()),
            "https://node-007.example.org"
        );
    }

    #[test]
    fn default_config_validates() {
        assert!(DirectoryConfig::default().validate().is_ok());
    }
}
