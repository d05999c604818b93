//! Agent configuration.
//!
//! Built with [`AgentBuilder`](crate::AgentBuilder) or loaded from JSON:
//!
//! ```
//! use dpp_agent::config::AgentConfig;
//!
//! let config: AgentConfig = serde_json::from_str(r#"{
//!     "controller": "192.0.2.10",
//!     "bootstrap_file": "/etc/dpp/bootstrap.txt",
//!     "bootstrap_index": 2
//! }"#).unwrap();
//!
//! assert!(config.mutual);
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::protocol::MAX_FRAME_SIZE;
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// PKEX parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Shared code.
    pub password: String,
    /// Code identifier.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Extra information sent along with our public key.
    #[serde(default)]
    pub info: Option<String>,
}

impl ExchangeConfig {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            identifier: None,
            info: None,
        }
    }
}

/// Role the device plays in DPP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Issue connectors, signing them with the given key.
    Configurator { sign_key_file: PathBuf },
    /// Receive a connector for the given network role (`sta` or `ap`).
    Enrollee {
        network_role: String,
        #[serde(default)]
        mud_url: Option<String>,
    },
}

impl Default for Role {
    fn default() -> Self {
        Role::Enrollee {
            network_role: "sta".to_string(),
            mud_url: None,
        }
    }
}

/// Everything the agent needs at startup.
///
/// `key_file` and `role` are not used by the agent itself; they are carried
/// for whoever constructs the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Controller address, `host` or `host:port`.
    pub controller: String,
    /// Peer bootstrap key file.
    pub bootstrap_file: PathBuf,
    /// Our own bootstrap key.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub role: Role,
    /// Mutual authentication.
    #[serde(default = "default_mutual")]
    pub mutual: bool,
    /// Run PKEX first when set.
    #[serde(default)]
    pub exchange: Option<ExchangeConfig>,
    /// Stored peer key to authenticate against when not running PKEX.
    #[serde(default)]
    pub bootstrap_index: u32,
    /// Largest frame accepted from the controller.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
    /// Outbound frame queue depth.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_mutual() -> bool {
    true
}

fn default_max_frame_size() -> u32 {
    MAX_FRAME_SIZE
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            controller: String::new(),
            bootstrap_file: PathBuf::new(),
            key_file: None,
            role: Role::default(),
            mutual: default_mutual(),
            exchange: None,
            bootstrap_index: 0,
            max_frame_size: default_max_frame_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AgentConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| AgentError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.controller.is_empty() {
            return Err(AgentError::Config(
                "need to specify a controller".to_string(),
            ));
        }
        if self.bootstrap_file.as_os_str().is_empty() {
            return Err(AgentError::Config(
                "specify a peer bootstrapping key file".to_string(),
            ));
        }
        if self.exchange.is_none() && self.bootstrap_index == 0 {
            return Err(AgentError::Config(
                "either do PKEX or specify an index into the bootstrapping file".to_string(),
            ));
        }
        if matches!(&self.exchange, Some(exchange) if exchange.password.is_empty()) {
            return Err(AgentError::Config("PKEX password is empty".to_string()));
        }
        if self.max_frame_size == 0 || self.max_frame_size > MAX_FRAME_SIZE {
            return Err(AgentError::Config(format!(
                "max frame size must be between 1 and {}",
                MAX_FRAME_SIZE
            )));
        }
        if self.channel_capacity == 0 {
            return Err(AgentError::Config(
                "channel capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AgentConfig {
        AgentConfig {
            controller: "127.0.0.1".to_string(),
            bootstrap_file: PathBuf::from("bootstrap.txt"),
            bootstrap_index: 1,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert!(config.mutual);
        assert_eq!(config.max_frame_size, MAX_FRAME_SIZE);
        assert_eq!(
            config.role,
            Role::Enrollee {
                network_role: "sta".to_string(),
                mud_url: None
            }
        );
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_controller_required() {
        let config = AgentConfig {
            controller: String::new(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_bootstrap_file_required() {
        let config = AgentConfig {
            bootstrap_file: PathBuf::new(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pkex_or_index_required() {
        let config = AgentConfig {
            bootstrap_index: 0,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            bootstrap_index: 0,
            exchange: Some(ExchangeConfig::new("secret")),
            ..valid()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_size_bounds() {
        let config = AgentConfig {
            max_frame_size: MAX_FRAME_SIZE + 1,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configurator_role_from_json() {
        let config: AgentConfig = serde_json::from_str(
            r#"{
                "controller": "10.0.0.1:7871",
                "bootstrap_file": "b.txt",
                "role": { "configurator": { "sign_key_file": "sign.pem" } },
                "mutual": false,
                "exchange": { "password": "hunter2", "identifier": "lab" }
            }"#,
        )
        .unwrap();

        assert!(!config.mutual);
        assert_eq!(
            config.role,
            Role::Configurator {
                sign_key_file: PathBuf::from("sign.pem")
            }
        );
        assert_eq!(
            config.exchange.as_ref().and_then(|e| e.identifier.as_deref()),
            Some("lab")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{"controller":"c","bootstrap_file":"b","bootstrap_index":3}"#,
        )
        .unwrap();

        let config = AgentConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.bootstrap_index, 3);

        std::fs::write(file.path(), "not json").unwrap();
        assert!(matches!(
            AgentConfig::from_json_file(file.path()),
            Err(AgentError::Config(_))
        ));
    }
}
