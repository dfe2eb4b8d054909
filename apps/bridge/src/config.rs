//! Bridge configuration file.
//!
//! Stored as TOML, by default at `~/.config/hassbridge/bridge.toml`:
//!
//! ```toml
//! ip_address = "192.168.1.20"
//! access_token = "<long-lived token>"
//! topic = "datalogger/homeassistant"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use hassbridge_protocol::constants::DEFAULT_TOPIC;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Contents of the configuration file.
///
/// Required fields are optional here; the lifecycle manager decides what
/// a usable configuration is and reports what is missing.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hub address, with or without a port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Long-lived access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Prefix of every published topic.
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip_address: None,
            access_token: None,
            topic: default_topic(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("ip_address", &self.ip_address)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("topic", &self.topic)
            .finish()
    }
}

impl Config {
    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// The mapping handed to the lifecycle manager.
    pub fn to_contents(&self) -> anyhow::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("configuration serialized to {other}"),
        }
    }
}

/// Resolves the configuration path: the CLI argument if given, otherwise
/// the per-user default.
pub fn config_path(arg: Option<String>) -> PathBuf {
    if let Some(path) = arg {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("hassbridge").join("bridge.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("hassbridge")
            .join("bridge.toml")
    }
}
