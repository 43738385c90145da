use crate::error::ConfigError;
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;

/// Default location of the installation-wide configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/opt/splunk/etc/apps/misp42splunk/local/misp_alert.toml";

/// Installation-wide configuration
///
/// Loaded from a TOML file with optional `[mispsetup]` and `[submission]`
/// tables. Every key has a default so that a partial file is valid.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Connection defaults used when the alert does not supply its own
    pub mispsetup: MispSetup,
    /// How the submission process is launched
    pub submission: SubmissionConfig,
}

/// `[mispsetup]` table
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MispSetup {
    /// MISP server URL
    pub mispsrv: Option<String>,
    /// MISP API key
    pub mispkey: Option<String>,
    /// Whether the submission process verifies TLS certificates.
    /// Absent means verification is disabled. Accepts a TOML boolean or the
    /// strings `true`/`yes`/`on`/`1` and `false`/`no`/`off`/`0`, in any case.
    #[serde(deserialize_with = "flag")]
    pub sslcheck: Option<bool>,
}

/// `[submission]` table
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Interpreter used to run the submission script
    pub interpreter: String,
    /// Script that creates one event on the MISP server
    pub script: String,
    /// Variables removed from the child environment
    pub env_remove: Vec<String>,
    /// Variables set on the child environment
    pub env: BTreeMap<String, String>,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("PYTHONPATH".to_string(), "/usr/bin/python3".to_string());

        Self {
            interpreter: "/usr/bin/python3".to_string(),
            script: "/opt/splunk/etc/apps/misp42splunk/bin/pymisp_create_event.py".to_string(),
            // The host's bundled libraries break TLS in the system interpreter
            env_remove: vec!["LD_LIBRARY_PATH".to_string()],
            env,
        }
    }
}

/// Boolean written either natively or as a conventional flag string
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(Some(value)),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(serde::de::Error::custom(format!(
                "not a boolean: {:?}",
                text
            ))),
        },
    }
}

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read and
    /// `ConfigError::TomlError` if it is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, treating a missing file as an empty configuration
    ///
    /// An alert that carries its own URL and key does not need the file at
    /// all; a file that exists but does not parse is still an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(
                "Configuration file '{}' not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        info!("Loading configuration from: {}", path.display());
        Self::from_file(path)
    }
}
