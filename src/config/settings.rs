//! Resolution of alert-time configuration into batch settings
//!
//! Alert-time values win over the installation file for the connection,
//! and fixed defaults fill in the event key and description. The four
//! classification codes have no default: a batch without them never starts.

use crate::config::AppConfig;
use crate::error::ConfigError;
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Event key used when the alert does not set `unique`
pub const DEFAULT_EVENT_KEY: &str = "oneevent";

/// Event description used when neither the alert nor the row sets `info`
pub const DEFAULT_EVENT_INFO: &str = "notable event";

/// Configuration supplied by the alert that fired
///
/// The host sends every value as a JSON scalar; non-string scalars are
/// kept as their textual form so that numeric parsing happens in one place.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AlertConfig {
    #[serde(rename = "URL", default, deserialize_with = "scalar_as_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub authkey: Option<String>,
    /// Default event key for rows without an `eventkey` column
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub unique: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub info: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub tags: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub analysis: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub threatlevel: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub distribution: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub tlp: Option<String>,
}

impl AlertConfig {
    /// Copy suitable for logging, with the API key masked
    pub fn redacted(&self) -> Self {
        Self {
            authkey: self.authkey.as_ref().map(|_| "<redacted>".to_string()),
            ..self.clone()
        }
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Normalized settings for one batch run
///
/// Built once by [`Settings::resolve`] and read by the aggregator and the
/// dispatcher. Serializes with the key names the submission script reads.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    #[serde(rename = "mispsrv")]
    pub misp_url: String,
    #[serde(rename = "mispkey")]
    pub misp_key: String,
    #[serde(rename = "sslcheck")]
    pub ssl_check: bool,
    #[serde(rename = "eventkey")]
    pub event_key: String,
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    pub analysis: i64,
    pub tlp: i64,
    #[serde(rename = "threatlevel")]
    pub threat_level: i64,
    pub distribution: i64,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("misp_url", &self.misp_url)
            .field("misp_key", &"<redacted>")
            .field("ssl_check", &self.ssl_check)
            .field("event_key", &self.event_key)
            .field("info", &self.info)
            .field("tags", &self.tags)
            .field("analysis", &self.analysis)
            .field("tlp", &self.tlp)
            .field("threat_level", &self.threat_level)
            .field("distribution", &self.distribution)
            .finish()
    }
}

impl Settings {
    /// Merge alert-time configuration with the installation-wide file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidInteger` or `ConfigError::MissingValue`
    /// if any classification code is absent or not an integer, and
    /// `ConfigError::MissingValue` if no source provides the server URL or key.
    pub fn resolve(alert: &AlertConfig, app: &AppConfig) -> Result<Self, ConfigError> {
        let analysis = parse_code("analysis", alert.analysis.as_deref())?;
        let threat_level = parse_code("threatlevel", alert.threatlevel.as_deref())?;
        let distribution = parse_code("distribution", alert.distribution.as_deref())?;
        let tlp = parse_code("tlp", alert.tlp.as_deref())?;

        let (misp_url, misp_key) = match (non_empty(&alert.url), non_empty(&alert.authkey)) {
            (Some(url), Some(key)) => (url.to_string(), key.to_string()),
            _ => {
                let setup = &app.mispsetup;
                let url = setup
                    .mispsrv
                    .clone()
                    .ok_or_else(|| ConfigError::MissingValue("mispsetup.mispsrv".to_string()))?;
                let key = setup
                    .mispkey
                    .clone()
                    .ok_or_else(|| ConfigError::MissingValue("mispsetup.mispkey".to_string()))?;
                (url, key)
            }
        };

        let ssl_check = match app.mispsetup.sslcheck {
            Some(check) => check,
            None => {
                warn!("mispsetup.sslcheck not set, TLS certificate verification is disabled");
                false
            }
        };

        let settings = Settings {
            misp_url,
            misp_key,
            ssl_check,
            event_key: alert
                .unique
                .clone()
                .unwrap_or_else(|| DEFAULT_EVENT_KEY.to_string()),
            info: alert
                .info
                .clone()
                .unwrap_or_else(|| DEFAULT_EVENT_INFO.to_string()),
            tags: alert.tags.clone(),
            analysis,
            tlp,
            threat_level,
            distribution,
        };

        debug!("Resolved settings: {:?}", settings);
        Ok(settings)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn parse_code(field: &'static str, raw: Option<&str>) -> Result<i64, ConfigError> {
    let raw = raw.ok_or_else(|| ConfigError::MissingValue(field.to_string()))?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidInteger {
            field,
            value: raw.to_string(),
        })
}
