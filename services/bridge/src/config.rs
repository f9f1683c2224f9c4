//! Bridge configuration loading.
//!
//! JSON is the sole config source. The file holds a top-level object keyed
//! by section name (§6); this service reads the `"DSC.TLink"` section and
//! reloads it from scratch on each load call.
//!
//! Default path: `persist/config.json`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use itv2_engine::session::SessionConfig;
use itv2_wire::crypto::{key_from_digits_quadrupled, key_from_hex32};

pub const SECTION_NAME: &str = "DSC.TLink";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub panel_bind_addr: String,
    pub ws_bind_addr: String,
    pub default_device_class: String,
    pub heartbeat_interval: Duration,
    pub partition_arm_timeout: Duration,
    pub type1_identifier_digits: Option<String>,
    pub type1_access_code_digits: Option<String>,
    pub type2_access_code_hex: Option<String>,
}

impl BridgeConfig {
    /// Derive the per-connection session defaults, pre-deriving the AES
    /// keys from whichever access codes are configured.
    pub fn session_config_template(&self) -> Result<SessionConfig, ConfigError> {
        let type1_identifier_key = self
            .type1_identifier_digits
            .as_deref()
            .map(key_from_digits_quadrupled)
            .transpose()
            .map_err(|e| ConfigError::InvalidValue(format!("type1_identifier_digits: {e}")))?;
        let type1_access_code_key = self
            .type1_access_code_digits
            .as_deref()
            .map(key_from_digits_quadrupled)
            .transpose()
            .map_err(|e| ConfigError::InvalidValue(format!("type1_access_code_digits: {e}")))?;
        let type2_access_code_key = self
            .type2_access_code_hex
            .as_deref()
            .map(key_from_hex32)
            .transpose()
            .map_err(|e| ConfigError::InvalidValue(format!("type2_access_code_hex: {e}")))?;

        Ok(SessionConfig {
            heartbeat_interval: self.heartbeat_interval,
            partition_arm_timeout: self.partition_arm_timeout,
            type1_identifier_key,
            type1_access_code_key,
            type2_access_code_key,
            ..SessionConfig::default()
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawSection {
    panel_bind_addr: Option<String>,
    ws_bind_addr: Option<String>,
    default_device_class: Option<String>,
    heartbeat_interval_secs: Option<u64>,
    partition_arm_timeout_secs: Option<u64>,
    type1_identifier_digits: Option<String>,
    type1_access_code_digits: Option<String>,
    type2_access_code_hex: Option<String>,
}

pub fn load_config_from_path(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let json_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&json_str)
}

pub fn load_config() -> Result<BridgeConfig, ConfigError> {
    load_config_from_path(Path::new("persist/config.json"))
}

pub fn load_config_from_str(json_str: &str) -> Result<BridgeConfig, ConfigError> {
    let top: HashMap<String, Value> =
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let section = top
        .get(SECTION_NAME)
        .ok_or_else(|| ConfigError::MissingField(SECTION_NAME.to_owned()))?;
    let raw: RawSection =
        serde_json::from_value(section.clone()).map_err(|e| ConfigError::Parse(e.to_string()))?;

    Ok(BridgeConfig {
        panel_bind_addr: raw.panel_bind_addr.unwrap_or_else(|| "0.0.0.0:3072".to_owned()),
        ws_bind_addr: raw.ws_bind_addr.unwrap_or_else(|| "0.0.0.0:8088".to_owned()),
        // Hard-coded to "door" upstream; kept configurable here but
        // defaulted to preserve behaviour (open question in design notes).
        default_device_class: raw.default_device_class.unwrap_or_else(|| "door".to_owned()),
        heartbeat_interval: Duration::from_secs(raw.heartbeat_interval_secs.unwrap_or(100)),
        partition_arm_timeout: Duration::from_secs(raw.partition_arm_timeout_secs.unwrap_or(5)),
        type1_identifier_digits: raw.type1_identifier_digits,
        type1_access_code_digits: raw.type1_access_code_digits,
        type2_access_code_hex: raw.type2_access_code_hex,
    })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
