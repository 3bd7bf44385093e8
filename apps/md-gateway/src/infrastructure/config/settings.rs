//! Gateway Configuration Settings
//!
//! Configuration types for the market data gateway, loaded from environment
//! variables or from a JSON session document.
//!
//! # JSON Session Document
//!
//! ```json
//! {
//!   "ClientId": 1,
//!   "UserId": "trader",
//!   "Password": "secret",
//!   "Ip": "120.27.164.138",
//!   "Port": 6002,
//!   "UdpBufferSize": 256
//! }
//! ```
//!
//! `UdpBufferSize` is optional; when present it must be positive and selects
//! the UDP transport.

use std::time::Duration;

use serde::Deserialize;

use crate::application::services::{
    DEFAULT_MAX_COLLISION_RETRIES, EngineConfig, SessionSettings,
};
use crate::domain::session::Transport;
use crate::domain::subscription::InstrumentRequest;

// =============================================================================
// Credentials
// =============================================================================

/// Quote account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user_id: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(user_id: String, password: String) -> Self {
        Self { user_id, password }
    }

    /// Get the user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Session
// =============================================================================

/// Quote session parameters. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Initial client id.
    pub client_id: u32,
    /// Account credentials.
    pub credentials: Credentials,
    /// Endpoint host.
    pub host: String,
    /// Endpoint port.
    pub port: u16,
    /// UDP receive buffer in megabytes; `None` selects TCP.
    pub udp_buffer_size_mb: Option<u32>,
}

#[derive(Deserialize)]
struct RawSessionConfig {
    #[serde(rename = "ClientId")]
    client_id: Option<i64>,
    #[serde(rename = "UserId")]
    user_id: Option<String>,
    #[serde(rename = "Password")]
    password: Option<String>,
    #[serde(rename = "Ip")]
    ip: Option<String>,
    #[serde(rename = "Port")]
    port: Option<i64>,
    #[serde(rename = "UdpBufferSize")]
    udp_buffer_size: Option<i64>,
}

impl SessionConfig {
    /// Parse a JSON session document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON, a required key is
    /// missing, or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawSessionConfig = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Build from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`from_json`](Self::from_json).
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawSessionConfig = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSessionConfig) -> Result<Self, ConfigError> {
        let client_id = raw.client_id.ok_or(ConfigError::MissingField("ClientId"))?;
        let user_id = raw.user_id.ok_or(ConfigError::MissingField("UserId"))?;
        let password = raw.password.ok_or(ConfigError::MissingField("Password"))?;
        let host = raw.ip.ok_or(ConfigError::MissingField("Ip"))?;
        let port = raw.port.ok_or(ConfigError::MissingField("Port"))?;

        let config = Self {
            client_id: in_range("ClientId", client_id)?,
            credentials: Credentials::new(user_id, password),
            host,
            port: in_range("Port", port)?,
            udp_buffer_size_mb: raw
                .udp_buffer_size
                .map(|v| in_range("UdpBufferSize", v))
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that parsing alone does not enforce.
    ///
    /// # Errors
    ///
    /// Returns an error for empty credentials or host, port zero, or a zero
    /// UDP buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.user_id().trim().is_empty() {
            return Err(ConfigError::EmptyValue("UserId".to_string()));
        }
        if self.credentials.password().is_empty() {
            return Err(ConfigError::EmptyValue("Password".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyValue("Ip".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("Port", "0", "port must be non-zero"));
        }
        if self.udp_buffer_size_mb == Some(0) {
            return Err(ConfigError::invalid(
                "UdpBufferSize",
                "0",
                "omit the buffer size to use TCP",
            ));
        }
        Ok(())
    }

    /// Transport selected by the buffer size.
    #[must_use]
    pub const fn transport(&self) -> Transport {
        Transport::from_buffer_size(self.udp_buffer_size_mb)
    }

    /// Session settings for the engine.
    #[must_use]
    pub fn session_settings(&self, max_collision_retries: u32) -> SessionSettings {
        SessionSettings {
            client_id: self.client_id,
            user_id: self.credentials.user_id().to_string(),
            password: self.credentials.password().to_string(),
            host: self.host.clone(),
            port: self.port,
            transport: self.transport(),
            max_collision_retries,
        }
    }
}

// =============================================================================
// Server / Broadcast / Simulator
// =============================================================================

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Capacity of the tick broadcast channel.
    pub capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Default interval between simulated ticks.
const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

/// Simulated endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorSettings {
    /// Interval between ticks for each subscribed instrument.
    pub tick_interval: Duration,
    /// Client ids the simulator reports as already in use.
    pub colliding_client_ids: Vec<u32>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            colliding_client_ids: Vec::new(),
        }
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Quote session parameters.
    pub session: SessionConfig,
    /// Instruments subscribed at start.
    pub instruments: Vec<InstrumentRequest>,
    /// Client id collisions retried before giving up.
    pub max_collision_retries: u32,
    /// Server port settings.
    pub server: ServerSettings,
    /// Broadcast channel settings.
    pub broadcast: BroadcastSettings,
    /// Simulated endpoint settings.
    pub simulator: SimulatorSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or any value is
    /// malformed. No malformed value is replaced by a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user_id = required(&lookup, "MD_USER_ID")?;
        let password = required(&lookup, "MD_PASSWORD")?;

        let session = SessionConfig {
            client_id: parse_required(&lookup, "MD_CLIENT_ID")?,
            credentials: Credentials::new(user_id, password),
            host: required(&lookup, "MD_HOST")?,
            port: parse_required(&lookup, "MD_PORT")?,
            udp_buffer_size_mb: parse_strict(&lookup, "MD_UDP_BUFFER_SIZE_MB")?,
        };
        session.validate()?;

        let instruments = lookup("MD_INSTRUMENTS")
            .map(|s| parse_instruments(&s))
            .transpose()?
            .unwrap_or_default();

        let tick_interval_ms: u64 = parse_strict(&lookup, "MD_TICK_INTERVAL_MS")?
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS)
            .max(1);
        let simulator = SimulatorSettings {
            tick_interval: Duration::from_millis(tick_interval_ms),
            colliding_client_ids: lookup("MD_SIM_COLLIDING_IDS")
                .map(|s| parse_client_ids("MD_SIM_COLLIDING_IDS", &s))
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(Self {
            session,
            instruments,
            max_collision_retries: parse_strict(&lookup, "MD_MAX_COLLISION_RETRIES")?
                .unwrap_or(DEFAULT_MAX_COLLISION_RETRIES),
            server: ServerSettings {
                health_port: parse_strict(&lookup, "MD_HEALTH_PORT")?
                    .unwrap_or_else(|| ServerSettings::default().health_port),
            },
            broadcast: BroadcastSettings {
                capacity: parse_strict(&lookup, "MD_BROADCAST_CAPACITY")?
                    .unwrap_or_else(|| BroadcastSettings::default().capacity)
                    .max(1),
            },
            simulator,
        })
    }

    /// Engine configuration derived from this config.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            session: self.session.session_settings(self.max_collision_retries),
            instruments: self.instruments.clone(),
        }
    }
}

/// Parse a comma-separated `id[:venue]` instrument list.
///
/// Blank entries are skipped.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for an entry with no instrument id,
/// such as `:SH`.
pub fn parse_instruments(list: &str) -> Result<Vec<InstrumentRequest>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            InstrumentRequest::parse_spec(entry).ok_or_else(|| {
                ConfigError::invalid("MD_INSTRUMENTS", entry, "expected id[:venue]")
            })
        })
        .collect()
}

fn parse_client_ids(key: &str, list: &str) -> Result<Vec<u32>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::invalid(key, id, e.to_string()))
        })
        .collect()
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Required JSON key is missing.
    #[error("missing required config key: {0}")]
    MissingField(&'static str),
    /// Value cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Config key.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Document is not valid JSON.
    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Parsing Helpers
// =============================================================================

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_strict<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, raw.clone(), e.to_string()))
        })
        .transpose()
}

fn parse_required<F, T>(lookup: &F, key: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(lookup, key)?;
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, raw.clone(), e.to_string()))
}

fn in_range<T>(key: &'static str, value: i64) -> Result<T, ConfigError>
where
    T: TryFrom<i64>,
{
    T::try_from(value).map_err(|_| ConfigError::invalid(key, value.to_string(), "out of range"))
}

// =============================================================================
// Tests
// =============================================================================
