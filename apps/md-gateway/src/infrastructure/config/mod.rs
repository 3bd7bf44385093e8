//! Configuration Module
//!
//! Configuration loading for the gateway: environment variables for the
//! binary, and the JSON session document for embedding hosts.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, Credentials, GatewayConfig, ServerSettings, SessionConfig,
    SimulatorSettings, parse_instruments,
};
