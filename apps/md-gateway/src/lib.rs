#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Data Gateway - Exchange Quote Session Adapter
//!
//! Maintains a single authenticated session to an exchange quote endpoint,
//! subscribes instruments with one request per trading venue, and forwards
//! every depth snapshot as a normalized tick to one downstream sink.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and rules, no I/O
//!   - `venue`: Venue codes and the instrument-to-venue resolver
//!   - `subscription`: Request grouping and subscription tracking
//!   - `session`: Session phase, transport and vendor error codes
//!   - `market_data`: Raw depth records and the normalizer
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Quote endpoint handle, session callbacks, tick sink
//!   - `services`: Session manager, batcher, dispatcher, diagnostics, engine
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broadcast`: Channel-based tick fan-out
//!   - `simulator`: In-process quote endpoint
//!   - `config`: Configuration loading and validation
//!   - `health`: Health check HTTP endpoint
//!   - `metrics` / `telemetry`: Prometheus and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//!                 login / subscribe (per venue)
//! ┌──────────┐ ─────────────────────────────────► ┌────────────────┐
//! │ MdEngine │                                    │ Quote endpoint │
//! └──────────┘ ◄───────────────────────────────── └────────────────┘
//!      │          callbacks (depth, acks, errors)
//!      ▼
//! ┌───────────────┐     ┌──────────────┐
//! │ TickDispatcher│────►│ MarketData   │──► Consumer
//! │  (normalize)  │     │ Sink         │
//! └───────────────┘     └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote session types with no external I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market_data::{
    DepthMarketData, MalformedTick, NormalizedTick, OrderQueue, PriceLevel, QueueSnapshot,
};
pub use domain::session::{ApiError, CLIENT_ID_COLLISION, ConnectOutcome, SessionPhase, Transport};
pub use domain::subscription::{InstrumentRequest, SubscriptionStats};
pub use domain::venue::{Venue, resolve_venue};

// Ports
pub use application::ports::{
    MarketDataSink, QuoteApi, QuoteApiFactory, SessionCallbacks, SubscribeTicker, TransportError,
};

// Services
pub use application::services::{
    BatchReport, DEFAULT_MAX_COLLISION_RETRIES, EngineConfig, EngineStatus, Lifecycle, MdEngine,
    SessionError, SessionSettings,
};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, Credentials, GatewayConfig, ServerSettings, SessionConfig,
    SimulatorSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Broadcast sink (for integration tests)
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastSink, BroadcastStats, SharedBroadcastSink,
};

// Simulated endpoint (for integration tests)
pub use infrastructure::simulator::{SimulatedQuoteApi, SimulatorControl, SimulatorFactory};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
