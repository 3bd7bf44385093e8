//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SessionManager`: Session lifecycle with bounded collision retry
//! - `SubscriptionBatcher`: One upstream call per venue
//! - `TickDispatcher`: Normalize and forward depth snapshots
//! - `DiagnosticsRelay`: Vendor acknowledgments, errors and disconnects
//! - `MdEngine`: Host-facing facade and callback receiver

/// Session state machine.
pub mod session;

/// Venue-batched subscription dispatch.
pub mod batcher;

/// Tick normalization and forwarding.
pub mod dispatcher;

/// Vendor diagnostics routing.
pub mod diagnostics;

/// Engine facade.
pub mod engine;

pub use batcher::{BatchReport, SubscriptionBatcher};
pub use diagnostics::{DiagnosticsRelay, DiagnosticsStats, ErrorRecord};
pub use dispatcher::{DispatchStats, TickDispatcher};
pub use engine::{EngineConfig, EngineStatus, Lifecycle, MdEngine};
pub use session::{
    DEFAULT_MAX_COLLISION_RETRIES, SessionError, SessionManager, SessionSettings, SessionStatus,
};
