//! Quote Session Types
//!
//! Lifecycle phase, transport selection and connect outcomes for the single
//! upstream quote session.
//!
//! # Lifecycle
//!
//! ```text
//!                 login ok
//! Disconnected ───────────────► LoggedIn
//!      ▲                           │
//!      │   logout / disconnected   │
//!      └───────────────────────────┘
//! ```
//!
//! Login is a single blocking call, so there is no observable phase between
//! the two: a session is either logged in or it is not. `is_connected` and
//! `is_logged_in` therefore agree.

use std::fmt;

use serde::Serialize;

// =============================================================================
// Session Phase
// =============================================================================

/// Current phase of the quote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No live login.
    #[default]
    Disconnected,

    /// Authenticated and able to subscribe.
    LoggedIn,
}

impl SessionPhase {
    /// Check whether the transport is up.
    ///
    /// Only a completed login brings it up.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::LoggedIn)
    }

    /// Check whether the session is authenticated.
    #[must_use]
    pub const fn is_logged_in(self) -> bool {
        matches!(self, Self::LoggedIn)
    }

    /// Get the phase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::LoggedIn => "logged_in",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Network transport used for the quote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Transport {
    /// Stream (TCP) transport.
    Tcp,

    /// Datagram (UDP) transport with a receive buffer.
    Udp {
        /// Receive buffer size in megabytes.
        buffer_mb: u32,
    },
}

impl Transport {
    /// Select the transport for an optional buffer size.
    ///
    /// A positive size selects datagram; anything else selects stream.
    #[must_use]
    pub const fn from_buffer_size(buffer_mb: Option<u32>) -> Self {
        match buffer_mb {
            Some(buffer_mb) if buffer_mb > 0 => Self::Udp { buffer_mb },
            _ => Self::Tcp,
        }
    }

    /// Datagram receive buffer size, if any.
    #[must_use]
    pub const fn buffer_mb(self) -> Option<u32> {
        match self {
            Self::Tcp => None,
            Self::Udp { buffer_mb } => Some(buffer_mb),
        }
    }

    /// Get the protocol name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp { .. } => "udp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Vendor Errors
// =============================================================================

/// Vendor code reported when another session already uses the client id.
pub const CLIENT_ID_COLLISION: i32 = 10_210_101;

/// Error reported by the upstream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, thiserror::Error)]
#[error("vendor error {code}: {message}")]
pub struct ApiError {
    /// Vendor error code; zero means success.
    pub code: i32,
    /// Vendor error message.
    pub message: String,
}

impl ApiError {
    /// Create a vendor error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Client id collision error.
    #[must_use]
    pub fn client_id_collision() -> Self {
        Self::new(CLIENT_ID_COLLISION, "client id already in use")
    }

    /// Check whether the code signals success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Check whether another session already holds the client id.
    #[must_use]
    pub const fn is_client_id_collision(&self) -> bool {
        self.code == CLIENT_ID_COLLISION
    }
}

// =============================================================================
// Connect Outcome
// =============================================================================

/// Result of a connect or login request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Session was already up; nothing was sent.
    AlreadyConnected,

    /// Login succeeded.
    LoggedIn {
        /// Client id the session is registered under.
        client_id: u32,
        /// Collisions resolved before the login succeeded.
        collisions: u32,
    },

    /// Endpoint refused the login with a non-collision error.
    Rejected(ApiError),
}

impl ConnectOutcome {
    /// Check whether the session is usable after this outcome.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_and_logged_in_agree() {
        for phase in [SessionPhase::Disconnected, SessionPhase::LoggedIn] {
            assert_eq!(phase.is_connected(), phase.is_logged_in());
        }
        assert!(!SessionPhase::Disconnected.is_connected());
        assert!(SessionPhase::LoggedIn.is_connected());
        assert_eq!(SessionPhase::default(), SessionPhase::Disconnected);
    }

    #[test]
    fn transport_from_buffer_size() {
        assert_eq!(Transport::from_buffer_size(None), Transport::Tcp);
        assert_eq!(Transport::from_buffer_size(Some(0)), Transport::Tcp);
        assert_eq!(
            Transport::from_buffer_size(Some(256)),
            Transport::Udp { buffer_mb: 256 }
        );
        assert_eq!(Transport::Udp { buffer_mb: 64 }.buffer_mb(), Some(64));
        assert_eq!(Transport::Tcp.buffer_mb(), None);
    }

    #[test]
    fn api_error_classification() {
        assert!(ApiError::client_id_collision().is_client_id_collision());
        assert!(!ApiError::new(11_000_001, "bad password").is_client_id_collision());
        assert!(ApiError::default().is_success());
        assert!(!ApiError::new(1, "x").is_success());
    }

    #[test]
    fn api_error_display() {
        let err = ApiError::new(42, "nope");
        assert_eq!(err.to_string(), "vendor error 42: nope");
    }

    #[test]
    fn outcome_readiness() {
        assert!(ConnectOutcome::AlreadyConnected.is_ready());
        assert!(
            ConnectOutcome::LoggedIn {
                client_id: 1,
                collisions: 0
            }
            .is_ready()
        );
        assert!(!ConnectOutcome::Rejected(ApiError::new(1, "x")).is_ready());
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::LoggedIn).unwrap(),
            "\"logged_in\""
        );
    }
}
