//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the quote endpoint and downstream sink.
pub mod ports;

/// Application services for the session, subscriptions and tick dispatch.
pub mod services;
