//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Broadcast channel sink for tick fan-out.
pub mod broadcast;

/// Configuration loading and validation.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-process simulated quote endpoint.
pub mod simulator;

/// OpenTelemetry tracing integration.
pub mod telemetry;
