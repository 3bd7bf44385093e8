//! Domain Layer - Core quote session types and business rules.
//!
//! This layer contains the venue resolver, subscription grouping, session
//! lifecycle types and tick normalization. Nothing here performs I/O.

/// Trading venues and the identifier resolver.
pub mod venue;

/// Subscription requests, per-venue batching and tracking.
pub mod subscription;

/// Session phase, transport selection and vendor errors.
pub mod session;

/// Vendor depth records and tick normalization.
pub mod market_data;
