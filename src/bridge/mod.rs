//! Bridge runtime: configuration, controller and composition.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Bridge`] | Composed runtime processing download events |
//! | [`BridgeBuilder`] | Fluent configuration of a [`Bridge`] |
//! | [`BridgeConfig`] | Serializable settings |
//! | [`BridgeController`] | Delivers requests over the session connection |
//! | [`DiagnosticSink`] | Receives the handler's responses |

// ============================================================================
// Submodules
// ============================================================================

/// Builder pattern for bridge configuration.
pub mod builder;

/// Serializable settings.
pub mod config;

/// Request delivery and response routing.
pub mod controller;

/// Composed bridge runtime.
pub mod core;

/// Diagnostic sink for responses.
pub mod sink;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::BridgeBuilder;
pub use config::{BridgeConfig, ConnectPolicy, DEFAULT_ENDPOINT};
pub use controller::BridgeController;
pub use core::Bridge;
pub use sink::{DiagnosticSink, TracingSink};
