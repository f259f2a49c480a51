//! Shared connection status.
//!
//! The connection manager publishes every lifecycle transition to a
//! [`StatusStore`]; observers such as a toolbar popup follow the store with a
//! [`StatusSubscriber`].
//!
//! ```text
//! ConnectionManager ──publish──► StatusStore ──change──► StatusSubscriber ──► Indicator
//!                                 { isConnected, lastError }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `store` | Storage trait, in-memory and file-backed stores |
//! | `publisher` | [`ConnectionState`] and its single writer |
//! | `subscriber` | Two-state indicator fed by change notifications |

// ============================================================================
// Submodules
// ============================================================================

/// Connection state record and publisher.
pub mod publisher;

/// Durable key/value storage with change notifications.
pub mod store;

/// Indicator subscriber.
pub mod subscriber;

// ============================================================================
// Re-exports
// ============================================================================

pub use publisher::{ConnectionState, LAST_ERROR_KEY, STATUS_KEY, StatusPublisher};
pub use store::{FileStore, MemoryStore, StatusStore, StorageArea, StorageChange, ValueChange};
pub use subscriber::{Indicator, StatusSubscriber};
