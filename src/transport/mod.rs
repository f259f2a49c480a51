//! Native channel transport.
//!
//! This module handles the channel between the bridge (Rust) and the
//! native handler, an external process speaking length-prefixed JSON
//! over its stdin/stdout.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐                            ┌──────────────────┐
//! │  Bridge (Rust)    │                            │  Native handler  │
//! │                   │      stdin  (requests)     │                  │
//! │  ConnectionManager│───────────────────────────►│  process         │
//! │  → Connection     │◄───────────────────────────│                  │
//! │                   │      stdout (responses)    │                  │
//! └───────────────────┘                            └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Endpoint::launch` - Resolve the handler and start it
//! 2. `ConnectionManager::open` - Wrap the pipes in a `Connection`, publish connected
//! 3. `Connection::send` / `Connection::on_message` - Exchange messages
//! 4. `Connection::on_disconnect` - Observe the single terminal event
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Channel connection and event loop |
//! | `endpoint` | Handler resolution and launch |
//! | `manager` | Single-connection lifecycle and state publishing |

// ============================================================================
// Submodules
// ============================================================================

/// Channel connection and event loop.
pub mod connection;

/// Native handler endpoints.
pub mod endpoint;

/// Connection manager.
pub mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, DEFAULT_MESSAGE_BUFFER, DisconnectReason, MessageStream};
pub use endpoint::{
    ChannelIo, Endpoint, HostChannel, HostManifest, LoopbackEndpoint, LoopbackHosts,
    ManifestEndpoint, default_manifest_dirs,
};
pub use manager::ConnectionManager;
