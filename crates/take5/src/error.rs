//! Unified error type for the Take 5 server.

use take5_protocol::ProtocolError;
use take5_room::{GameError, RoomError};
use take5_store::StoreError;
use take5_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates a `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum Take5Error {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room or registry error (not found, duplicate, full).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A rejected game action.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A persistence or identity failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The server was configured with settings it can't run.
    #[error("invalid configuration: {0}")]
    Config(String),
}
