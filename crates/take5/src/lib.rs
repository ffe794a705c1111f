//! # Take 5
//!
//! Multiplayer room server for the card game Take 5 ("6 nimmt!").
//!
//! Players connect over WebSocket, create or join named rooms and play
//! rounds that the server resolves authoritatively. Rooms survive
//! disconnects and process restarts: every state change is snapshotted to
//! the store, and a returning player gets their seat back exactly as they
//! left it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use take5::prelude::*;
//!
//! # async fn run() -> Result<(), Take5Error> {
//! let store = Arc::new(SqliteStore::open_in_memory()?);
//! let server = Take5Server::builder()
//!     .bind("0.0.0.0:8080")
//!     .pacing(PacingConfig::default())
//!     .build(store)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod broadcast;
mod error;
mod handler;
mod pacing;
mod server;

pub use error::Take5Error;
pub use pacing::PacingConfig;
pub use server::{Take5Server, Take5ServerBuilder, LOBBY_PATH};

/// Re-exports the types needed to configure and run a server.
pub mod prelude {
    pub use crate::{PacingConfig, Take5Error, Take5Server, Take5ServerBuilder, LOBBY_PATH};
    pub use take5_protocol::{
        Action, ActionKind, Codec, JsonCodec, RoomId, RoomStatus, ServerMessage, UserId,
    };
    pub use take5_room::GameConfig;
    pub use take5_store::{SqliteStore, Store};
}
