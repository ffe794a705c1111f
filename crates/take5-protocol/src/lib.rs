//! Wire protocol for the Take 5 server.
//!
//! This crate defines the "language" that the browser client and the server
//! speak:
//!
//! - **Types** ([`Action`], [`ServerMessage`], [`StatePayload`], etc.):
//!   the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the room
//! engine (game state). It doesn't know about connections or rooms, only
//! how to serialize and deserialize messages.
//!
//! ```text
//! Transport (bytes) → Protocol (Action / ServerMessage) → Room engine
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Action, ActionKind, Card, CountdownPayload, Identity, PlayerStat,
    PublicPlayer, PublicState, Recipient, RoomId, RoomStatus, RoomSummary,
    RowView, ServerMessage, StatePayload, UserId,
};
