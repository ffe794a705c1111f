//! Error types for the room layer.
//!
//! Two enums: [`RoomError`] for membership and registry operations,
//! [`GameError`] for engine rejections. Neither is a fault. The server
//! logs them at `debug` and answers with a notice or nothing at all.

use take5_protocol::{RoomId, RoomStatus, UserId};

/// Errors from room membership and the registry.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// A room with this id is already registered.
    #[error("room {0} already exists")]
    AlreadyExists(RoomId),

    /// Room ids must be non-empty.
    #[error("room id must not be empty")]
    InvalidRoomId,

    /// The room is full. Rejoining players are never rejected.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The user has no player record in this room.
    #[error("user {0} not in room {1}")]
    NotInRoom(UserId, RoomId),

    /// Only the owner may do this.
    #[error("user {0} is not the owner of room {1}")]
    NotOwner(UserId, RoomId),
}

/// Rejections from the turn resolution engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The room's status doesn't allow this action.
    #[error("action not allowed while {0}")]
    WrongStatus(RoomStatus),

    #[error("user {0} is not in the room")]
    NotInRoom(UserId),

    #[error("user {0} is not the owner")]
    NotOwner(UserId),

    /// The player already picked a card this round.
    #[error("a card is already selected")]
    AlreadySelected,

    #[error("card {0} is not in hand")]
    CardNotInHand(u8),

    /// The value is outside `1..=104`.
    #[error("invalid card value {0}")]
    InvalidCard(i64),

    /// A row choice arrived while nobody was choosing.
    #[error("no row choice is pending")]
    NoPendingChoice,

    /// Somebody else owns the pending choice.
    #[error("row choice belongs to {0}")]
    NotYourChoice(UserId),

    #[error("invalid row index {0}")]
    InvalidRow(i64),

    #[error("{online} players online, {required} required")]
    NotEnoughPlayers { online: usize, required: usize },
}
