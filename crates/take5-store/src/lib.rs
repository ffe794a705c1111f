//! Identity lookup and persistence for the Take 5 server.
//!
//! The server only sees the two traits here. [`SqliteStore`] implements
//! both on top of a single SQLite connection; pass
//! [`SqliteStore::open_in_memory`] for a throwaway database.
//!
//! Calls are synchronous and short. They never run while a caller awaits,
//! so holding the connection's `std::sync::Mutex` is fine from async code.

mod error;
mod snapshot;
mod sqlite;

use std::collections::BTreeMap;

pub use error::StoreError;
pub use snapshot::{PlaySnapshot, PlayerSnapshot, RoomSnapshot, SCHEMA_VERSION, shell_room};
pub use sqlite::SqliteStore;

use take5_protocol::{PlayerStat, RoomId, UserId};
use take5_room::{GameConfig, Room};

/// Maps display names to stable user ids.
pub trait IdentityResolver: Send + Sync + 'static {
    /// Returns the id for `name`, creating one if needed. Calling it twice
    /// with the same name returns the same id, even when two callers race.
    fn resolve_user_id(&self, name: &str) -> Result<UserId, StoreError>;
}

/// One player's line in a finished game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub name: String,
    pub score: u32,
}

/// Durable room state and game history.
pub trait SnapshotStore: Send + Sync + 'static {
    /// Writes the room's current state, replacing any earlier snapshot.
    /// Does nothing for a closed room.
    fn upsert_room_snapshot(&self, room: &Room) -> Result<(), StoreError>;

    /// Removes the room and its snapshot. History is kept.
    fn delete_room(&self, id: &RoomId) -> Result<(), StoreError>;

    /// Every stored room, rebuilt with `config`. A room whose snapshot is
    /// missing or unreadable comes back as a shell.
    fn load_all_room_snapshots(
        &self,
        config: &GameConfig,
    ) -> Result<BTreeMap<RoomId, Room>, StoreError>;

    /// Records one finished game.
    fn append_game_result(
        &self,
        room_id: &RoomId,
        results: &[GameResult],
    ) -> Result<(), StoreError>;

    /// Totals per player name for a room, lowest total score first.
    fn query_room_stats(&self, room_id: &RoomId) -> Result<Vec<PlayerStat>, StoreError>;
}

/// Everything the server needs from storage.
pub trait Store: IdentityResolver + SnapshotStore {}

impl<T: IdentityResolver + SnapshotStore> Store for T {}
