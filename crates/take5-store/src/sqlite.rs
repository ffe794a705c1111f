//! SQLite-backed store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use take5_protocol::{PlayerStat, RoomId, RoomStatus, UserId};
use take5_room::{GameConfig, Room};

use crate::snapshot::{RoomSnapshot, SCHEMA_VERSION, shell_room};
use crate::{GameResult, IdentityResolver, SnapshotStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS game_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    room_id     TEXT NOT NULL,
    player_name TEXT NOT NULL,
    score       INTEGER NOT NULL,
    played_at   DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS game_history_room ON game_history (room_id);
CREATE TABLE IF NOT EXISTS rooms (
    id          TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS room_snapshots (
    room_id        TEXT PRIMARY KEY,
    schema_version INTEGER NOT NULL,
    state_json     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS users (
    name TEXT PRIMARY KEY,
    id   TEXT NOT NULL
);
";

/// A [`Store`](crate::Store) over one SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "opened database");
        Self::init(conn)
    }

    /// A private database that disappears with the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn lookup_user(conn: &Connection, name: &str) -> Result<Option<UserId>, StoreError> {
    let id = conn
        .query_row("SELECT id FROM users WHERE name = ?1", [name], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(id.map(UserId::from))
}

impl IdentityResolver for SqliteStore {
    fn resolve_user_id(&self, name: &str) -> Result<UserId, StoreError> {
        let conn = self.conn()?;
        if let Some(id) = lookup_user(&conn, name)? {
            return Ok(id);
        }

        let id = format!("user_{:016x}", rand::random::<u64>());
        match conn.execute(
            "INSERT INTO users (name, id) VALUES (?1, ?2)",
            params![name, id],
        ) {
            Ok(_) => {
                tracing::info!(name, user_id = %id, "new user");
                Ok(UserId::from(id))
            }
            // Another writer claimed the name first.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                lookup_user(&conn, name)?
                    .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl SnapshotStore for SqliteStore {
    fn upsert_room_snapshot(&self, room: &Room) -> Result<(), StoreError> {
        if room.closed {
            tracing::debug!(room_id = %room.id, "not saving a closed room");
            return Ok(());
        }
        let json = serde_json::to_string(&RoomSnapshot::capture(room))?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO rooms (id, owner_id, status) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, status = excluded.status",
            params![room.id.as_str(), room.owner_id.as_str(), room.status.as_str()],
        )?;
        tx.execute(
            "INSERT INTO room_snapshots (room_id, schema_version, state_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(room_id) DO UPDATE SET
                 schema_version = excluded.schema_version,
                 state_json = excluded.state_json",
            params![room.id.as_str(), SCHEMA_VERSION, json],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_room(&self, id: &RoomId) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM rooms WHERE id = ?1", [id.as_str()])?;
        tx.execute("DELETE FROM room_snapshots WHERE room_id = ?1", [id.as_str()])?;
        tx.commit()?;
        tracing::info!(room_id = %id, "room deleted from store");
        Ok(())
    }

    fn load_all_room_snapshots(
        &self,
        config: &GameConfig,
    ) -> Result<BTreeMap<RoomId, Room>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.owner_id, r.status, s.schema_version, s.state_json
             FROM rooms r LEFT JOIN room_snapshots s ON s.room_id = r.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut rooms = BTreeMap::new();
        for row in rows {
            let (id, owner_id, status, version, json) = row?;
            let id = RoomId::from(id);
            let owner_id = UserId::from(owner_id);
            let status = RoomStatus::parse(&status);

            let parsed = match (version, json) {
                (Some(v), Some(json)) if v <= SCHEMA_VERSION => {
                    serde_json::from_str::<RoomSnapshot>(&json).map_err(|e| e.to_string())
                }
                (Some(v), Some(_)) => Err(format!("unsupported schema version {v}")),
                _ => Err("snapshot missing".to_owned()),
            };

            let room = match parsed {
                Ok(mut snapshot) => {
                    // The rooms table is authoritative for identity.
                    snapshot.id = id.clone();
                    snapshot.owner_id = owner_id;
                    snapshot.into_room(config.clone())
                }
                Err(reason) => {
                    tracing::warn!(room_id = %id, %reason, "restoring room as empty shell");
                    shell_room(id.clone(), owner_id, status, config.clone())
                }
            };
            rooms.insert(id, room);
        }
        tracing::info!(count = rooms.len(), "loaded rooms from store");
        Ok(rooms)
    }

    fn append_game_result(
        &self,
        room_id: &RoomId,
        results: &[GameResult],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO game_history (room_id, player_name, score) VALUES (?1, ?2, ?3)",
            )?;
            for result in results {
                stmt.execute(params![room_id.as_str(), result.name, result.score])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn query_room_stats(&self, room_id: &RoomId) -> Result<Vec<PlayerStat>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT player_name, COUNT(*), SUM(score) FROM game_history
             WHERE room_id = ?1
             GROUP BY player_name
             ORDER BY SUM(score) ASC, player_name ASC",
        )?;
        let stats = stmt
            .query_map([room_id.as_str()], |row| {
                Ok(PlayerStat {
                    name: row.get(0)?,
                    games_played: row.get(1)?,
                    total_score: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}
