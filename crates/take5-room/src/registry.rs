//! Room registry: every live room plus the lobby subscribers.
//!
//! Locking rules:
//! - the registry map and the lobby set each have their own lock;
//! - each room has its own lock, held for a whole transition;
//! - the registry lock may be held while taking a room lock (summaries),
//!   never the other way round. Anything running under a room lock that
//!   needs the registry spawns a task instead of awaiting.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use take5_protocol::{RoomId, RoomSummary, ServerMessage, UserId};
use take5_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::config::GameConfig;
use crate::room::{Outbound, PlayerSender, Room};
use crate::RoomError;

/// A room behind its lock, shareable across connection tasks.
pub type SharedRoom = Arc<Mutex<Room>>;

/// All rooms of one server.
pub struct RoomRegistry {
    rooms: Mutex<BTreeMap<RoomId, SharedRoom>>,
    lobby: Mutex<HashMap<ConnectionId, PlayerSender>>,
    config: GameConfig,
}

impl RoomRegistry {
    pub fn new(config: GameConfig) -> Self {
        Self {
            rooms: Mutex::new(BTreeMap::new()),
            lobby: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Registers an empty room in `waiting`.
    pub async fn create(
        &self,
        id: RoomId,
        owner_id: UserId,
    ) -> Result<SharedRoom, RoomError> {
        if id.is_empty() {
            return Err(RoomError::InvalidRoomId);
        }
        let mut rooms = self.rooms.lock().await;
        if rooms.contains_key(&id) {
            return Err(RoomError::AlreadyExists(id));
        }
        let room = Arc::new(Mutex::new(Room::new(
            id.clone(),
            owner_id.clone(),
            self.config.clone(),
        )));
        rooms.insert(id.clone(), Arc::clone(&room));
        tracing::info!(room_id = %id, owner_id = %owner_id, "room created");
        Ok(room)
    }

    pub async fn get(&self, id: &RoomId) -> Option<SharedRoom> {
        self.rooms.lock().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &RoomId) -> Option<SharedRoom> {
        let removed = self.rooms.lock().await.remove(id);
        if removed.is_some() {
            tracing::info!(room_id = %id, "room removed");
        }
        removed
    }

    /// Installs rooms recovered from storage. Existing ids are kept.
    /// Every restored player is treated as offline.
    pub async fn restore(&self, restored: impl IntoIterator<Item = Room>) -> usize {
        let mut rooms = self.rooms.lock().await;
        let mut count = 0;
        for mut room in restored {
            for player in room.players.values_mut() {
                player.handle = None;
            }
            if rooms.contains_key(&room.id) {
                tracing::warn!(room_id = %room.id, "skipping duplicate restored room");
                continue;
            }
            rooms.insert(room.id.clone(), Arc::new(Mutex::new(room)));
            count += 1;
        }
        tracing::info!(count, "rooms restored");
        count
    }

    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }

    /// Owner-only deletion.
    ///
    /// Online players get an `info`, then `room_closed`, then their socket
    /// is closed. The room is marked closed before its lock is released, so
    /// a task that fetched it earlier sees the flag. It leaves the registry;
    /// removing its snapshot is up to the caller.
    pub async fn delete(
        &self,
        id: &RoomId,
        requester: &UserId,
    ) -> Result<(), RoomError> {
        let room = self
            .get(id)
            .await
            .ok_or_else(|| RoomError::NotFound(id.clone()))?;
        {
            let mut room = room.lock().await;
            if !room.is_owner(requester) {
                return Err(RoomError::NotOwner(requester.clone(), id.clone()));
            }
            for handle in room.online_handles() {
                handle.send(ServerMessage::Info(
                    "The owner closed the room".to_owned(),
                ));
                handle.send(ServerMessage::RoomClosed(String::new()));
                handle.close();
            }
            for player in room.players.values_mut() {
                player.handle = None;
            }
            room.closed = true;
        }
        self.remove(id).await;
        Ok(())
    }

    /// Lobby lines for every room, sorted by id.
    ///
    /// Rooms are locked one at a time.
    pub async fn summaries(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.lock().await;
        let mut list = Vec::with_capacity(rooms.len());
        for room in rooms.values() {
            list.push(room.lock().await.summary());
        }
        list
    }

    // -- Lobby --

    /// Adds a lobby connection and sends it the current list.
    pub async fn subscribe(&self, conn_id: ConnectionId, sender: PlayerSender) {
        let list = self.summaries().await;
        let _ = sender.send(Outbound::Message(ServerMessage::RoomList(list)));
        self.lobby.lock().await.insert(conn_id, sender);
        tracing::debug!(%conn_id, "lobby subscriber added");
    }

    pub async fn unsubscribe(&self, conn_id: ConnectionId) {
        if self.lobby.lock().await.remove(&conn_id).is_some() {
            tracing::debug!(%conn_id, "lobby subscriber removed");
        }
    }

    pub async fn lobby_len(&self) -> usize {
        self.lobby.lock().await.len()
    }

    /// Pushes a fresh `room_list` to every lobby subscriber. Subscribers
    /// whose writer is gone are dropped.
    pub async fn broadcast_room_list(&self) {
        let list = self.summaries().await;
        let msg = ServerMessage::RoomList(list);
        let mut lobby = self.lobby.lock().await;
        lobby.retain(|_, sender| sender.send(Outbound::Message(msg.clone())).is_ok());
    }

    /// Closes every lobby subscriber and every online player, then empties
    /// the registry.
    pub async fn shutdown(&self) {
        for (_, sender) in self.lobby.lock().await.drain() {
            let _ = sender.send(Outbound::Close);
        }
        let rooms = std::mem::take(&mut *self.rooms.lock().await);
        for room in rooms.values() {
            let mut room = room.lock().await;
            for handle in room.online_handles() {
                handle.close();
            }
            for player in room.players.values_mut() {
                player.handle = None;
            }
        }
        tracing::info!(rooms = rooms.len(), "registry shut down");
    }
}
