//! Per-connection handler: routing, action dispatch and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler
//! plus a writer task that drains the connection's outbound queue. The
//! flow is:
//!   1. Lobby path → subscribe to room lists, ignore inbound frames
//!   2. Any other path → loop: receive actions → dispatch against the
//!      player's room
//!   3. On exit → mark the seat offline (if any) and close the socket

use std::sync::Arc;

use take5_protocol::{
    Action, ActionKind, Codec, Identity, Recipient, RoomId, ServerMessage, UserId,
};
use take5_room::{Event, GameError, Outbound, PlayerHandle, PlayerSender, Room, RoomError};
use take5_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::broadcast::{apply_events, persist, refresh_lobby, send_stats};
use crate::server::{ServerState, LOBBY_PATH};
use crate::Take5Error;

/// Whether the read loop should keep going after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), Take5Error> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, path = conn.path(), "handling new connection");

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), Arc::clone(&state), rx));

    let result = if conn.path() == LOBBY_PATH {
        serve_lobby(&conn, &state, tx.clone()).await
    } else {
        serve_game(&conn, &state, tx.clone()).await
    };

    let _ = tx.send(Outbound::Close);
    let _ = writer.await;
    tracing::debug!(%conn_id, "connection closed");
    result
}

/// Encodes and sends everything queued for this connection, in order,
/// until asked to close or every sender is gone.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<C>>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = rx.recv().await {
        let msg = match outbound {
            Outbound::Message(msg) => msg,
            Outbound::Close => break,
        };
        let bytes = match state.codec.encode(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), error = %e, "failed to encode message");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
            break;
        }
    }
    let _ = conn.close().await;
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// Drop guard that removes a lobby subscriber when the handler exits.
///
/// Since `Drop` is synchronous, the async removal is spawned.
struct LobbyGuard<C: Codec> {
    state: Arc<ServerState<C>>,
    conn_id: ConnectionId,
}

impl<C: Codec> Drop for LobbyGuard<C> {
    fn drop(&mut self) {
        let state = Arc::clone(&self.state);
        let conn_id = self.conn_id;
        tokio::spawn(async move {
            state.registry.unsubscribe(conn_id).await;
        });
    }
}

async fn serve_lobby<C: Codec>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<C>>,
    tx: PlayerSender,
) -> Result<(), Take5Error> {
    let conn_id = conn.id();
    state.registry.subscribe(conn_id, tx).await;
    let _guard = LobbyGuard {
        state: Arc::clone(state),
        conn_id,
    };

    while conn.recv().await?.is_some() {}
    Ok(())
}

// ---------------------------------------------------------------------------
// Game connections
// ---------------------------------------------------------------------------

/// The room and identity a game connection is currently seated as.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Seat {
    room_id: RoomId,
    user_id: UserId,
}

/// Per-connection dispatch state.
///
/// Dropping the session marks its seat offline, which covers clean closes,
/// read errors and panics alike.
struct GameSession<C: Codec> {
    state: Arc<ServerState<C>>,
    conn_id: ConnectionId,
    tx: PlayerSender,
    seat: Option<Seat>,
}

impl<C: Codec> Drop for GameSession<C> {
    fn drop(&mut self) {
        if let Some(seat) = self.seat.take() {
            let state = Arc::clone(&self.state);
            let conn_id = self.conn_id;
            tokio::spawn(async move {
                disconnect_seat(&state, seat, conn_id).await;
            });
        }
    }
}

async fn serve_game<C: Codec>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<C>>,
    tx: PlayerSender,
) -> Result<(), Take5Error> {
    let mut session = GameSession {
        state: Arc::clone(state),
        conn_id: conn.id(),
        tx,
        seat: None,
    };

    while let Some(data) = conn.recv().await? {
        let action: Action = match state.codec.decode(&data) {
            Ok(action) => action,
            Err(e) => {
                tracing::debug!(conn_id = %session.conn_id, error = %e, "undecodable action");
                return Err(e.into());
            }
        };
        if session.dispatch(action).await == Flow::Close {
            break;
        }
    }
    Ok(())
}

/// Marks `seat` offline if `conn_id` still owns it, and tells the room.
async fn disconnect_seat<C: Codec>(
    state: &Arc<ServerState<C>>,
    seat: Seat,
    conn_id: ConnectionId,
) {
    let Some(shared) = state.registry.get(&seat.room_id).await else {
        return;
    };
    let mut room = shared.lock().await;
    if !room.closed && room.disconnect(&seat.user_id, conn_id) {
        apply_events(state, &room, vec![Event::StateChanged]);
    }
}

impl<C: Codec> GameSession<C> {
    fn send(&self, msg: ServerMessage) {
        let _ = self.tx.send(Outbound::Message(msg));
    }

    fn send_error(&self, text: &str) {
        self.send(ServerMessage::Error(text.to_owned()));
    }

    async fn dispatch(&mut self, action: Action) -> Flow {
        tracing::debug!(conn_id = %self.conn_id, kind = ?action.kind, "action");
        match action.kind {
            ActionKind::CreateRoom => {
                self.create_room(action.payload, RoomId::from(action.room_id))
                    .await
            }
            ActionKind::Login => {
                self.login(action.payload, RoomId::from(action.room_id))
                    .await
            }
            ActionKind::LeaveRoom => return self.leave().await,
            ActionKind::DeleteRoom => return self.delete_room().await,
            ActionKind::Ready => self.on_room(|room, user| room.set_ready(user)).await,
            ActionKind::PlayCard => {
                let value = action.value;
                self.on_room(move |room, user| room.play_card(user, value))
                    .await
            }
            ActionKind::ChooseRow => {
                let index = action.value;
                self.on_room(move |room, user| room.choose_row(user, index))
                    .await
            }
            ActionKind::Restart => {
                self.on_room(|room, user| room.manual_restart(user)).await
            }
            ActionKind::ForceRestart => {
                self.on_room(|room, user| room.force_restart(user)).await
            }
            ActionKind::Unknown => {
                tracing::debug!(conn_id = %self.conn_id, "ignoring unknown action");
            }
        }
        Flow::Continue
    }

    /// Looks up (or creates) the id behind a display name. Answers the
    /// client with an error and returns `None` on failure.
    fn resolve_name(&self, name: &str) -> Option<(String, UserId)> {
        let name = name.trim();
        if name.is_empty() {
            self.send_error("A player name is required");
            return None;
        }
        match self.state.store.resolve_user_id(name) {
            Ok(user_id) => Some((name.to_owned(), user_id)),
            Err(e) => {
                tracing::error!(name, error = %e, "identity lookup failed");
                self.send_error("Identity lookup failed");
                None
            }
        }
    }

    async fn create_room(&mut self, name: String, room_id: RoomId) {
        let Some((name, user_id)) = self.resolve_name(&name) else {
            return;
        };
        match self.state.registry.create(room_id.clone(), user_id).await {
            Ok(shared) => persist(&self.state, &*shared.lock().await),
            Err(RoomError::AlreadyExists(_)) => {
                self.send_error("Room already exists");
                return;
            }
            Err(e) => {
                tracing::debug!(conn_id = %self.conn_id, error = %e, "create rejected");
                self.send_error("Invalid room id");
                return;
            }
        }
        self.login(name, room_id).await;
    }

    async fn login(&mut self, name: String, room_id: RoomId) {
        let Some((name, user_id)) = self.resolve_name(&name) else {
            return;
        };
        self.send(ServerMessage::Identity(Identity {
            id: user_id.clone(),
            name: name.clone(),
        }));

        let Some(shared) = self.state.registry.get(&room_id).await else {
            self.send_error("Room not found");
            return;
        };

        let seat = Seat { room_id, user_id };
        if self.seat.as_ref() != Some(&seat) {
            self.release_seat().await;
        }

        let mut room = shared.lock().await;
        if room.closed {
            self.send_error("Room not found");
            return;
        }
        let handle = PlayerHandle::new(self.conn_id, self.tx.clone());
        match room.join(seat.user_id.clone(), name, handle) {
            Ok(_) => {}
            Err(RoomError::RoomFull(_)) => {
                self.send_error("Room is full");
                return;
            }
            Err(e) => {
                tracing::debug!(conn_id = %self.conn_id, error = %e, "join rejected");
                return;
            }
        }
        self.seat = Some(seat);

        room.broadcast_state();
        send_stats(&self.state, &room);
        persist(&self.state, &room);
        drop(room);
        refresh_lobby(&self.state);
    }

    /// Gives up the current seat, as if this connection had dropped.
    async fn release_seat(&mut self) {
        if let Some(seat) = self.seat.take() {
            disconnect_seat(&self.state, seat, self.conn_id).await;
        }
    }

    async fn leave(&mut self) -> Flow {
        let Some(seat) = self.seat.take() else {
            return Flow::Continue;
        };
        if let Some(shared) = self.state.registry.get(&seat.room_id).await {
            let mut room = shared.lock().await;
            if !self.holds_seat(&room, &seat.user_id) {
                return Flow::Close;
            }
            match room.leave(&seat.user_id) {
                Ok(events) => apply_events(&self.state, &room, events),
                Err(e) => tracing::debug!(conn_id = %self.conn_id, error = %e, "leave rejected"),
            }
        }
        Flow::Close
    }

    async fn delete_room(&mut self) -> Flow {
        let Some(seat) = self.seat.clone() else {
            return Flow::Continue;
        };
        match self.state.registry.delete(&seat.room_id, &seat.user_id).await {
            Ok(()) => {
                if let Err(e) = self.state.store.delete_room(&seat.room_id) {
                    tracing::warn!(room_id = %seat.room_id, error = %e, "failed to delete stored room");
                }
                tracing::info!(room_id = %seat.room_id, user_id = %seat.user_id, "room deleted");
                refresh_lobby(&self.state);
                self.seat = None;
                Flow::Close
            }
            Err(RoomError::NotOwner(..)) => {
                self.send(ServerMessage::Info(
                    "Only the owner can close the room".to_owned(),
                ));
                Flow::Continue
            }
            Err(e) => {
                tracing::debug!(conn_id = %self.conn_id, error = %e, "delete rejected");
                Flow::Continue
            }
        }
    }

    /// Whether this connection may still act for `user_id` in `room`: the
    /// room is open and the player's live handle is this connection.
    fn holds_seat(&self, room: &Room, user_id: &UserId) -> bool {
        !room.closed
            && room
                .player(user_id)
                .and_then(|p| p.handle.as_ref())
                .is_some_and(|h| h.conn_id() == self.conn_id)
    }

    /// Runs an engine operation against the seated room and delivers the
    /// outcome. Connections that were replaced by a newer login for the
    /// same user are ignored.
    async fn on_room<F>(&self, op: F)
    where
        F: FnOnce(&mut Room, &UserId) -> Result<Vec<Event>, GameError>,
    {
        let Some(seat) = &self.seat else {
            tracing::debug!(conn_id = %self.conn_id, "action without a seat");
            return;
        };
        let Some(shared) = self.state.registry.get(&seat.room_id).await else {
            return;
        };
        let mut room = shared.lock().await;
        if !self.holds_seat(&room, &seat.user_id) {
            tracing::debug!(conn_id = %self.conn_id, room_id = %seat.room_id, "seat is no longer held by this connection");
            return;
        }
        match op(&mut *room, &seat.user_id) {
            Ok(events) => apply_events(&self.state, &room, events),
            Err(e) => reject(&room, &seat.user_id, e),
        }
    }
}

/// Tells the right people about a refused action. Most refusals are
/// silent.
fn reject(room: &Room, user_id: &UserId, err: GameError) {
    tracing::debug!(room_id = %room.id, %user_id, error = %err, "action rejected");
    match err {
        GameError::NotOwner(_) => room.send_to(
            &Recipient::Player(user_id.clone()),
            ServerMessage::Info("Only the owner can do that".to_owned()),
        ),
        GameError::NotEnoughPlayers { online, required } => room.send_to(
            &Recipient::All,
            ServerMessage::Info(format!(
                "Not enough players online to start ({online}/{required})"
            )),
        ),
        _ => {}
    }
}
