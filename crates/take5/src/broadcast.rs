//! Turning engine events into outbound messages and store writes.
//!
//! Everything here runs while the caller holds the room lock. Store calls
//! are synchronous; registry work (lobby refresh) is spawned.

use std::sync::Arc;

use take5_protocol::{Codec, Recipient, ServerMessage};
use take5_room::{Event, Room};
use take5_store::GameResult;

use crate::pacing;
use crate::server::ServerState;

/// Delivers `events` for `room` in order.
///
/// A `StateChanged` anywhere in the batch also persists the room and
/// refreshes the lobby once the batch is done.
pub(crate) fn apply_events<C: Codec>(
    state: &Arc<ServerState<C>>,
    room: &Room,
    events: Vec<Event>,
) {
    if room.closed {
        tracing::debug!(room_id = %room.id, "dropping events for a closed room");
        return;
    }
    let mut changed = false;
    for event in events {
        match event {
            Event::Info { to, text } => room.send_to(&to, ServerMessage::Info(text)),
            Event::StateChanged => {
                room.broadcast_state();
                changed = true;
            }
            Event::GameOver { epoch } => {
                record_results(state, room);
                pacing::spawn(Arc::clone(state), room.id.clone(), epoch);
            }
        }
    }
    if changed {
        persist(state, room);
        refresh_lobby(state);
    }
}

/// Writes the room's snapshot. Failures are logged and otherwise ignored.
pub(crate) fn persist<C: Codec>(state: &ServerState<C>, room: &Room) {
    if let Err(e) = state.store.upsert_room_snapshot(room) {
        tracing::warn!(room_id = %room.id, error = %e, "failed to save room snapshot");
    }
}

/// Sends the room's all-time stats to every online player.
pub(crate) fn send_stats<C: Codec>(state: &ServerState<C>, room: &Room) {
    match state.store.query_room_stats(&room.id) {
        Ok(stats) => room.send_to(&Recipient::All, ServerMessage::Stats(stats)),
        Err(e) => {
            tracing::warn!(room_id = %room.id, error = %e, "failed to load room stats");
        }
    }
}

/// Queues a `room_list` push to every lobby subscriber.
pub(crate) fn refresh_lobby<C: Codec>(state: &Arc<ServerState<C>>) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        state.registry.broadcast_room_list().await;
    });
}

fn record_results<C: Codec>(state: &ServerState<C>, room: &Room) {
    let results: Vec<GameResult> = room
        .players
        .values()
        .map(|p| GameResult {
            name: p.name.clone(),
            score: p.score,
        })
        .collect();
    match state.store.append_game_result(&room.id, &results) {
        Ok(()) => {
            tracing::info!(room_id = %room.id, players = results.len(), "game finished");
        }
        Err(e) => {
            tracing::warn!(room_id = %room.id, error = %e, "failed to record game result");
        }
    }
    send_stats(state, room);
}
