//! End-of-game announcements and the automatic restart.
//!
//! The sequence sleeps without holding the room lock. Each phase re-locks
//! the room and stops quietly if the room is gone, no longer `finished`,
//! or has moved on to another game.

use std::sync::Arc;
use std::time::Duration;

use take5_protocol::{Codec, CountdownPayload, Recipient, RoomId, RoomStatus, ServerMessage};
use take5_room::Room;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

use crate::broadcast::apply_events;
use crate::server::ServerState;

/// Timing of the end-of-game sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    /// Pause between the last card landing and "Game over!".
    pub reveal_delay: Duration,
    /// Pause between "Game over!" and the score summary.
    pub results_delay: Duration,
    /// Number of countdown ticks before the next game. Zero restarts
    /// right after the summary.
    pub countdown: u32,
    pub countdown_tick: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            reveal_delay: Duration::from_secs(2),
            results_delay: Duration::from_secs(2),
            countdown: 5,
            countdown_tick: Duration::from_secs(1),
        }
    }
}

/// Starts the sequence for the game that ended with `epoch`.
pub(crate) fn spawn<C: Codec>(
    state: Arc<ServerState<C>>,
    room_id: RoomId,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run(&state, &room_id, epoch).await;
    })
}

async fn run<C: Codec>(state: &Arc<ServerState<C>>, room_id: &RoomId, epoch: u64) {
    let pacing = &state.pacing;

    tokio::time::sleep(pacing.reveal_delay).await;
    let Some(room) = lock_if_current(state, room_id, epoch).await else {
        return;
    };
    room.send_to(&Recipient::All, ServerMessage::Info("Game over!".to_owned()));
    drop(room);

    tokio::time::sleep(pacing.results_delay).await;
    let Some(room) = lock_if_current(state, room_id, epoch).await else {
        return;
    };
    room.send_to(&Recipient::All, ServerMessage::Info(score_line(&room)));
    if room.online_count() < room.config.min_players {
        room.send_to(
            &Recipient::All,
            ServerMessage::Info(
                "Not enough players online to start the next game automatically".to_owned(),
            ),
        );
        tracing::debug!(room_id = %room_id, epoch, "auto restart skipped");
        return;
    }
    drop(room);

    for count in (1..=pacing.countdown).rev() {
        let Some(room) = lock_if_current(state, room_id, epoch).await else {
            return;
        };
        room.send_to(
            &Recipient::All,
            ServerMessage::AutoRestartCountdown(CountdownPayload { count }),
        );
        drop(room);
        tokio::time::sleep(pacing.countdown_tick).await;
    }

    let Some(mut room) = lock_if_current(state, room_id, epoch).await else {
        return;
    };
    tracing::info!(room_id = %room_id, "automatic restart");
    let events = room.start_game();
    apply_events(state, &room, events);
}

/// Locks the room if it is still open and shows the game that ended with
/// `epoch`.
async fn lock_if_current<C: Codec>(
    state: &ServerState<C>,
    room_id: &RoomId,
    epoch: u64,
) -> Option<OwnedMutexGuard<Room>> {
    let room = state.registry.get(room_id).await?.lock_owned().await;
    if !room.closed && room.status == RoomStatus::Finished && room.epoch == epoch {
        Some(room)
    } else {
        tracing::debug!(room_id = %room_id, epoch, "end-of-game sequence is stale");
        None
    }
}

fn score_line(room: &Room) -> String {
    let scores: Vec<String> = room
        .players
        .values()
        .map(|p| format!("{}: {}", p.name, p.score))
        .collect();
    format!("Scores: {}", scores.join(" | "))
}
