//! The stored form of a room.
//!
//! Version 1 keeps cards as bare values; penalties are recomputed on load,
//! so a change to the scoring table never disagrees with old data. Every
//! field but `id` has a default, which lets partial or older snapshots load.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use take5_protocol::{Card, RoomId, RoomStatus, UserId};
use take5_room::{GameConfig, PlayAction, Player, ROW_COUNT, Room, Row, rules};

/// Current snapshot schema version, stored next to each snapshot.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomId,
    #[serde(default)]
    pub owner_id: UserId,
    #[serde(default)]
    pub status: RoomStatus,
    #[serde(default)]
    pub players: Vec<PlayerSnapshot>,
    #[serde(default)]
    pub rows: Vec<Vec<u8>>,
    #[serde(default)]
    pub deck: Vec<u8>,
    #[serde(default)]
    pub turn_queue: Vec<PlaySnapshot>,
    #[serde(default)]
    pub pending: Option<PlaySnapshot>,
    #[serde(default)]
    pub epoch: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSnapshot {
    pub id: UserId,
    pub name: String,
    pub hand: Vec<u8>,
    pub score: u32,
    pub ready: bool,
    pub selected: Option<u8>,
    pub captured: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaySnapshot {
    pub player_id: UserId,
    pub card: u8,
}

fn values(cards: &[Card]) -> Vec<u8> {
    cards.iter().map(|c| c.value).collect()
}

/// Values outside the deck are dropped.
fn cards(values: &[u8]) -> Vec<Card> {
    values
        .iter()
        .copied()
        .filter(|&v| rules::is_valid_value(i64::from(v)))
        .map(rules::card)
        .collect()
}

impl PlaySnapshot {
    fn capture(action: &PlayAction) -> Self {
        Self {
            player_id: action.player_id.clone(),
            card: action.card.value,
        }
    }

    fn restore(&self) -> Option<PlayAction> {
        rules::is_valid_value(i64::from(self.card)).then(|| PlayAction {
            player_id: self.player_id.clone(),
            card: rules::card(self.card),
        })
    }
}

impl RoomSnapshot {
    /// Captures everything about `room` except live connections.
    pub fn capture(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            owner_id: room.owner_id.clone(),
            status: room.status,
            players: room
                .players
                .values()
                .map(|p| PlayerSnapshot {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    hand: values(&p.hand),
                    score: p.score,
                    ready: p.ready,
                    selected: p.selected.map(|c| c.value),
                    captured: values(&p.captured),
                })
                .collect(),
            rows: room.rows.iter().map(|r| values(r.cards())).collect(),
            deck: values(&room.deck),
            turn_queue: room.turn_queue.iter().map(PlaySnapshot::capture).collect(),
            pending: room.pending.as_ref().map(PlaySnapshot::capture),
            epoch: room.epoch,
        }
    }

    /// Rebuilds the room. Every player comes back offline.
    pub fn into_room(self, config: GameConfig) -> Room {
        let mut room = Room::new(self.id, self.owner_id, config);
        room.status = self.status;
        room.players = self
            .players
            .into_iter()
            .map(|p| {
                let mut player = Player::new(p.id.clone(), p.name);
                player.hand = cards(&p.hand);
                player.hand.sort_unstable_by_key(|c| c.value);
                player.score = p.score;
                player.ready = p.ready;
                player.selected = p
                    .selected
                    .and_then(|v| player.hand.iter().copied().find(|c| c.value == v));
                player.captured = cards(&p.captured);
                (p.id, player)
            })
            .collect::<BTreeMap<_, _>>();
        for (row, stored) in room.rows.iter_mut().zip(self.rows.iter().take(ROW_COUNT)) {
            *row = Row::from_cards(cards(stored));
        }
        room.deck = cards(&self.deck);
        room.turn_queue = self
            .turn_queue
            .iter()
            .filter_map(PlaySnapshot::restore)
            .collect::<VecDeque<_>>();
        room.pending = self.pending.as_ref().and_then(PlaySnapshot::restore);
        room.epoch = self.epoch;
        room
    }
}

/// An empty room carrying only what the `rooms` table knows.
pub fn shell_room(id: RoomId, owner_id: UserId, status: RoomStatus, config: GameConfig) -> Room {
    let mut room = Room::new(id, owner_id, config);
    room.status = status;
    room
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_snapshot_defaults() {
        let snap: RoomSnapshot = serde_json::from_str(r#"{"id":"r9"}"#).unwrap();
        assert_eq!(snap.id, RoomId::from("r9"));
        assert_eq!(snap.status, RoomStatus::Waiting);
        assert!(snap.players.is_empty());

        let room = snap.into_room(GameConfig::default());
        assert!(room.rows.iter().all(Row::is_empty));
        assert_eq!(room.epoch, 0);
    }

    #[test]
    fn test_snapshot_without_id_is_rejected() {
        assert!(serde_json::from_str::<RoomSnapshot>(r#"{"status":"playing"}"#).is_err());
    }

    #[test]
    fn test_penalties_recomputed_and_bad_values_dropped() {
        let snap = RoomSnapshot {
            id: RoomId::from("r"),
            rows: vec![vec![55, 0, 200], vec![10]],
            ..RoomSnapshot::default()
        };
        let room = snap.into_room(GameConfig::default());
        assert_eq!(room.rows[0].cards(), &[rules::card(55)]);
        assert_eq!(room.rows[0].cards()[0].score, 7);
        assert_eq!(room.rows[1].cards(), &[rules::card(10)]);
        assert!(room.rows[2].is_empty());
    }

    #[test]
    fn test_selected_card_must_be_in_hand() {
        let snap = RoomSnapshot {
            id: RoomId::from("r"),
            players: vec![PlayerSnapshot {
                id: UserId::from("u"),
                name: "U".into(),
                hand: vec![9, 4],
                selected: Some(77),
                ..PlayerSnapshot::default()
            }],
            ..RoomSnapshot::default()
        };
        let room = snap.into_room(GameConfig::default());
        let player = &room.players[&UserId::from("u")];
        assert_eq!(player.hand, vec![rules::card(4), rules::card(9)]);
        assert_eq!(player.selected, None);
        assert!(!player.is_online());
    }

    #[test]
    fn test_shell_room_keeps_status() {
        let room = shell_room(
            RoomId::from("r"),
            UserId::from("o"),
            RoomStatus::Finished,
            GameConfig::default(),
        );
        assert_eq!(room.status, RoomStatus::Finished);
        assert!(room.players.is_empty());
    }
}
