//! The room: one table, its players, and its rows.
//!
//! A `Room` is plain data behind an async mutex (see
//! [`RoomRegistry`](crate::RoomRegistry)). Everything that changes it is a
//! synchronous method: membership operations live here, game transitions
//! in [`engine`](crate::engine). Both return [`Event`]s and leave delivery
//! to the caller.

use std::collections::{BTreeMap, VecDeque};

use take5_protocol::{
    Card, PublicPlayer, PublicState, Recipient, RoomId, RoomStatus,
    RoomSummary, RowView, ServerMessage, StatePayload, UserId,
};
use take5_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::config::{GameConfig, ROW_COUNT};
use crate::engine::Event;
use crate::rules::row_score;
use crate::RoomError;

// ---------------------------------------------------------------------------
// Outbound delivery
// ---------------------------------------------------------------------------

/// What a connection's writer task is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encode and send a message.
    Message(ServerMessage),
    /// Close the socket after everything queued before it was sent.
    Close,
}

/// Channel sender feeding a connection's writer task.
pub type PlayerSender = mpsc::UnboundedSender<Outbound>;

/// A player's live connection: which socket it is, and how to reach it.
///
/// The connection id is what lets a stale socket's cleanup tell that a
/// newer connection has already taken its place.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    conn_id: ConnectionId,
    sender: PlayerSender,
}

impl PlayerHandle {
    pub fn new(conn_id: ConnectionId, sender: PlayerSender) -> Self {
        Self { conn_id, sender }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Queues a message. Returns `false` if the writer task is gone.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.sender.send(Outbound::Message(msg)).is_ok()
    }

    /// Asks the writer task to close the socket.
    pub fn close(&self) {
        let _ = self.sender.send(Outbound::Close);
    }
}

// ---------------------------------------------------------------------------
// Player, Row, PlayAction
// ---------------------------------------------------------------------------

/// One seat at the table.
///
/// A player stays in the room while offline; `handle` is `None` then, and
/// hand, score and selection are kept for when they reconnect.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: UserId,
    pub name: String,
    pub handle: Option<PlayerHandle>,
    /// Unplayed cards, ascending by value.
    pub hand: Vec<Card>,
    /// Penalty points this game. Always `row_score(&captured)`.
    pub score: u32,
    pub ready: bool,
    /// The card picked this round. It stays in `hand` until resolved.
    pub selected: Option<Card>,
    /// Cards absorbed this game.
    pub captured: Vec<Card>,
}

impl Player {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            handle: None,
            hand: Vec::new(),
            score: 0,
            ready: false,
            selected: None,
            captured: Vec::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.handle.is_some()
    }

    /// Adds a taken row to this player's penalty pile.
    pub(crate) fn absorb(&mut self, cards: Vec<Card>) -> u32 {
        let points = row_score(&cards);
        self.score += points;
        self.captured.extend(cards);
        points
    }

    /// Clears everything tied to a single game.
    pub(crate) fn reset_for_game(&mut self) {
        self.hand.clear();
        self.score = 0;
        self.ready = false;
        self.selected = None;
        self.captured.clear();
    }
}

/// A row on the table. Cards are only ever appended, so the tail is the
/// highest value placed on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cards: Vec<Card>,
}

impl Row {
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn tail(&self) -> Option<Card> {
        self.cards.last().copied()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub(crate) fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Replaces the row with `[card]` and returns what was there.
    pub(crate) fn restart_with(&mut self, card: Card) -> Vec<Card> {
        std::mem::replace(&mut self.cards, vec![card])
    }

    pub(crate) fn clear(&mut self) {
        self.cards.clear();
    }
}

/// A selected card tagged with its owner, waiting to be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayAction {
    pub player_id: UserId,
    pub card: Card,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// What [`Room::join`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new seat was created.
    Joined,
    /// An existing seat got a new connection; hand and score untouched.
    Rejoined,
}

/// One table.
///
/// Fields are public so the persistence layer can rebuild a room from a
/// snapshot. Game code should go through the methods; they keep the card
/// universe partitioned across `deck`, hands, `rows`, captured piles and
/// `pending`.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub owner_id: UserId,
    pub players: BTreeMap<UserId, Player>,
    pub rows: [Row; ROW_COUNT],
    pub status: RoomStatus,
    /// Undealt cards.
    pub deck: Vec<Card>,
    /// Plays of the current round, ascending by value. While a row choice
    /// is pending its action stays at the head.
    pub turn_queue: VecDeque<PlayAction>,
    /// The play blocked on a row choice.
    pub pending: Option<PlayAction>,
    /// Bumped whenever a game is dealt or the table is reset.
    pub epoch: u64,
    pub config: GameConfig,
    /// Set when the owner deletes the room. A closed room takes no more
    /// actions and is never written to storage again.
    pub closed: bool,
}

impl Room {
    pub fn new(id: RoomId, owner_id: UserId, config: GameConfig) -> Self {
        Self {
            id,
            owner_id,
            players: BTreeMap::new(),
            rows: Default::default(),
            status: RoomStatus::Waiting,
            deck: Vec::new(),
            turn_queue: VecDeque::new(),
            pending: None,
            epoch: 0,
            config,
            closed: false,
        }
    }

    pub fn is_owner(&self, user_id: &UserId) -> bool {
        !self.owner_id.is_empty() && &self.owner_id == user_id
    }

    pub fn player(&self, user_id: &UserId) -> Option<&Player> {
        self.players.get(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.players.values().filter(|p| p.is_online()).count()
    }

    /// Display name for log lines and notices.
    pub fn display_name(&self, user_id: &UserId) -> String {
        self.players
            .get(user_id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "unknown player".to_owned())
    }

    // -- Membership --

    /// Seats a user, or reattaches them if they already have a seat.
    ///
    /// A returning user keeps hand, score, ready flag and selection exactly
    /// as they were; only the connection and display name are replaced.
    pub fn join(
        &mut self,
        user_id: UserId,
        name: impl Into<String>,
        handle: PlayerHandle,
    ) -> Result<JoinOutcome, RoomError> {
        let name = name.into();
        if let Some(player) = self.players.get_mut(&user_id) {
            player.name = name;
            player.handle = Some(handle);
            tracing::info!(room_id = %self.id, %user_id, "player rejoined");
            return Ok(JoinOutcome::Rejoined);
        }

        if self.players.len() >= self.config.max_players {
            return Err(RoomError::RoomFull(self.id.clone()));
        }

        let mut player = Player::new(user_id.clone(), name);
        player.handle = Some(handle);
        self.players.insert(user_id.clone(), player);
        if self.owner_id.is_empty() {
            self.owner_id = user_id.clone();
        }
        tracing::info!(room_id = %self.id, %user_id, "player joined");
        Ok(JoinOutcome::Joined)
    }

    /// Voluntary departure.
    ///
    /// Between games the seat is removed and ownership moves on if needed.
    /// During a game the player only goes offline, so they can come back
    /// to the same hand.
    pub fn leave(&mut self, user_id: &UserId) -> Result<Vec<Event>, RoomError> {
        if !self.players.contains_key(user_id) {
            return Err(RoomError::NotInRoom(user_id.clone(), self.id.clone()));
        }

        let mut events = Vec::new();
        if self.status.is_active() {
            let name = self.display_name(user_id);
            if let Some(player) = self.players.get_mut(user_id) {
                player.handle = None;
            }
            events.push(Event::info(format!(
                "{name} left for now (hand kept)"
            )));
            tracing::info!(room_id = %self.id, %user_id, "player left mid-game");
        } else {
            self.players.remove(user_id);
            if &self.owner_id == user_id {
                match self.players.values().next() {
                    Some(next) => {
                        self.owner_id = next.id.clone();
                        events.push(Event::info(format!(
                            "The owner left, {} is the new owner",
                            next.name
                        )));
                    }
                    None => self.status = RoomStatus::Waiting,
                }
            }
            tracing::info!(room_id = %self.id, %user_id, "player left");
        }
        events.push(Event::StateChanged);
        Ok(events)
    }

    /// Transport-level departure. Marks the player offline, but only if
    /// their current handle is still `conn_id`. Returns whether anything
    /// changed.
    pub fn disconnect(&mut self, user_id: &UserId, conn_id: ConnectionId) -> bool {
        let Some(player) = self.players.get_mut(user_id) else {
            return false;
        };
        match &player.handle {
            Some(handle) if handle.conn_id() == conn_id => {
                player.handle = None;
                tracing::info!(room_id = %self.id, %user_id, %conn_id, "player disconnected");
                true
            }
            _ => false,
        }
    }

    // -- Projections --

    /// The table as everyone may see it.
    pub fn public_state(&self) -> PublicState {
        let players = self
            .players
            .iter()
            .map(|(id, p)| {
                let view = PublicPlayer {
                    id: id.clone(),
                    name: p.name.clone(),
                    score: p.score,
                    ready: p.ready,
                    has_selected: p.selected.is_some(),
                    hand_size: p.hand.len(),
                    is_owner: &self.owner_id == id,
                    is_online: p.is_online(),
                };
                (id.clone(), view)
            })
            .collect();

        PublicState {
            rows: self
                .rows
                .iter()
                .map(|r| RowView {
                    cards: r.cards().to_vec(),
                })
                .collect(),
            status: self.status,
            players,
            pending_player_id: self
                .pending
                .as_ref()
                .map(|p| p.player_id.to_string())
                .unwrap_or_default(),
            pending_card: self.pending.as_ref().map(|p| p.card),
            owner_id: self.owner_id.clone(),
        }
    }

    /// The `state` payload for one player, or `None` if they have no seat.
    pub fn state_for(&self, user_id: &UserId) -> Option<StatePayload> {
        let player = self.players.get(user_id)?;
        Some(StatePayload {
            public_state: self.public_state(),
            my_hand: player.hand.clone(),
            room_id: self.id.clone(),
            my_selected_card: player.selected.map(|c| c.value),
        })
    }

    /// Lobby line for this room.
    pub fn summary(&self) -> RoomSummary {
        let owner_name = match self.players.get(&self.owner_id) {
            Some(owner) => owner.name.clone(),
            None if self.owner_id.is_empty() => "no owner".to_owned(),
            None => self.owner_id.to_string(),
        };
        RoomSummary {
            id: self.id.clone(),
            owner_name,
            player_count: self.players.len(),
            status: self.status,
        }
    }

    /// Every card value currently accounted for: deck, hands, rows,
    /// captured piles and the pending play. During a game this is exactly
    /// `1..=104` once sorted.
    pub fn card_census(&self) -> Vec<u8> {
        let mut values: Vec<u8> = self.deck.iter().map(|c| c.value).collect();
        for player in self.players.values() {
            values.extend(player.hand.iter().map(|c| c.value));
            values.extend(player.captured.iter().map(|c| c.value));
        }
        for row in &self.rows {
            values.extend(row.cards().iter().map(|c| c.value));
        }
        if let Some(pending) = &self.pending {
            values.push(pending.card.value);
        }
        values
    }

    // -- Delivery --

    /// Queues `msg` for the recipient's online connections.
    pub fn send_to(&self, to: &Recipient, msg: ServerMessage) {
        match to {
            Recipient::All => {
                for handle in self.online_handles() {
                    handle.send(msg.clone());
                }
            }
            Recipient::Player(id) => {
                if let Some(handle) =
                    self.players.get(id).and_then(|p| p.handle.as_ref())
                {
                    handle.send(msg);
                }
            }
        }
    }

    /// Queues a personalised `state` message for every online player.
    pub fn broadcast_state(&self) {
        for (id, player) in &self.players {
            if let (Some(handle), Some(state)) =
                (player.handle.as_ref(), self.state_for(id))
            {
                handle.send(ServerMessage::State(state));
            }
        }
    }

    pub fn online_handles(&self) -> impl Iterator<Item = &PlayerHandle> {
        self.players.values().filter_map(|p| p.handle.as_ref())
    }
}
