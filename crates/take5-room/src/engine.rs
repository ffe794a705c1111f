//! Turn resolution engine.
//!
//! The game's state machine, as methods on [`Room`]:
//!
//! ```text
//! waiting ──ready──▶ playing ⇄ choosing_row ──last card──▶ finished
//!    ▲                  ▲                                     │
//!    └────── restart ───┼──────── automatic restart ──────────┘
//!                       └──────── force restart (from anywhere)
//! ```
//!
//! Every method runs under the room's lock, never awaits, and never
//! touches a socket or the database. It either rejects the action with a
//! [`GameError`] or returns the [`Event`]s the caller must apply.

use std::collections::VecDeque;

use rand::Rng;
use take5_protocol::{Recipient, RoomStatus, UserId};

use crate::config::ROW_COUNT;
use crate::room::{PlayAction, Room, Row};
use crate::rules::{self, find_best_row};
use crate::GameError;

/// An effect produced by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A human-readable notice.
    Info { to: Recipient, text: String },
    /// The room changed: push state to its players, persist a snapshot,
    /// refresh the lobby.
    StateChanged,
    /// The last card of a game was placed. `epoch` identifies the game so
    /// follow-up work can tell if the table has moved on.
    GameOver { epoch: u64 },
}

impl Event {
    /// A notice for the whole room.
    pub fn info(text: impl Into<String>) -> Self {
        Event::Info {
            to: Recipient::All,
            text: text.into(),
        }
    }
}

impl Room {
    /// Marks a player ready. Deals when every online player is ready and
    /// enough of them are.
    pub fn set_ready(&mut self, user_id: &UserId) -> Result<Vec<Event>, GameError> {
        if self.status != RoomStatus::Waiting {
            return Err(GameError::WrongStatus(self.status));
        }
        let player = self
            .players
            .get_mut(user_id)
            .ok_or_else(|| GameError::NotInRoom(user_id.clone()))?;
        player.ready = true;

        let mut online = self.players.values().filter(|p| p.is_online());
        let ready = online.clone().filter(|p| p.ready).count();
        let all_ready = online.all(|p| p.ready);

        if all_ready && ready >= self.config.min_players {
            Ok(self.start_game())
        } else {
            Ok(vec![Event::StateChanged])
        }
    }

    /// Deals a new game with a freshly shuffled deck.
    pub fn start_game(&mut self) -> Vec<Event> {
        self.start_game_with(&mut rand::rng())
    }

    /// Deals a new game using `rng` for the shuffle.
    ///
    /// With fewer than `min_players` online the room goes back to
    /// `waiting` and nothing is dealt.
    pub fn start_game_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Event> {
        let online = self.online_count();
        if online < self.config.min_players {
            self.status = RoomStatus::Waiting;
            tracing::debug!(room_id = %self.id, online, "not enough players to deal");
            return vec![
                Event::info("Not enough players to start"),
                Event::StateChanged,
            ];
        }

        let mut deck = rules::build_deck_with(rng);
        let hand_size = self.config.hand_size;
        for player in self.players.values_mut() {
            player.reset_for_game();
            if player.is_online() {
                let take = hand_size.min(deck.len());
                let mut hand = deck.split_off(deck.len() - take);
                hand.sort_unstable_by_key(|c| c.value);
                player.hand = hand;
            }
        }
        for row in &mut self.rows {
            *row = deck.pop().map(|c| Row::from_cards(vec![c])).unwrap_or_default();
        }

        self.deck = deck;
        self.turn_queue.clear();
        self.pending = None;
        self.epoch += 1;
        self.status = RoomStatus::Playing;
        tracing::info!(room_id = %self.id, players = online, epoch = self.epoch, "game started");
        vec![Event::StateChanged]
    }

    /// Selects a card for this round. Once every player still holding
    /// cards has selected, the round resolves.
    pub fn play_card(
        &mut self,
        user_id: &UserId,
        value: i64,
    ) -> Result<Vec<Event>, GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongStatus(self.status));
        }
        if !rules::is_valid_value(value) {
            return Err(GameError::InvalidCard(value));
        }
        let value = value as u8;
        let player = self
            .players
            .get_mut(user_id)
            .ok_or_else(|| GameError::NotInRoom(user_id.clone()))?;
        if player.selected.is_some() {
            return Err(GameError::AlreadySelected);
        }
        let card = player
            .hand
            .iter()
            .copied()
            .find(|c| c.value == value)
            .ok_or(GameError::CardNotInHand(value))?;
        player.selected = Some(card);

        let round_complete = self
            .players
            .values()
            .all(|p| p.hand.is_empty() || p.selected.is_some());
        if !round_complete {
            return Ok(vec![Event::StateChanged]);
        }

        let mut events = Vec::new();
        self.prepare_turn_resolution();
        self.process_turn_queue(&mut events);
        Ok(events)
    }

    /// Moves every selection into the turn queue, lowest card first.
    fn prepare_turn_resolution(&mut self) {
        let mut plays: Vec<PlayAction> = self
            .players
            .iter_mut()
            .filter_map(|(id, p)| {
                p.selected.take().map(|card| PlayAction {
                    player_id: id.clone(),
                    card,
                })
            })
            .collect();
        plays.sort_unstable_by_key(|a| a.card.value);
        self.turn_queue = VecDeque::from(plays);
    }

    /// Places queued cards until the queue is empty or a player has to
    /// choose a row.
    fn process_turn_queue(&mut self, events: &mut Vec<Event>) {
        while let Some(action) = self.turn_queue.front().cloned() {
            let card = action.card;
            if let Some(player) = self.players.get_mut(&action.player_id) {
                player.hand.retain(|c| c.value != card.value);
            }

            let Some(idx) = find_best_row(&self.rows, card.value) else {
                let name = self.display_name(&action.player_id);
                self.status = RoomStatus::ChoosingRow;
                self.pending = Some(action);
                events.push(Event::info(format!(
                    "{name}'s {} is lower than every row, {name} must take a row",
                    card.value
                )));
                events.push(Event::StateChanged);
                return;
            };

            if self.rows[idx].len() >= self.config.bust_threshold {
                let taken = self.rows[idx].restart_with(card);
                let name = self.display_name(&action.player_id);
                if let Some(player) = self.players.get_mut(&action.player_id) {
                    let points = player.absorb(taken);
                    events.push(Event::info(format!(
                        "{name} played {} on full row {} and takes {points} points",
                        card.value,
                        idx + 1
                    )));
                }
            } else {
                self.rows[idx].push(card);
            }
            self.turn_queue.pop_front();
        }

        self.pending = None;
        if self.players.values().all(|p| p.hand.is_empty()) {
            self.status = RoomStatus::Finished;
            tracing::info!(room_id = %self.id, epoch = self.epoch, "game finished");
            events.push(Event::StateChanged);
            events.push(Event::GameOver { epoch: self.epoch });
        } else {
            self.status = RoomStatus::Playing;
            events.push(Event::StateChanged);
        }
    }

    /// The suspended player takes a row; resolution resumes.
    pub fn choose_row(
        &mut self,
        user_id: &UserId,
        row: i64,
    ) -> Result<Vec<Event>, GameError> {
        if self.status != RoomStatus::ChoosingRow {
            return Err(GameError::WrongStatus(self.status));
        }
        let pending = self.pending.clone().ok_or(GameError::NoPendingChoice)?;
        if &pending.player_id != user_id {
            return Err(GameError::NotYourChoice(pending.player_id));
        }
        let idx = usize::try_from(row)
            .ok()
            .filter(|&i| i < ROW_COUNT)
            .ok_or(GameError::InvalidRow(row))?;

        let taken = self.rows[idx].restart_with(pending.card);
        let name = self.display_name(user_id);
        let mut events = Vec::new();
        if let Some(player) = self.players.get_mut(user_id) {
            let points = player.absorb(taken);
            events.push(Event::info(format!(
                "{name} takes row {} for {points} points",
                idx + 1
            )));
        }
        self.turn_queue.pop_front();
        self.pending = None;
        self.process_turn_queue(&mut events);
        Ok(events)
    }

    /// Owner wipes the table and deals again, from any status.
    pub fn force_restart(&mut self, requester: &UserId) -> Result<Vec<Event>, GameError> {
        if !self.is_owner(requester) {
            return Err(GameError::NotOwner(requester.clone()));
        }
        let online = self.online_count();
        if online < self.config.min_players {
            return Err(GameError::NotEnoughPlayers {
                online,
                required: self.config.min_players,
            });
        }

        self.clear_table();
        let mut events = vec![Event::info(format!(
            "{} forced a restart",
            self.display_name(requester)
        ))];
        events.extend(self.start_game());
        Ok(events)
    }

    /// Owner sends a finished room back to `waiting` without dealing.
    /// Cancels a pending automatic restart.
    pub fn manual_restart(&mut self, requester: &UserId) -> Result<Vec<Event>, GameError> {
        if self.status != RoomStatus::Finished {
            return Err(GameError::WrongStatus(self.status));
        }
        if !self.is_owner(requester) {
            return Err(GameError::NotOwner(requester.clone()));
        }
        self.clear_table();
        self.epoch += 1;
        self.status = RoomStatus::Waiting;
        tracing::info!(room_id = %self.id, "room reset to waiting");
        Ok(vec![Event::StateChanged])
    }

    fn clear_table(&mut self) {
        for player in self.players.values_mut() {
            player.reset_for_game();
        }
        for row in &mut self.rows {
            row.clear();
        }
        self.deck.clear();
        self.turn_queue.clear();
        self.pending = None;
    }
}
