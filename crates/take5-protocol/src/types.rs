//! Core protocol types for the Take 5 wire format.
//!
//! Every type in here travels "on the wire": inbound [`Action`]s are decoded
//! from the browser's JSON frames, outbound [`ServerMessage`]s are encoded
//! back into them. The field names on the wire are camelCase (the browser
//! client was written against them), so most structs carry serde renames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable identifier for a user, issued by the identity store
/// (for example `user_3fa4c1d2`).
///
/// A newtype over `String` so a `UserId` can't be passed where a `RoomId`
/// is expected. `Ord` because players are kept in a `BTreeMap` keyed by id,
/// which gives every projection a deterministic order.
///
/// `#[serde(transparent)]` serializes it as the bare string.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A room identifier. Chosen by whoever creates the room, so it is an
/// arbitrary string rather than a generated number.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Cards and room status
// ---------------------------------------------------------------------------

/// One of the 104 cards. `score` is the penalty ("bullheads") the card is
/// worth when a player absorbs it; it is derived from `value` once and
/// never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub value: u8,
    pub score: u8,
}

/// Where a room is in its lifecycle.
///
/// Serialized in snake_case (`"choosing_row"`), which is also the string
/// stored in the `rooms` table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Players are gathering; no cards are dealt.
    #[default]
    Waiting,
    /// A selection round is open.
    Playing,
    /// Resolution is suspended until one player picks a row to take.
    ChoosingRow,
    /// Every hand is empty; results are being announced.
    Finished,
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Playing => "playing",
            RoomStatus::ChoosingRow => "choosing_row",
            RoomStatus::Finished => "finished",
        }
    }

    /// Parses the stored form. Unknown strings map to `Waiting`.
    pub fn parse(s: &str) -> Self {
        match s {
            "playing" => RoomStatus::Playing,
            "choosing_row" => RoomStatus::ChoosingRow,
            "finished" => RoomStatus::Finished,
            _ => RoomStatus::Waiting,
        }
    }

    /// A game is in progress (cards are dealt and hands matter).
    pub fn is_active(self) -> bool {
        matches!(self, RoomStatus::Playing | RoomStatus::ChoosingRow)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Recipient: who should receive a message?
// ---------------------------------------------------------------------------

/// Specifies who should receive a server message.
///
/// The game engine never talks to sockets. It returns events tagged with a
/// `Recipient`, and the server decides which connections that means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every online player in the room.
    All,
    /// One specific player.
    Player(UserId),
}

// ---------------------------------------------------------------------------
// Inbound: Action
// ---------------------------------------------------------------------------

/// What the client wants to do. This is the `type` field of an [`Action`].
///
/// `#[serde(other)]` on `Unknown` means a `type` string the server doesn't
/// recognize still decodes, it just lands here and is ignored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateRoom,
    Login,
    LeaveRoom,
    DeleteRoom,
    Ready,
    PlayCard,
    ChooseRow,
    Restart,
    ForceRestart,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A client → server message.
///
/// One flat shape for every action:
///
/// ```json
/// { "type": "play_card", "value": 42, "payload": "", "id": "", "roomId": "" }
/// ```
///
/// `#[serde(default)]` on the struct makes every field optional; a missing
/// field becomes zero or the empty string. How the fields are used depends
/// on `kind`: `value` carries a card or row index, `payload` a player name
/// and `room_id` the target room of `create_room` and `login`. `id` is
/// accepted for compatibility and otherwise unused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub value: i64,
    pub payload: String,
    pub id: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

impl Action {
    /// Shorthand for building an action with only a kind set.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Sets `value`, builder style.
    pub fn with_value(mut self, value: i64) -> Self {
        self.value = value;
        self
    }

    /// Sets `payload`, builder style.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets `room_id`, builder style.
    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = room_id.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Outbound: ServerMessage and payloads
// ---------------------------------------------------------------------------

/// A server → client message.
///
/// `#[serde(tag = "type", content = "payload")]` is serde's "adjacently
/// tagged" representation. `ServerMessage::Info("hi".into())` becomes:
///
/// ```json
/// { "type": "info", "payload": "hi" }
/// ```
///
/// which is exactly the `{type, payload}` envelope the browser expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full table as one player sees it.
    State(StatePayload),
    /// A human-readable notice.
    Info(String),
    /// Aggregated results for the room's history.
    Stats(Vec<PlayerStat>),
    /// Who the server thinks this connection is.
    Identity(Identity),
    /// A structural rejection.
    Error(String),
    /// The room was deleted; the payload is always empty.
    RoomClosed(String),
    /// Lobby listing, pushed to `/lobby_ws` subscribers.
    RoomList(Vec<RoomSummary>),
    /// One tick of the automatic restart countdown.
    AutoRestartCountdown(CountdownPayload),
}

/// Payload of a `state` message. `my_hand` and `my_selected_card` are
/// private to the receiving player; everything else is shared.
///
/// `my_selected_card` is the bare card value, omitted when nothing is
/// selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    pub public_state: PublicState,
    pub my_hand: Vec<Card>,
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_selected_card: Option<u8>,
}

/// The part of the table every player may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicState {
    pub rows: Vec<RowView>,
    pub status: RoomStatus,
    pub players: BTreeMap<UserId, PublicPlayer>,
    /// Empty string when nobody is choosing a row.
    pub pending_player_id: String,
    /// `null` on the wire when nobody is choosing a row.
    pub pending_card: Option<Card>,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowView {
    pub cards: Vec<Card>,
}

/// What other players may know about a player: no hand contents, only
/// how many cards are left and whether a card has been picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPlayer {
    pub id: UserId,
    pub name: String,
    pub score: u32,
    pub ready: bool,
    pub has_selected: bool,
    pub hand_size: usize,
    pub is_owner: bool,
    pub is_online: bool,
}

/// One line of the lobby listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub owner_name: String,
    pub player_count: usize,
    pub status: RoomStatus,
}

/// Aggregated results for one player name across a room's finished games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStat {
    pub name: String,
    #[serde(rename = "totalGames")]
    pub games_played: u32,
    #[serde(rename = "totalScore")]
    pub total_score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub name: String,
}

/// The browser client reads the capitalized `Count` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownPayload {
    #[serde(rename = "Count")]
    pub count: u32,
}
