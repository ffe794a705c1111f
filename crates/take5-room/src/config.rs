//! Game configuration and table constants.

use serde::{Deserialize, Serialize};

/// Number of rows on the table. Fixed by the game; the wire format and the
/// snapshot schema both assume it.
pub const ROW_COUNT: usize = 4;

/// Size of the card universe. Values run `1..=DECK_SIZE`.
pub const DECK_SIZE: usize = 104;

/// Tunable rules for a room.
///
/// The defaults are the standard game. `max_players * hand_size + ROW_COUNT`
/// must not exceed [`DECK_SIZE`], otherwise dealing runs out of cards;
/// [`GameConfig::fits_deck`] checks that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Cards dealt to each online player.
    pub hand_size: usize,

    /// Online players required to deal.
    pub min_players: usize,

    /// Players (online or not) a room will hold.
    pub max_players: usize,

    /// A row holding this many cards is taken by the next card placed on it.
    pub bust_threshold: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            hand_size: 10,
            min_players: 2,
            max_players: 10,
            bust_threshold: 5,
        }
    }
}

impl GameConfig {
    /// Returns `true` if a full table can be dealt from one deck.
    pub fn fits_deck(&self) -> bool {
        self.max_players
            .checked_mul(self.hand_size)
            .and_then(|cards| cards.checked_add(ROW_COUNT))
            .is_some_and(|needed| needed <= DECK_SIZE)
    }
}
