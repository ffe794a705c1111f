//! Deck and scoring rules.
//!
//! Pure functions only. Nothing in here knows about players or locks.

use rand::Rng;
use rand::seq::SliceRandom;
use take5_protocol::Card;

use crate::config::DECK_SIZE;
use crate::room::Row;

/// Penalty ("bullheads") for a card value.
///
/// 55 is checked first: it is a multiple of both 11 and 5 and would
/// otherwise score 5.
pub fn penalty(value: u8) -> u8 {
    if value == 55 {
        7
    } else if value % 11 == 0 {
        5
    } else if value % 10 == 0 {
        3
    } else if value % 5 == 0 {
        2
    } else {
        1
    }
}

/// Builds the card for `value` with its penalty filled in.
pub fn card(value: u8) -> Card {
    Card {
        value,
        score: penalty(value),
    }
}

/// Returns `true` if `value` names one of the 104 cards.
pub fn is_valid_value(value: i64) -> bool {
    (1..=DECK_SIZE as i64).contains(&value)
}

/// A freshly shuffled 104-card deck using the thread-local RNG.
pub fn build_deck() -> Vec<Card> {
    build_deck_with(&mut rand::rng())
}

/// A freshly shuffled 104-card deck using the given RNG.
///
/// Fisher-Yates via [`SliceRandom::shuffle`], so every permutation is
/// equally likely for a uniform `rng`.
pub fn build_deck_with<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck: Vec<Card> = (1..=DECK_SIZE as u8).map(card).collect();
    deck.shuffle(rng);
    deck
}

/// The row a card of `value` goes to: the one whose tail is below `value`
/// by the smallest margin. Ties go to the lowest index.
///
/// `None` means the card is lower than every tail and the player has to
/// take a row.
pub fn find_best_row(rows: &[Row], value: u8) -> Option<usize> {
    let mut best: Option<(usize, u8)> = None;
    for (idx, row) in rows.iter().enumerate() {
        let Some(tail) = row.tail() else { continue };
        if tail.value >= value {
            continue;
        }
        let diff = value - tail.value;
        if best.is_none_or(|(_, best_diff)| diff < best_diff) {
            best = Some((idx, diff));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Sum of penalties of a set of cards.
pub fn row_score(cards: &[Card]) -> u32 {
    cards.iter().map(|c| u32::from(c.score)).sum()
}
