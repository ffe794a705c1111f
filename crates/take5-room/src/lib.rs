//! Rooms and game rules for the Take 5 server.
//!
//! Each room is plain data behind its own `tokio::sync::Mutex`. Actions
//! against different rooms run fully in parallel; actions against one room
//! are serialized by its lock.
//!
//! # Key types
//!
//! - [`Room`]: one table, with membership operations and state projections
//! - [`Event`]: what a transition asks the caller to deliver or persist
//! - [`RoomRegistry`]: all rooms plus the lobby subscribers
//! - [`GameConfig`]: hand size, player limits, bust threshold
//! - [`rules`]: penalties, deck construction, row placement

pub mod engine;
pub mod rules;

mod config;
mod error;
mod registry;
mod room;

pub use config::{DECK_SIZE, GameConfig, ROW_COUNT};
pub use engine::Event;
pub use error::{GameError, RoomError};
pub use registry::{RoomRegistry, SharedRoom};
pub use room::{
    JoinOutcome, Outbound, PlayAction, Player, PlayerHandle, PlayerSender, Room, Row,
};
