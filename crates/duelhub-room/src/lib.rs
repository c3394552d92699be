//! Matchmaking and match orchestration for duelhub.
//!
//! Each match runs as an isolated Tokio task (a [`RoomHandle`] talks to
//! it). The [`Hub`] pairs waiting clients that share a
//! [`WaitingKey`](duelhub_protocol::WaitingKey) and keeps the registry of
//! live rooms.
//!
//! # Key types
//!
//! - [`Hub`]: pairs clients, owns the room registry, runs the sweepers
//! - [`RoomHandle`]: a running room
//! - [`ClientHandle`]: the room-facing side of a connection
//! - [`Game`]: the rule engine, one variant per game
//! - [`MatchStore`] / [`HistoryStore`]: where finished matches go
//! - [`HubConfig`], [`RoomConfig`], [`ClientConfig`]: timing and capacity

mod client;
mod config;
mod error;
pub mod game;
mod hub;
mod room;
mod store;

pub use client::{ClientHandle, ClientId, ClientLink, Inbound, Outbound};
pub use config::{ClientConfig, HubConfig, RoomConfig, RoomPhase};
pub use error::RoomError;
pub use game::{Game, GameError, GameResult};
pub use hub::{Hub, Sweepers};
pub use room::RoomHandle;
pub use store::{
    HistoryRow, HistoryStore, MatchRecord, MatchStore, MemoryStore, PVP_MODE, StoreError, Stores,
};
