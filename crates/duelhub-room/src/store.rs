//! Persistence collaborators.
//!
//! A finished match produces one flat [`MatchRecord`] and one
//! [`HistoryRow`] per player. The room hands both to the stores from a
//! spawned task; nothing on the match path waits for them.

use std::sync::Arc;

use async_trait::async_trait;
use duelhub_protocol::{Outcome, RoomId, UserId, WaitingKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::game::GameResult;

/// History rows from head-to-head play all carry this mode.
pub const PVP_MODE: &str = "pvp";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record rejected: {0}")]
    Rejected(String),
}

/// The legacy flat match record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub room_id: RoomId,
    pub players: [UserId; 2],
    /// Raw per-player moves keyed by user id.
    pub moves: Map<String, Value>,
    pub winner: Option<UserId>,
}

/// One player's view of a finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub user_id: UserId,
    pub game_type: String,
    pub mode: String,
    pub opponent_id: UserId,
    pub room_id: RoomId,
    pub result: Outcome,
    pub bet_amount: u64,
    pub win_amount: u64,
    pub currency: String,
    pub details: Map<String, Value>,
}

impl HistoryRow {
    /// Builds `user`'s row. Payout is double the stake on a win, the stake
    /// back on a draw, nothing on a loss.
    pub fn for_player(
        user_id: UserId,
        opponent_id: UserId,
        room_id: RoomId,
        key: &WaitingKey,
        result: &GameResult,
    ) -> Self {
        let outcome = result.outcome_for(user_id);
        let win_amount = match outcome {
            Outcome::Win => key.stake.saturating_mul(2),
            Outcome::Draw => key.stake,
            Outcome::Lose => 0,
        };
        let mut details = result.details.clone();
        details.insert("reason".into(), Value::from(result.reason.clone()));

        Self {
            user_id,
            game_type: key.variant.as_str().to_string(),
            mode: PVP_MODE.to_string(),
            opponent_id,
            room_id,
            result: outcome,
            bet_amount: key.stake,
            win_amount,
            currency: key.currency.clone(),
            details,
        }
    }
}

#[async_trait]
pub trait MatchStore: Send + Sync + 'static {
    async fn save_match(&self, record: MatchRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    async fn save_history(&self, row: HistoryRow) -> Result<(), StoreError>;
}

/// The pair of stores a room writes to.
#[derive(Clone)]
pub struct Stores {
    pub matches: Arc<dyn MatchStore>,
    pub history: Arc<dyn HistoryStore>,
}

impl Stores {
    pub fn new(matches: Arc<dyn MatchStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self { matches, history }
    }

    /// Both roles served by one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            matches: store.clone(),
            history: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

/// Keeps everything in memory. Used by tests and the demo server.
#[derive(Debug, Default)]
pub struct MemoryStore {
    matches: Mutex<Vec<MatchRecord>>,
    history: Mutex<Vec<HistoryRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn matches(&self) -> Vec<MatchRecord> {
        self.matches.lock().await.clone()
    }

    pub async fn history(&self) -> Vec<HistoryRow> {
        self.history.lock().await.clone()
    }

    pub async fn history_for(&self, user_id: UserId) -> Vec<HistoryRow> {
        self.history
            .lock()
            .await
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn save_match(&self, record: MatchRecord) -> Result<(), StoreError> {
        self.matches.lock().await.push(record);
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn save_history(&self, row: HistoryRow) -> Result<(), StoreError> {
        self.history.lock().await.push(row);
        Ok(())
    }
}
