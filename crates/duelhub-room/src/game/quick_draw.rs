//! Quick-draw: one simultaneous round of rock/paper/scissors.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use duelhub_protocol::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{GameError, GameResult, seat_of, seat_opponent};

pub const TURN_TIMEOUT: Duration = Duration::from_secs(15);

/// The three moves.
///
/// Accepted on the wire as a case-insensitive name or as index 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Rock,
    Paper,
    Scissors,
}

impl Hand {
    pub const ALL: [Hand; 3] = [Hand::Rock, Hand::Paper, Hand::Scissors];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rock => "rock",
            Self::Paper => "paper",
            Self::Scissors => "scissors",
        }
    }

    pub fn beats(self, other: Hand) -> bool {
        matches!(
            (self, other),
            (Self::Rock, Self::Scissors) | (Self::Paper, Self::Rock) | (Self::Scissors, Self::Paper)
        )
    }

    /// Coerces an inbound `value`.
    pub fn from_value(value: &Value) -> Result<Self, GameError> {
        match value {
            Value::String(s) => s.parse(),
            Value::Number(n) => n
                .as_u64()
                .and_then(|i| Self::ALL.get(i as usize).copied())
                .ok_or_else(|| GameError::IllegalValue(format!("no move with index {n}"))),
            other => Err(GameError::IllegalValue(format!(
                "move must be rock, paper or scissors, got {other}"
            ))),
        }
    }
}

impl FromStr for Hand {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" => Ok(Self::Rock),
            "paper" => Ok(Self::Paper),
            "scissors" => Ok(Self::Scissors),
            _ => Err(GameError::IllegalValue(format!("unknown move {s:?}"))),
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct QuickDraw {
    players: [Option<UserId>; 2],
    hands: [Option<Hand>; 2],
    round: u32,
    result: Option<GameResult>,
}

impl QuickDraw {
    pub fn new(first: UserId) -> Self {
        Self {
            players: [Some(first), None],
            hands: [None; 2],
            round: 0,
            result: None,
        }
    }

    pub fn players(&self) -> [Option<UserId>; 2] {
        self.players
    }

    pub fn set_opponent(&mut self, user: UserId) -> Result<(), GameError> {
        seat_opponent(&mut self.players, user)
    }

    pub fn begin_round(&mut self) -> u32 {
        self.round += 1;
        self.hands = [None; 2];
        self.round
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn handle_move(&mut self, user: UserId, value: Option<&Value>) -> Result<(), GameError> {
        if self.result.is_some() {
            return Err(GameError::Finished);
        }
        let seat = seat_of(&self.players, user)?;
        if self.round == 0 {
            return Err(GameError::IllegalValue("no round in progress".into()));
        }
        if self.hands[seat].is_some() {
            return Err(GameError::AlreadyMoved);
        }
        let hand = match value {
            Some(v) => Hand::from_value(v)?,
            None => Hand::Rock,
        };
        self.hands[seat] = Some(hand);
        Ok(())
    }

    pub fn has_moved(&self, user: UserId) -> bool {
        seat_of(&self.players, user).is_ok_and(|seat| self.hands[seat].is_some())
    }

    pub fn round_complete(&self) -> bool {
        self.hands.iter().all(Option::is_some)
    }

    pub fn check_result(&mut self) -> Option<GameResult> {
        if let Some(result) = &self.result {
            return Some(result.clone());
        }
        let [Some(a), Some(b)] = self.players else {
            return None;
        };
        let [Some(hand_a), Some(hand_b)] = self.hands else {
            return None;
        };

        let (winner, reason) = if hand_a == hand_b {
            (None, "same_move".to_string())
        } else if hand_a.beats(hand_b) {
            (Some(a), format!("{hand_a}_beats_{hand_b}"))
        } else {
            (Some(b), format!("{hand_b}_beats_{hand_a}"))
        };

        let mut details = Map::new();
        details.insert("moves".into(), Value::Object(self.raw_moves()));
        let result = GameResult::new(winner, reason, details);
        self.result = Some(result.clone());
        Some(result)
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    pub(super) fn set_result(&mut self, result: GameResult) {
        self.result = Some(result);
    }

    pub fn snapshot(&self, user: UserId) -> Value {
        let seat = seat_of(&self.players, user).ok();
        let mine = seat.and_then(|s| self.hands[s]);
        let theirs = seat.and_then(|s| self.hands[1 - s]);
        // the opponent's hand is only shown once the match is decided
        let revealed = if self.result.is_some() { theirs } else { None };
        json!({
            "game": "quick-draw",
            "round": self.round,
            "choices": Hand::ALL,
            "your_move": mine,
            "opponent_moved": theirs.is_some(),
            "opponent_move": revealed,
        })
    }

    pub fn raw_moves(&self) -> Map<String, Value> {
        self.players
            .iter()
            .zip(self.hands.iter())
            .filter_map(|(player, hand)| {
                let player = player.as_ref()?;
                Some((player.0.to_string(), Value::from((*hand)?.as_str())))
            })
            .collect()
    }
}
