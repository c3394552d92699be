//! Duel-board: hidden mines on a 3x3 board, then up to five rounds of
//! simultaneous guesses at the opponent's board.
//!
//! A guess that lands on one of the opponent's mines is a *hit*, and a hit
//! is bad for the guesser. Exactly one hit in a round ends the match in
//! favour of the player who didn't hit. A round where both or neither hit
//! continues, until the round cap draws the match.

use std::time::Duration;

use duelhub_protocol::UserId;
use rand::seq::index;
use serde_json::{Map, Value, json};

use super::{GameError, GameResult, seat_of, seat_opponent};

pub const SETUP_TIMEOUT: Duration = Duration::from_secs(30);
pub const TURN_TIMEOUT: Duration = Duration::from_secs(20);

/// Side length of the square board.
pub const BOARD_SIZE: usize = 3;
pub const CELLS: usize = BOARD_SIZE * BOARD_SIZE;
pub const MINES: usize = 3;
pub const MAX_ROUNDS: u32 = 5;

#[derive(Debug, Clone, Default)]
struct Side {
    /// Sorted mine cells on this player's own board.
    mines: Option<Vec<u8>>,
    /// Every cell this player has guessed on the opponent's board.
    guesses: Vec<u8>,
    /// This round's guess.
    current: Option<u8>,
}

impl Side {
    fn is_mine(&self, cell: u8) -> bool {
        self.mines.as_ref().is_some_and(|m| m.contains(&cell))
    }
}

#[derive(Debug, Clone)]
pub struct DuelBoard {
    players: [Option<UserId>; 2],
    sides: [Side; 2],
    round: u32,
    result: Option<GameResult>,
}

impl DuelBoard {
    pub fn new(first: UserId) -> Self {
        Self {
            players: [Some(first), None],
            sides: Default::default(),
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

    // -- setup -------------------------------------------------------------

    pub fn handle_setup(&mut self, user: UserId, value: &Value) -> Result<(), GameError> {
        if self.result.is_some() {
            return Err(GameError::Finished);
        }
        let seat = seat_of(&self.players, user)?;
        if self.sides[seat].mines.is_some() {
            return Err(GameError::AlreadySetUp);
        }

        let cells = value.as_array().ok_or_else(|| {
            GameError::IllegalValue(format!("setup must be an array of {MINES} cells"))
        })?;
        if cells.len() != MINES {
            return Err(GameError::IllegalValue(format!(
                "setup must place exactly {MINES} mines, got {}",
                cells.len()
            )));
        }
        let mut mines = cells.iter().map(parse_cell).collect::<Result<Vec<_>, _>>()?;
        mines.sort_unstable();
        mines.dedup();
        if mines.len() != MINES {
            return Err(GameError::IllegalValue("mine cells must be distinct".into()));
        }

        self.sides[seat].mines = Some(mines);
        Ok(())
    }

    /// Places random mines for `user` if they haven't placed their own.
    pub fn force_setup(&mut self, user: UserId) {
        let Ok(seat) = seat_of(&self.players, user) else {
            return;
        };
        let side = &mut self.sides[seat];
        if side.mines.is_some() {
            return;
        }
        let mut rng = rand::rng();
        let mut mines: Vec<u8> = index::sample(&mut rng, CELLS, MINES)
            .into_iter()
            .map(|i| i as u8)
            .collect();
        mines.sort_unstable();
        tracing::debug!(%user, ?mines, "placed mines for missed setup");
        side.mines = Some(mines);
    }

    pub fn is_set_up(&self, user: UserId) -> bool {
        seat_of(&self.players, user).is_ok_and(|seat| self.sides[seat].mines.is_some())
    }

    pub fn setup_complete(&self) -> bool {
        self.players.iter().all(Option::is_some) && self.sides.iter().all(|s| s.mines.is_some())
    }

    // -- rounds ------------------------------------------------------------

    pub fn begin_round(&mut self) -> u32 {
        self.round += 1;
        for side in &mut self.sides {
            side.current = None;
        }
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
        if self.round == 0 || !self.setup_complete() {
            return Err(GameError::IllegalValue("no round in progress".into()));
        }
        let side = &mut self.sides[seat];
        if side.current.is_some() {
            return Err(GameError::AlreadyMoved);
        }

        let cell = match value {
            Some(v) => parse_cell(v)?,
            // forced: the lowest cell not yet tried
            None => (0..CELLS as u8)
                .find(|c| !side.guesses.contains(c))
                .ok_or_else(|| GameError::IllegalValue("no cells left to guess".into()))?,
        };
        if side.guesses.contains(&cell) {
            return Err(GameError::IllegalValue(format!("cell {cell} was already guessed")));
        }

        side.guesses.push(cell);
        side.current = Some(cell);
        Ok(())
    }

    pub fn has_moved(&self, user: UserId) -> bool {
        seat_of(&self.players, user).is_ok_and(|seat| self.sides[seat].current.is_some())
    }

    pub fn round_complete(&self) -> bool {
        self.sides.iter().all(|s| s.current.is_some())
    }

    pub fn check_result(&mut self) -> Option<GameResult> {
        if let Some(result) = &self.result {
            return Some(result.clone());
        }
        let [Some(a), Some(b)] = self.players else {
            return None;
        };
        let [Some(guess_a), Some(guess_b)] = [self.sides[0].current, self.sides[1].current] else {
            return None;
        };

        let a_hit = self.sides[1].is_mine(guess_a);
        let b_hit = self.sides[0].is_mine(guess_b);

        let (winner, reason) = match (a_hit, b_hit) {
            (true, false) => (Some(b), "opponent_hit_mine"),
            (false, true) => (Some(a), "opponent_hit_mine"),
            // both or neither: keep playing until the cap
            _ if self.round >= MAX_ROUNDS => (None, "round_limit"),
            _ => return None,
        };

        let mut details = Map::new();
        details.insert("round".into(), json!(self.round));
        details.insert(
            "hits".into(),
            json!({ a.0.to_string(): a_hit, b.0.to_string(): b_hit }),
        );
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

    // -- views -------------------------------------------------------------

    pub fn snapshot(&self, user: UserId) -> Value {
        let Ok(seat) = seat_of(&self.players, user) else {
            return json!({ "game": "duel-board", "round": self.round });
        };
        let mine = &self.sides[seat];
        let theirs = &self.sides[1 - seat];

        // an opponent's guess stays hidden until the round closes
        let mut opponent_guesses = theirs.guesses.clone();
        if theirs.current.is_some() && !self.round_complete() {
            opponent_guesses.pop();
        }
        let opponent_mines = if self.result.is_some() {
            theirs.mines.clone()
        } else {
            None
        };

        json!({
            "game": "duel-board",
            "round": self.round,
            "max_rounds": MAX_ROUNDS,
            "board_size": BOARD_SIZE,
            "mines_per_board": MINES,
            "setup_done": mine.mines.is_some(),
            "opponent_setup_done": theirs.mines.is_some(),
            "your_mines": mine.mines,
            "your_guesses": mine.guesses,
            "opponent_guesses": opponent_guesses,
            "opponent_mines": opponent_mines,
        })
    }

    pub fn raw_moves(&self) -> Map<String, Value> {
        self.players
            .iter()
            .zip(self.sides.iter())
            .filter_map(|(player, side)| {
                let player = (*player)?;
                Some((
                    player.0.to_string(),
                    json!({ "mines": side.mines, "guesses": side.guesses }),
                ))
            })
            .collect()
    }
}

/// A board cell from a number or a numeric string.
fn parse_cell(value: &Value) -> Result<u8, GameError> {
    let index = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    index
        .filter(|&i| i < CELLS as u64)
        .map(|i| i as u8)
        .ok_or_else(|| GameError::IllegalValue(format!("cell must be 0..{CELLS}, got {value}")))
}
