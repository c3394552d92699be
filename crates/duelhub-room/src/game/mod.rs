//! Turn-based rule engines.
//!
//! The variant set is closed, so [`Game`] is an enum that forwards each
//! lifecycle call to its variant. The room loop is the only caller and the
//! only mutator, so nothing here synchronizes.
//!
//! # Lifecycle contract
//!
//! ```text
//! new(first) → set_opponent → [handle_setup / force_setup … setup_complete]
//!     → begin_round → handle_move × 2 → round_complete → check_result
//!     → (None: begin_round again) | (Some + is_finished: done)
//! ```
//!
//! `check_result` is safe to call at any time: it returns `None` while too
//! few moves exist and returns the same memoized result once decided.

mod duel_board;
mod quick_draw;

use std::time::Duration;

use duelhub_protocol::{GameVariant, Outcome, UserId};
use serde_json::{Map, Value};

pub use duel_board::DuelBoard;
pub use quick_draw::{Hand, QuickDraw};

/// Reason recorded when a player wins because the other left.
pub const FORFEIT_REASON: &str = "opponent_disconnected";

/// A rejected setup or move. The text is sent back in an `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("user {0} is not playing in this match")]
    NotAPlayer(UserId),

    #[error("the match already has two players")]
    Full,

    #[error("{0}")]
    IllegalValue(String),

    #[error("already moved this round")]
    AlreadyMoved,

    #[error("setup already submitted")]
    AlreadySetUp,

    #[error("this game has no setup phase")]
    NoSetupPhase,

    #[error("the match is over")]
    Finished,
}

/// The terminal (or round-deciding) verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct GameResult {
    /// `None` is a draw.
    pub winner: Option<UserId>,
    pub reason: String,
    pub details: Map<String, Value>,
}

impl GameResult {
    pub fn new(
        winner: Option<UserId>,
        reason: impl Into<String>,
        details: Map<String, Value>,
    ) -> Self {
        Self {
            winner,
            reason: reason.into(),
            details,
        }
    }

    /// This result framed for one player.
    pub fn outcome_for(&self, user: UserId) -> Outcome {
        Outcome::for_player(self.winner, user)
    }
}

/// One match's rules and state.
#[derive(Debug, Clone)]
pub enum Game {
    QuickDraw(QuickDraw),
    DuelBoard(DuelBoard),
}

impl Game {
    /// Creates the game for `variant` with its first player seated.
    pub fn new(variant: GameVariant, first: UserId) -> Self {
        match variant {
            GameVariant::QuickDraw => Self::QuickDraw(QuickDraw::new(first)),
            GameVariant::DuelBoard => Self::DuelBoard(DuelBoard::new(first)),
        }
    }

    pub fn variant(&self) -> GameVariant {
        match self {
            Self::QuickDraw(_) => GameVariant::QuickDraw,
            Self::DuelBoard(_) => GameVariant::DuelBoard,
        }
    }

    /// The two seats. The second is empty until an opponent is paired.
    pub fn players(&self) -> [Option<UserId>; 2] {
        match self {
            Self::QuickDraw(g) => g.players(),
            Self::DuelBoard(g) => g.players(),
        }
    }

    /// The player in the other seat, if both are seated.
    pub fn opponent_of(&self, user: UserId) -> Option<UserId> {
        match self.players() {
            [Some(a), Some(b)] if a == user => Some(b),
            [Some(a), Some(b)] if b == user => Some(a),
            _ => None,
        }
    }

    /// Seats the second player.
    pub fn set_opponent(&mut self, user: UserId) -> Result<(), GameError> {
        match self {
            Self::QuickDraw(g) => g.set_opponent(user),
            Self::DuelBoard(g) => g.set_opponent(user),
        }
    }

    /// `Some` for variants with a setup phase.
    pub fn setup_timeout(&self) -> Option<Duration> {
        match self {
            Self::QuickDraw(_) => None,
            Self::DuelBoard(_) => Some(duel_board::SETUP_TIMEOUT),
        }
    }

    pub fn handle_setup(&mut self, user: UserId, value: &Value) -> Result<(), GameError> {
        match self {
            Self::QuickDraw(_) => Err(GameError::NoSetupPhase),
            Self::DuelBoard(g) => g.handle_setup(user, value),
        }
    }

    /// Commits a bot setup for `user` if they haven't submitted one.
    pub fn force_setup(&mut self, user: UserId) {
        if let Self::DuelBoard(g) = self {
            g.force_setup(user);
        }
    }

    /// Idempotent; always `true` for variants without setup.
    pub fn setup_complete(&self) -> bool {
        match self {
            Self::QuickDraw(_) => true,
            Self::DuelBoard(g) => g.setup_complete(),
        }
    }

    /// Whether `user` has finished setup.
    pub fn is_set_up(&self, user: UserId) -> bool {
        match self {
            Self::QuickDraw(_) => true,
            Self::DuelBoard(g) => g.is_set_up(user),
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        match self {
            Self::QuickDraw(_) => quick_draw::TURN_TIMEOUT,
            Self::DuelBoard(_) => duel_board::TURN_TIMEOUT,
        }
    }

    /// Opens the next round and returns its number (1-based).
    pub fn begin_round(&mut self) -> u32 {
        match self {
            Self::QuickDraw(g) => g.begin_round(),
            Self::DuelBoard(g) => g.begin_round(),
        }
    }

    pub fn round(&self) -> u32 {
        match self {
            Self::QuickDraw(g) => g.round(),
            Self::DuelBoard(g) => g.round(),
        }
    }

    /// Records a move. `None` is a forced move for a missed deadline and
    /// resolves to the variant's deterministic fallback.
    pub fn handle_move(&mut self, user: UserId, value: Option<&Value>) -> Result<(), GameError> {
        match self {
            Self::QuickDraw(g) => g.handle_move(user, value),
            Self::DuelBoard(g) => g.handle_move(user, value),
        }
    }

    pub fn has_moved(&self, user: UserId) -> bool {
        match self {
            Self::QuickDraw(g) => g.has_moved(user),
            Self::DuelBoard(g) => g.has_moved(user),
        }
    }

    /// Both players have moved in the current round.
    pub fn round_complete(&self) -> bool {
        match self {
            Self::QuickDraw(g) => g.round_complete(),
            Self::DuelBoard(g) => g.round_complete(),
        }
    }

    /// Decides the match if enough moves exist.
    pub fn check_result(&mut self) -> Option<GameResult> {
        match self {
            Self::QuickDraw(g) => g.check_result(),
            Self::DuelBoard(g) => g.check_result(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Self::QuickDraw(g) => g.result().is_some(),
            Self::DuelBoard(g) => g.result().is_some(),
        }
    }

    /// Awards the match to `winner` because the other player left.
    ///
    /// Returns `None` when the match was already decided.
    pub fn forfeit(&mut self, winner: UserId) -> Option<GameResult> {
        if self.is_finished() {
            return None;
        }
        let mut details = Map::new();
        details.insert("round".into(), Value::from(self.round()));
        let result = GameResult::new(Some(winner), FORFEIT_REASON, details);
        match self {
            Self::QuickDraw(g) => g.set_result(result.clone()),
            Self::DuelBoard(g) => g.set_result(result.clone()),
        }
        Some(result)
    }

    /// What `user` is allowed to see. Never reveals opponent secrets.
    pub fn snapshot(&self, user: UserId) -> Value {
        match self {
            Self::QuickDraw(g) => g.snapshot(user),
            Self::DuelBoard(g) => g.snapshot(user),
        }
    }

    /// Every player's moves, keyed by user id, for the match record.
    pub fn raw_moves(&self) -> Map<String, Value> {
        match self {
            Self::QuickDraw(g) => g.raw_moves(),
            Self::DuelBoard(g) => g.raw_moves(),
        }
    }
}

/// Seat index of `user`, if seated.
fn seat_of(players: &[Option<UserId>; 2], user: UserId) -> Result<usize, GameError> {
    players
        .iter()
        .position(|p| *p == Some(user))
        .ok_or(GameError::NotAPlayer(user))
}

/// Fills the empty second seat.
fn seat_opponent(players: &mut [Option<UserId>; 2], user: UserId) -> Result<(), GameError> {
    if players[0] == Some(user) {
        return Err(GameError::IllegalValue("cannot play against yourself".into()));
    }
    match players[1] {
        Some(existing) if existing == user => Ok(()),
        Some(_) => Err(GameError::Full),
        None => {
            players[1] = Some(user);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const A: UserId = UserId(1);
    const B: UserId = UserId(2);

    #[test]
    fn test_new_game_matches_variant() {
        assert_eq!(Game::new(GameVariant::QuickDraw, A).variant(), GameVariant::QuickDraw);
        assert_eq!(Game::new(GameVariant::DuelBoard, A).variant(), GameVariant::DuelBoard);
    }

    #[test]
    fn test_set_opponent_rejects_self_and_third_player() {
        let mut game = Game::new(GameVariant::QuickDraw, A);
        assert!(game.set_opponent(A).is_err());
        game.set_opponent(B).unwrap();
        // re-seating the same opponent is a no-op
        game.set_opponent(B).unwrap();
        assert_eq!(game.set_opponent(UserId(3)), Err(GameError::Full));
        assert_eq!(game.players(), [Some(A), Some(B)]);
        assert_eq!(game.opponent_of(A), Some(B));
        assert_eq!(game.opponent_of(B), Some(A));
        assert_eq!(game.opponent_of(UserId(3)), None);
    }

    #[test]
    fn test_setup_only_for_duel_board() {
        let mut quick = Game::new(GameVariant::QuickDraw, A);
        assert_eq!(quick.setup_timeout(), None);
        assert!(quick.setup_complete());
        assert_eq!(quick.handle_setup(A, &json!([0, 1, 2])), Err(GameError::NoSetupPhase));

        let board = Game::new(GameVariant::DuelBoard, A);
        assert!(board.setup_timeout().is_some());
        assert!(!board.setup_complete());
    }

    #[test]
    fn test_forfeit_sets_terminal_result_once() {
        let mut game = Game::new(GameVariant::QuickDraw, A);
        game.set_opponent(B).unwrap();
        game.begin_round();

        let result = game.forfeit(B).unwrap();
        assert_eq!(result.winner, Some(B));
        assert_eq!(result.reason, FORFEIT_REASON);
        assert!(game.is_finished());
        assert_eq!(game.check_result(), Some(result));
        assert_eq!(game.forfeit(A), None);
    }

    #[test]
    fn test_moves_after_forfeit_are_rejected() {
        let mut game = Game::new(GameVariant::QuickDraw, A);
        game.set_opponent(B).unwrap();
        game.begin_round();
        game.forfeit(A);
        assert_eq!(game.handle_move(A, Some(&json!("rock"))), Err(GameError::Finished));
    }

    #[test]
    fn test_result_outcome_for() {
        let result = GameResult::new(Some(A), "x", Map::new());
        assert_eq!(result.outcome_for(A), Outcome::Win);
        assert_eq!(result.outcome_for(B), Outcome::Lose);
        let draw = GameResult::new(None, "x", Map::new());
        assert_eq!(draw.outcome_for(A), Outcome::Draw);
    }
}
