//! Core protocol types for duelhub's wire format.
//!
//! Everything in this module either travels on the wire as JSON or is
//! used to route a connection (the matchmaking key). Inbound frames from a
//! player use a loose `{"type", "value"}` envelope so each game variant can
//! coerce its own values; outbound frames are a closed set of events using
//! `{"type", "payload"}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A user identifier, as returned by the identity verifier.
///
/// Newtype over `u64` so it can't be mixed up with a [`RoomId`]. Serializes
/// as a plain number (`#[serde(transparent)]`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A unique identifier for a room (one head-to-head match).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Game variant and matchmaking key
// ---------------------------------------------------------------------------

/// The games a player can queue for.
///
/// The set is closed: adding a game means adding a variant here and a
/// matching rule engine in the room crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameVariant {
    /// Single-shot rock/paper/scissors.
    QuickDraw,
    /// Hidden-mine board duel over up to five rounds.
    DuelBoard,
}

impl GameVariant {
    /// The wire name of the variant (also used as the history game type).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickDraw => "quick-draw",
            Self::DuelBoard => "duel-board",
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameVariant {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quick-draw" => Ok(Self::QuickDraw),
            "duel-board" => Ok(Self::DuelBoard),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown game variant {other:?}"
            ))),
        }
    }
}

/// Partitions the matchmaking pool: only players queueing for the same
/// game, at the same stake, in the same currency are ever paired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaitingKey {
    pub variant: GameVariant,
    pub stake: u64,
    pub currency: String,
}

impl WaitingKey {
    pub fn new(variant: GameVariant, stake: u64, currency: impl Into<String>) -> Self {
        Self {
            variant,
            stake,
            currency: currency.into(),
        }
    }
}

impl fmt::Display for WaitingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.variant, self.stake, self.currency)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A match outcome relative to one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
    Draw,
}

impl Outcome {
    /// Frames a winner (or a draw, when `winner` is `None`) from the
    /// point of view of `me`.
    pub fn for_player(winner: Option<UserId>, me: UserId) -> Self {
        match winner {
            None => Self::Draw,
            Some(w) if w == me => Self::Win,
            Some(_) => Self::Lose,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Lose => "lose",
            Self::Draw => "draw",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound: Client → Room
// ---------------------------------------------------------------------------

/// What an inbound frame asks the room to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// A turn move (or a guess, for the board duel).
    Move,
    /// A setup-phase commitment.
    Setup,
}

/// The raw inbound envelope: `{"type": "move", "value": ...}`.
///
/// `value` is left as untyped JSON because its shape is variant-specific;
/// the game coerces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl ClientEnvelope {
    pub fn new(kind: &str, value: Value) -> Self {
        Self {
            kind: kind.to_string(),
            value,
        }
    }

    /// Resolves the `type` tag into a known [`InboundKind`].
    pub fn inbound_kind(&self) -> Result<InboundKind, ProtocolError> {
        match self.kind.as_str() {
            "move" => Ok(InboundKind::Move),
            "setup" => Ok(InboundKind::Setup),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown message type {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound: Room → Client
// ---------------------------------------------------------------------------

/// Sent once per connection, right after the socket is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub user_id: UserId,
    pub game: GameVariant,
    pub stake: u64,
    pub currency: String,
}

/// Sent to both players when their match is formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPayload {
    pub room_id: RoomId,
    pub opponent_id: UserId,
}

/// Sent when a round begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    pub round: u32,
    pub timeout_secs: u64,
    /// The recipient's view of the game at the start of the round.
    pub state: Value,
}

/// A result framed for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub you: Outcome,
    pub reason: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Every frame the server sends to a player.
///
/// Adjacently tagged, so a start event looks like
/// `{"type": "start", "payload": {"round": 1, ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready(ReadyPayload),
    Matched(MatchedPayload),
    State(Value),
    SetupComplete,
    Start(StartPayload),
    Result(ResultPayload),
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Shorthand for an `error` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Matched(_) => "matched",
            Self::State(_) => "state",
            Self::SetupComplete => "setup_complete",
            Self::Start(_) => "start",
            Self::Result(_) => "result",
            Self::Error(_) => "error",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_user_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(UserId(7).to_string(), "U-7");
        assert_eq!(RoomId(3).to_string(), "R-3");
    }

    #[test]
    fn test_game_variant_wire_names() {
        assert_eq!(
            serde_json::to_value(GameVariant::QuickDraw).unwrap(),
            json!("quick-draw")
        );
        assert_eq!(
            "duel-board".parse::<GameVariant>().unwrap(),
            GameVariant::DuelBoard
        );
        assert!("chess".parse::<GameVariant>().is_err());
    }

    #[test]
    fn test_waiting_key_distinguishes_currency_and_stake() {
        let a = WaitingKey::new(GameVariant::QuickDraw, 100, "gems");
        let b = WaitingKey::new(GameVariant::QuickDraw, 100, "coins");
        let c = WaitingKey::new(GameVariant::QuickDraw, 50, "gems");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, WaitingKey::new(GameVariant::QuickDraw, 100, "gems"));
        assert_eq!(a.to_string(), "quick-draw/100/gems");
    }

    #[test]
    fn test_outcome_for_player() {
        let me = UserId(1);
        assert_eq!(Outcome::for_player(Some(me), me), Outcome::Win);
        assert_eq!(Outcome::for_player(Some(UserId(2)), me), Outcome::Lose);
        assert_eq!(Outcome::for_player(None, me), Outcome::Draw);
    }

    #[test]
    fn test_client_envelope_value_defaults_to_null() {
        let env: ClientEnvelope = serde_json::from_str(r#"{"type":"move"}"#).unwrap();
        assert_eq!(env.inbound_kind().unwrap(), InboundKind::Move);
        assert!(env.value.is_null());
    }

    #[test]
    fn test_client_envelope_unknown_kind_is_rejected() {
        let env = ClientEnvelope::new("dance", Value::Null);
        assert!(env.inbound_kind().is_err());
    }

    #[test]
    fn test_server_message_result_json_shape() {
        let msg = ServerMessage::Result(ResultPayload {
            you: Outcome::Win,
            reason: "rock_beats_scissors".into(),
            details: Map::new(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["payload"]["you"], "win");
        assert_eq!(json["payload"]["reason"], "rock_beats_scissors");
    }

    #[test]
    fn test_server_message_setup_complete_has_no_payload() {
        let json = serde_json::to_value(ServerMessage::SetupComplete).unwrap();
        assert_eq!(json, json!({"type": "setup_complete"}));
    }

    #[test]
    fn test_server_message_matched_json_shape() {
        let msg = ServerMessage::Matched(MatchedPayload {
            room_id: RoomId(9),
            opponent_id: UserId(2),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"type": "matched", "payload": {"room_id": 9, "opponent_id": 2}}));
        assert_eq!(msg.kind(), "matched");
    }
}
