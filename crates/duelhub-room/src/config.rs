//! Hub, room and client tuning, plus the room's lifecycle state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// HubConfig
// ---------------------------------------------------------------------------

/// Matchmaking registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// How long `assign_client` waits for a room to accept a Register.
    /// Running out is the only hard matchmaking failure.
    pub register_deadline: Duration,

    /// Empty rooms younger than this survive the reaper.
    pub empty_room_grace: Duration,

    /// Period of the slow empty-room sweep.
    pub reap_interval: Duration,

    /// Period of the fast waiting-client liveness sweep.
    pub probe_interval: Duration,

    /// Capacity of each room's register, disconnect and inbound queues.
    pub room_channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            register_deadline: Duration::from_secs(2),
            empty_room_grace: Duration::from_secs(60),
            reap_interval: Duration::from_secs(30),
            probe_interval: Duration::from_secs(2),
            room_channel_capacity: 32,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Per-match timing.
///
/// Turn and setup deadlines belong to the game variant, not to this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Per-client wait for the write pump's ready signal before round one.
    pub ready_wait: Duration,

    /// Per-client wait for the terminal result to be acknowledged.
    pub terminal_ack_wait: Duration,

    /// Deadline for enqueueing any frame on a client's outbound queue.
    pub send_deadline: Duration,

    /// Upper bound on each persistence call.
    pub persist_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            ready_wait: Duration::from_secs(2),
            terminal_ack_wait: Duration::from_secs(2),
            send_deadline: Duration::from_secs(1),
            persist_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Per-connection queue and keep-alive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Capacity of the outbound queue drained by the write pump.
    pub outbound_capacity: usize,

    /// Keep-alive ping period on an idle socket.
    pub ping_interval: Duration,

    /// Deadline for handing an inbound frame to the room.
    pub forward_deadline: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            ping_interval: Duration::from_secs(20),
            forward_deadline: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomPhase
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Waiting → Setup → Playing → Finished
///     └──────────────↗
/// ```
///
/// - **Waiting**: one player registered, the other not yet paired.
/// - **Setup**: both present, secret commitments outstanding (only for
///   variants with a setup phase).
/// - **Playing**: rounds running under the turn timer.
/// - **Finished**: terminal result delivered or room abandoned. The loop
///   exits and tears down.
///
/// `Finished` is reachable from every phase (forfeit, empty room).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomPhase {
    Waiting,
    Setup,
    Playing,
    Finished,
}

impl RoomPhase {
    /// Returns `true` once both players are present and the match is live.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Setup | Self::Playing)
    }

    /// Returns `true` if moving to `target` is legal.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Finished, _) => false,
            (_, Self::Finished) => true,
            (Self::Waiting, Self::Setup | Self::Playing) => true,
            (Self::Setup, Self::Playing) => true,
            // every new round re-enters Playing
            (Self::Playing, Self::Playing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Setup => write!(f, "Setup"),
            Self::Playing => write!(f, "Playing"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}
