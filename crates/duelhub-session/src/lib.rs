//! Upgrade-time admission for duelhub.
//!
//! Before a socket becomes a matchmaking client it must:
//!
//! 1. carry valid [`ConnectParams`] in its upgrade query,
//! 2. present a token the [`Authenticator`] accepts, and
//! 3. hold enough balance for its stake ([`BalanceChecker`]).
//!
//! [`admit`] runs those checks in order and yields an [`Admission`].
//!
//! ```text
//! Room layer (above)      ← receives admitted clients
//!     ↕
//! Admission (this crate)  ← identity, wallet, upgrade params
//!     ↕
//! Protocol (below)        ← UserId, GameVariant, WaitingKey
//! ```

mod admit;
mod auth;
mod error;
mod params;

pub use admit::{Admission, admit};
pub use auth::{Authenticator, BalanceChecker};
pub use error::SessionError;
pub use params::ConnectParams;
