//! # duelhub
//!
//! Real-time matchmaking for staked two-player mini-games.
//!
//! Players connect over WebSocket with their game, stake, currency and a
//! bearer token in the upgrade URL. duelhub verifies the token, checks the
//! wallet, pairs players queueing under the same key, and runs each match
//! in its own task until a result is written to the stores.
//!
//! The embedding application supplies the collaborators: an
//! [`Authenticator`](prelude::Authenticator), a
//! [`BalanceChecker`](prelude::BalanceChecker), and optionally
//! [`Stores`](prelude::Stores).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duelhub::prelude::*;
//!
//! struct DevAuth;
//!
//! impl Authenticator for DevAuth {
//!     async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
//!         token
//!             .parse()
//!             .map(UserId)
//!             .map_err(|_| SessionError::AuthFailed("token must be a number".into()))
//!     }
//! }
//!
//! struct FreeWallet;
//!
//! impl BalanceChecker for FreeWallet {
//!     async fn has_balance(&self, _: UserId, _: u64, _: &str) -> Result<bool, SessionError> {
//!         Ok(true)
//!     }
//! }
//!
//! # async fn run() -> Result<(), DuelhubError> {
//! let server = DuelhubServer::<DevAuth, FreeWallet>::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(DevAuth, FreeWallet)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::DuelhubError;
pub use server::{DuelhubServer, DuelhubServerBuilder};

pub use duelhub_protocol as protocol;
pub use duelhub_room as room;
pub use duelhub_session as session;
pub use duelhub_transport as transport;

/// Everything needed to embed a server.
pub mod prelude {
    pub use crate::{DuelhubError, DuelhubServer, DuelhubServerBuilder};
    pub use duelhub_protocol::{
        GameVariant, Outcome, RoomId, ServerMessage, UserId, WaitingKey,
    };
    pub use duelhub_room::{
        ClientConfig, HistoryRow, HistoryStore, Hub, HubConfig, MatchRecord, MatchStore,
        MemoryStore, RoomConfig, StoreError, Stores,
    };
    pub use duelhub_session::{Authenticator, BalanceChecker, SessionError};
}
