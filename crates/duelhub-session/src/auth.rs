//! Collaborator hooks consulted during admission.
//!
//! duelhub doesn't issue tokens or keep ledgers. It calls out to an
//! identity verifier and a wallet through these two traits, which the
//! embedding application implements (and tests mock).

use std::future::Future;

use duelhub_protocol::UserId;

use crate::SessionError;

/// Maps an opaque bearer token to a user id.
///
/// # Example
///
/// ```rust
/// use duelhub_session::{Authenticator, SessionError};
/// use duelhub_protocol::UserId;
///
/// /// Accepts numeric tokens and uses them as the user id.
/// /// Only for development.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
///         let id: u64 = token
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("token must be a number".into()))?;
///         Ok(UserId(id))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the token's owner, or [`SessionError::AuthFailed`].
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<UserId, SessionError>> + Send;
}

/// Confirms a user can cover a stake before they are matched.
pub trait BalanceChecker: Send + Sync + 'static {
    /// Returns `Ok(true)` when `user_id` holds at least `stake` of
    /// `currency`. Errors mean the wallet could not be reached.
    fn has_balance(
        &self,
        user_id: UserId,
        stake: u64,
        currency: &str,
    ) -> impl Future<Output = Result<bool, SessionError>> + Send;
}
