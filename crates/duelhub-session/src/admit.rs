//! The admission step run before a connection becomes a matchmaking client.

use duelhub_protocol::{UserId, WaitingKey};

use crate::{Authenticator, BalanceChecker, ConnectParams, SessionError};

/// A connection that passed admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub user_id: UserId,
    pub key: WaitingKey,
}

/// Verifies the token, then the balance.
///
/// Free play (`stake == 0`) skips the wallet entirely.
pub async fn admit<A, B>(
    params: ConnectParams,
    auth: &A,
    wallet: &B,
) -> Result<Admission, SessionError>
where
    A: Authenticator,
    B: BalanceChecker,
{
    let user_id = auth.authenticate(&params.token).await?;

    if params.stake > 0 && !wallet.has_balance(user_id, params.stake, &params.currency).await? {
        tracing::info!(
            %user_id,
            stake = params.stake,
            currency = %params.currency,
            "admission refused: insufficient balance"
        );
        return Err(SessionError::InsufficientBalance {
            user_id,
            stake: params.stake,
            currency: params.currency,
        });
    }

    tracing::debug!(%user_id, game = %params.variant, stake = params.stake, "admitted");
    Ok(Admission {
        user_id,
        key: WaitingKey::new(params.variant, params.stake, params.currency),
    })
}
