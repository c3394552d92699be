use std::sync::Arc;

use duelhub::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Development collaborators
// ---------------------------------------------------------------------------

/// Numeric tokens are their own user id. Never use outside development.
struct DevAuth;

impl Authenticator for DevAuth {
    async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
        let id: u64 = token
            .parse()
            .map_err(|_| SessionError::AuthFailed("token must be a number".into()))?;
        Ok(UserId(id))
    }
}

/// Every player can afford any stake up to `max_stake`.
struct DevWallet {
    max_stake: u64,
}

impl BalanceChecker for DevWallet {
    async fn has_balance(&self, _: UserId, stake: u64, _: &str) -> Result<bool, SessionError> {
        Ok(stake <= self.max_stake)
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("DUELHUB_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let max_stake = match std::env::var("DUELHUB_MAX_STAKE") {
        Ok(raw) => raw.parse()?,
        Err(_) => u64::MAX,
    };

    let store = Arc::new(MemoryStore::new());
    let server = DuelhubServer::<DevAuth, DevWallet>::builder()
        .bind(&bind)
        .stores(Stores::memory(store))
        .build(DevAuth, DevWallet { max_stake })
        .await?;
    tracing::info!(addr = %server.local_addr()?, max_stake, "starting duel server");

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dev_auth_accepts_numeric_tokens_only() {
        assert_eq!(DevAuth.authenticate("42").await.unwrap(), UserId(42));
        assert!(matches!(
            DevAuth.authenticate("alice").await,
            Err(SessionError::AuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_dev_wallet_caps_stake() {
        let wallet = DevWallet { max_stake: 100 };
        assert!(wallet.has_balance(UserId(1), 100, "gems").await.unwrap());
        assert!(!wallet.has_balance(UserId(1), 101, "gems").await.unwrap());
    }
}
