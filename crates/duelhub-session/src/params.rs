//! Upgrade-time parameters.
//!
//! A client opens
//! `ws://host/play?token=...&game=quick-draw&stake=100&currency=gems`.
//! Everything needed to matchmake travels in that query string.

use duelhub_protocol::GameVariant;
use serde::Deserialize;

use crate::SessionError;

/// The query string as sent, before validation. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct RawQuery {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    game: Option<String>,
    #[serde(default)]
    stake: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

/// The parsed upgrade query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub token: String,
    pub variant: GameVariant,
    pub stake: u64,
    pub currency: String,
}

impl ConnectParams {
    /// Parses a raw query string (without the leading `?`).
    ///
    /// Every one of `token`, `game`, `stake` and `currency` must be present
    /// and non-empty. Tokens may not contain whitespace or control
    /// characters.
    pub fn from_query(query: Option<&str>) -> Result<Self, SessionError> {
        let raw: RawQuery = serde_urlencoded::from_str(query.unwrap_or(""))
            .map_err(|e| SessionError::InvalidParams(e.to_string()))?;

        let token = required("token", raw.token)?;
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(SessionError::InvalidParams(
                "token contains illegal characters".into(),
            ));
        }

        let variant = required("game", raw.game)?
            .parse::<GameVariant>()
            .map_err(|e| SessionError::InvalidParams(e.to_string()))?;

        let stake = required("stake", raw.stake)?;
        let stake = stake.parse::<u64>().map_err(|_| {
            SessionError::InvalidParams(format!(
                "stake {stake:?} is not a whole number"
            ))
        })?;

        Ok(Self {
            token,
            variant,
            stake,
            currency: required("currency", raw.currency)?,
        })
    }
}

fn required(key: &str, value: Option<String>) -> Result<String, SessionError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SessionError::InvalidParams(format!("missing {key}"))),
    }
}
