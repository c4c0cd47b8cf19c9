//! The persisted OAuth credential.
//!
//! [`Token`] mirrors the JSON shape of `token.json`:
//!
//! ```text
//! {
//!   "access_token": "...",
//!   "refresh_token": "...",
//!   "token_type": "Bearer",
//!   "expiry": "2026-01-01T00:00:00Z"
//! }
//! ```
//!
//! Unknown keys are ignored on read. `refresh_token` and `token_type` default
//! to empty strings and `expiry` may be absent, `null`, or the zero time
//! `0001-01-01T00:00:00Z` written by older releases, all of which mean
//! "unknown".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clock skew tolerated when deciding whether the access token has expired.
const EXPIRY_SKEW_SECS: i64 = 10;

/// Token type used when the provider does not say otherwise.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// OAuth2 bearer credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Short-lived access token sent with every API request.
    pub access_token: String,

    /// Long-lived refresh token. Empty when the provider did not issue one.
    #[serde(default)]
    pub refresh_token: String,

    /// Token type, typically "Bearer".
    #[serde(default)]
    pub token_type: String,

    /// Absolute expiry of the access token, if known.
    #[serde(default, with = "expiry_format")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_type: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: token_type.into(),
            expiry: None,
        }
    }

    /// Set the absolute expiry.
    pub fn with_expiry(self, expiry: DateTime<Utc>) -> Self {
        Self {
            expiry: Some(expiry),
            ..self
        }
    }

    /// Whether the access token is expired or about to expire.
    ///
    /// A token without a known expiry never expires.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(exp) => exp <= Utc::now() + chrono::Duration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Carry `previous`'s refresh token forward when this token has none.
    ///
    /// Refresh responses frequently omit the refresh token; persisting them
    /// verbatim would orphan the session.
    pub fn merge_refresh_token(self, previous: Option<&Token>) -> Self {
        match previous {
            Some(prev) if self.refresh_token.is_empty() && prev.has_refresh_token() => Self {
                refresh_token: prev.refresh_token.clone(),
                ..self
            },
            _ => self,
        }
    }

    /// The token type to send, falling back to `Bearer`.
    pub fn effective_type(&self) -> &str {
        if self.token_type.trim().is_empty() {
            DEFAULT_TOKEN_TYPE
        } else {
            &self.token_type
        }
    }

    /// Value for the HTTP `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.effective_type(), self.access_token)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &if self.has_refresh_token() { "[redacted]" } else { "" },
            )
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .finish()
    }
}

mod expiry_format {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let parsed = DateTime::parse_from_rfc3339(raw)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);

        // Zero time from older writers means "unknown".
        if parsed.year() <= 1 {
            return Ok(None);
        }
        Ok(Some(parsed))
    }
}
