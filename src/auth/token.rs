//! Access token value type.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

use super::Claims;
use crate::Result;

/// A bearer credential obtained from one of the authorizers.
///
/// Tokens are immutable; a refresh always yields a new value.
#[derive(Clone)]
pub struct AccessToken {
    value: SecretString,
    token_type: String,
    refresh_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Create a token that never expires on its own.
    pub fn new(value: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            token_type: token_type.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Create a bearer token.
    pub fn bearer(value: impl Into<String>) -> Self {
        Self::new(value, "Bearer")
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Expire `lifetime` from now, clamped to the representable range.
    pub fn expires_in(self, lifetime: Duration) -> Self {
        let expires_at = match Utc::now().checked_add_signed(lifetime) {
            Some(at) => at,
            None if lifetime < Duration::zero() => DateTime::<Utc>::MIN_UTC,
            None => DateTime::<Utc>::MAX_UTC,
        };
        self.with_expiry(expires_at)
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::from(refresh_token.into()));
        self
    }

    /// The raw token string.
    pub fn value(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose_secret())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True when the token has no expiry or expires after now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// True when the token has no expiry or `now` is strictly before it.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    /// Value for an `Authorization` header, e.g. `Bearer eyJ...`.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.value.expose_secret())
    }

    /// Decode the token's claims without verifying its signature.
    pub fn claims(&self) -> Result<Claims> {
        Claims::parse(self.value())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_without_expiry_is_valid() {
        let token = AccessToken::bearer("abc");
        assert!(token.is_valid());
        assert_eq!(token.value(), "abc");
        assert_eq!(token.token_type(), "Bearer");
        assert_eq!(token.header_value(), "Bearer abc");
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let token = AccessToken::bearer("abc").with_expiry(now);

        assert!(!token.is_valid_at(now));
        assert!(!token.is_valid_at(now + Duration::seconds(1)));
        assert!(token.is_valid_at(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_expired_and_future_tokens() {
        let expired = AccessToken::bearer("old").expires_in(Duration::seconds(-10));
        assert!(!expired.is_valid());

        let fresh = AccessToken::bearer("new").expires_in(Duration::hours(1));
        assert!(fresh.is_valid());

        assert!(AccessToken::bearer("max").expires_in(Duration::MAX).is_valid());
        assert!(!AccessToken::bearer("min").expires_in(Duration::MIN).is_valid());
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = AccessToken::bearer("very-secret").with_refresh_token("also-secret");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("also-secret"));
        assert_eq!(token.refresh_token(), Some("also-secret"));
    }
}
