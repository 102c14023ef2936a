//! Token endpoint response decoding.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};

use super::AccessToken;
use crate::{Error, Result};

/// JSON body returned by OAuth2 token endpoints and the instance metadata service.
///
/// Numeric lifetimes may be encoded as JSON strings, integers or floats.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "flexible_seconds")]
    pub expires_in: Option<i64>,
    #[serde(default, deserialize_with = "flexible_seconds")]
    pub ext_expires_in: Option<i64>,
    /// Absolute expiry in unix seconds.
    #[serde(default, deserialize_with = "flexible_seconds")]
    pub expires_on: Option<i64>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlexibleNumber {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FlexibleNumber {
    fn seconds(self) -> std::result::Result<i64, String> {
        match self {
            FlexibleNumber::Integer(n) => Ok(n),
            FlexibleNumber::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
            FlexibleNumber::Float(f) => Err(format!("non-finite number {}", f)),
            FlexibleNumber::Text(s) => {
                let s = s.trim();
                if let Ok(n) = s.parse::<i64>() {
                    return Ok(n);
                }
                match s.parse::<f64>() {
                    Ok(f) if f.is_finite() => Ok(f.trunc() as i64),
                    _ => Err(format!("'{}' is not a number of seconds", s)),
                }
            }
        }
    }
}

fn flexible_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<FlexibleNumber>::deserialize(deserializer)?
        .map(FlexibleNumber::seconds)
        .transpose()
        .map_err(serde::de::Error::custom)
}

impl TokenResponse {
    /// Decode a response body.
    pub fn from_body(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| Error::TokenResponse(e.to_string()))
    }

    /// Lifetime normalized from `expires_in`; `None` when absent or out of range.
    pub fn lifetime(&self) -> Option<Duration> {
        self.expires_in.and_then(Duration::try_seconds)
    }

    /// Convert to an [`AccessToken`] whose expiry is computed relative to `now`.
    pub fn into_access_token(self, now: DateTime<Utc>) -> Result<AccessToken> {
        if self.access_token.trim().is_empty() {
            return Err(Error::TokenResponse("missing access_token".into()));
        }

        let expires_at = match (self.expires_in, self.expires_on) {
            (Some(seconds), _) => Some(
                Duration::try_seconds(seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        Error::TokenResponse(format!("expires_in {} is out of range", seconds))
                    })?,
            ),
            (None, Some(unix)) => Some(DateTime::from_timestamp(unix, 0).ok_or_else(|| {
                Error::TokenResponse(format!("expires_on {} is out of range", unix))
            })?),
            (None, None) => None,
        };

        let token_type = self
            .token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Bearer".to_string());

        let mut token = AccessToken::new(self.access_token, token_type);
        if let Some(expires_at) = expires_at {
            token = token.with_expiry(expires_at);
        }
        if let Some(refresh_token) = self.refresh_token {
            token = token.with_refresh_token(refresh_token);
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(expires_in: &str) -> TokenResponse {
        TokenResponse::from_body(&format!(
            r#"{{"access_token":"tok","token_type":"Bearer","expires_in":{}}}"#,
            expires_in
        ))
        .unwrap()
    }

    #[test]
    fn test_expires_in_encodings_normalize() {
        for raw in [r#""3600""#, "3600", "3600.0"] {
            let response = parse(raw);
            assert_eq!(response.expires_in, Some(3600), "encoding {}", raw);
            assert_eq!(response.lifetime(), Some(Duration::seconds(3600)));
        }
    }

    #[test]
    fn test_expiry_relative_to_now() {
        let now = Utc::now();
        let token = parse("3600").into_access_token(now).unwrap();
        assert_eq!(token.expires_at(), Some(now + Duration::seconds(3600)));
        assert_eq!(token.token_type(), "Bearer");
    }

    #[test]
    fn test_expires_on_used_without_expires_in() {
        let response = TokenResponse::from_body(
            r#"{"access_token":"tok","token_type":"Bearer","expires_on":"4102444800"}"#,
        )
        .unwrap();
        let token = response.into_access_token(Utc::now()).unwrap();
        assert_eq!(token.expires_at().unwrap().timestamp(), 4_102_444_800);
    }

    #[test]
    fn test_missing_access_token() {
        let response = TokenResponse::from_body(r#"{"token_type":"Bearer"}"#).unwrap();
        let err = response.into_access_token(Utc::now()).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_garbage_body_is_parse_error() {
        let err = TokenResponse::from_body("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, Error::TokenResponse(_)));

        let err = TokenResponse::from_body(r#"{"access_token":"t","expires_in":"soon"}"#)
            .unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_optional_fields() {
        let response = TokenResponse::from_body(
            r#"{"access_token":"tok","expires_in":60,"ext_expires_in":"120","resource":"https://graph.microsoft.com","refresh_token":"r","id_token":"i"}"#,
        )
        .unwrap();
        assert_eq!(response.ext_expires_in, Some(120));
        assert_eq!(response.resource.as_deref(), Some("https://graph.microsoft.com"));
        assert_eq!(response.id_token.as_deref(), Some("i"));

        let token = response.into_access_token(Utc::now()).unwrap();
        assert_eq!(token.refresh_token(), Some("r"));
        assert_eq!(token.token_type(), "Bearer");
    }

    #[test]
    fn test_out_of_range_expiry_is_parse_error() {
        for raw in ["9223372036854775807", "1e300", r#""1e300""#, "-9223372036854775808"] {
            let response = parse(raw);
            assert_eq!(response.lifetime(), None, "encoding {}", raw);
            let err = response.into_access_token(Utc::now()).unwrap_err();
            assert!(matches!(err, Error::TokenResponse(_)), "encoding {}: {:?}", raw, err);
            assert!(err.to_string().contains("out of range"));
        }

        let response = TokenResponse::from_body(
            r#"{"access_token":"tok","expires_on":9223372036854775807}"#,
        )
        .unwrap();
        let err = response.into_access_token(Utc::now()).unwrap_err();
        assert!(err.is_parse_error());
        assert!(err.to_string().contains("expires_on"));
    }
}
