//! Signed JWT client assertions.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};

use super::ClientCertificate;
use crate::{Error, Result};

/// `client_assertion_type` value for JWT bearer assertions.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Claim set of a client assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub aud: String,
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Builds compact RS256 JWTs proving possession of a certificate's key.
#[derive(Debug, Clone)]
pub struct AssertionBuilder<'a> {
    certificate: &'a ClientCertificate,
    client_id: String,
    audience: String,
    lifetime: Option<chrono::Duration>,
}

impl<'a> AssertionBuilder<'a> {
    /// `audience` is normally the token endpoint URL.
    pub fn new(
        certificate: &'a ClientCertificate,
        client_id: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            certificate,
            client_id: client_id.into(),
            audience: audience.into(),
            lifetime: None,
        }
    }

    /// Lifetime of the assertion; `None` omits `exp`.
    pub fn lifetime(mut self, lifetime: Option<std::time::Duration>) -> Self {
        self.lifetime = lifetime.and_then(|l| chrono::Duration::from_std(l).ok());
        self
    }

    pub fn claims_at(&self, now: DateTime<Utc>) -> AssertionClaims {
        AssertionClaims {
            aud: self.audience.clone(),
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: self
                .lifetime
                .and_then(|l| now.checked_add_signed(l))
                .map(|t| t.timestamp()),
        }
    }

    /// Sign an assertion issued now.
    pub fn build(&self) -> Result<String> {
        self.build_at(Utc::now())
    }

    pub fn build_at(&self, now: DateTime<Utc>) -> Result<String> {
        let thumbprint = self.certificate.thumbprint();
        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(thumbprint.to_string());
        header.kid = Some(thumbprint.to_string());

        jsonwebtoken::encode(&header, &self.claims_at(now), self.certificate.encoding_key())
            .map_err(|e| Error::Signing(format!("failed to sign client assertion: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;
    use sha2::Sha256;

    const BUNDLE: &[u8] = include_bytes!("../../tests/fixtures/rsa-bundle.pem");
    const CLIENT_ID: &str = "11111111-1111-1111-1111-111111111111";
    const TOKEN_URL: &str = "https://login.microsoftonline.com/tid/oauth2/v2.0/token";

    fn certificate() -> ClientCertificate {
        ClientCertificate::from_pem(BUNDLE).unwrap()
    }

    fn decode_json(segment: &str) -> serde_json::Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
    }

    #[test]
    fn test_assertion_claims_round_trip_through_parser() {
        let cert = certificate();
        let jwt = AssertionBuilder::new(&cert, CLIENT_ID, TOKEN_URL)
            .lifetime(Some(std::time::Duration::from_secs(600)))
            .build()
            .unwrap();

        let claims = Claims::parse(&jwt).unwrap();
        assert_eq!(claims.issuer.as_deref(), Some(CLIENT_ID));
        assert_eq!(claims.subject.as_deref(), Some(CLIENT_ID));
        assert_eq!(claims.audience, vec![TOKEN_URL.to_string()]);
    }

    #[test]
    fn test_header_carries_thumbprint() {
        let cert = certificate();
        let jwt = AssertionBuilder::new(&cert, CLIENT_ID, TOKEN_URL)
            .build()
            .unwrap();

        let segments: Vec<&str> = jwt.split('.').collect();
        assert_eq!(segments.len(), 3);
        assert!(!jwt.contains('='));

        let header = decode_json(segments[0]);
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["x5t"], cert.thumbprint());
        assert_eq!(header["kid"], cert.thumbprint());
    }

    #[test]
    fn test_exp_follows_lifetime() {
        let cert = certificate();
        let now = Utc::now();

        let builder = AssertionBuilder::new(&cert, CLIENT_ID, TOKEN_URL);
        assert_eq!(builder.claims_at(now).exp, None);

        let claims = builder
            .lifetime(Some(std::time::Duration::from_secs(3600)))
            .claims_at(now);
        assert_eq!(claims.exp, Some(now.timestamp() + 3600));
        assert_eq!(claims.nbf, now.timestamp());
    }

    #[test]
    fn test_signature_verifies_with_certificate_key() {
        let cert = certificate();
        let jwt = AssertionBuilder::new(&cert, CLIENT_ID, TOKEN_URL)
            .build()
            .unwrap();

        let (signing_input, signature) = jwt.rsplit_once('.').unwrap();
        let signature = Signature::try_from(URL_SAFE_NO_PAD.decode(signature).unwrap().as_slice())
            .unwrap();
        let verifying_key = VerifyingKey::<Sha256>::new(cert.public_key().clone());
        verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .unwrap();
    }

    #[test]
    fn test_each_assertion_has_unique_jti() {
        let cert = certificate();
        let builder = AssertionBuilder::new(&cert, CLIENT_ID, TOKEN_URL);
        let now = Utc::now();
        assert_ne!(builder.claims_at(now).jti, builder.claims_at(now).jti);
    }
}
