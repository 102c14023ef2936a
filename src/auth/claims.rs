//! Access token claims introspection.
//!
//! [`Claims::parse`] decodes the payload of a token this process obtained
//! itself. The signature is **not** verified, so the result must never be used
//! to make trust decisions about tokens received from someone else.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{Error, Result};

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Normalized view of a token's payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims {
    pub subject: Option<String>,
    pub audience: Vec<String>,
    pub issuer: Option<String>,
    pub tenant_id: Option<String>,
    pub app_id: Option<String>,
    pub app_display_name: Option<String>,
    pub object_id: Option<String>,
    pub roles: Vec<String>,
    /// Space-separated delegated scopes (`scp`).
    pub scope: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub version: Option<String>,
    pub id_type: Option<String>,
    pub identity_provider: Option<String>,
    pub unique_name: Option<String>,
    pub tenant_region: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => s.split_whitespace().map(str::to_string).collect(),
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    aud: Option<OneOrMany>,
    iss: Option<String>,
    tid: Option<String>,
    appid: Option<String>,
    azp: Option<String>,
    app_displayname: Option<String>,
    oid: Option<String>,
    roles: Option<OneOrMany>,
    scp: Option<OneOrMany>,
    exp: Option<f64>,
    iat: Option<f64>,
    nbf: Option<f64>,
    ver: Option<String>,
    idtyp: Option<String>,
    idp: Option<String>,
    unique_name: Option<String>,
    upn: Option<String>,
    tenant_region_scope: Option<String>,
}

fn timestamp(seconds: Option<f64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s.trunc() as i64, 0))
}

impl Claims {
    /// Decode the payload segment of a compact JWT without verifying it.
    pub fn parse(token: &str) -> Result<Self> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() < 2 {
            return Err(Error::Claims(format!(
                "expected at least 2 dot-separated segments, found {}",
                segments.len()
            )));
        }

        let payload = URL_SAFE_LENIENT
            .decode(segments[1])
            .map_err(|e| Error::Claims(format!("payload is not base64url: {}", e)))?;
        let raw: RawClaims = serde_json::from_slice(&payload)
            .map_err(|e| Error::Claims(format!("payload is not a JSON claim set: {}", e)))?;

        Ok(Self {
            subject: raw.sub,
            audience: raw.aud.map(OneOrMany::into_vec).unwrap_or_default(),
            issuer: raw.iss,
            tenant_id: raw.tid,
            app_id: raw.appid.or(raw.azp),
            app_display_name: raw.app_displayname,
            object_id: raw.oid,
            roles: raw.roles.map(OneOrMany::into_vec).unwrap_or_default(),
            scope: raw.scp.map(|s| s.into_vec().join(" ")),
            expires: timestamp(raw.exp),
            issued_at: timestamp(raw.iat),
            not_before: timestamp(raw.nbf),
            version: raw.ver,
            id_type: raw.idtyp,
            identity_provider: raw.idp,
            unique_name: raw.unique_name.or(raw.upn),
            tenant_region: raw.tenant_region_scope,
        })
    }

    /// Individual delegated scopes.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(&scope)
    }
}
