//! Client credentials grant with a signed certificate assertion.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use super::{present, require};
use crate::auth::assertion::{AssertionBuilder, CLIENT_ASSERTION_TYPE};
use crate::auth::endpoint::{http_client, post_form, target_param};
use crate::auth::{
    AccessToken, AuthConfig, Authorizer, ClientCertificate, Environment, TokenVersion,
};
use crate::{Error, Result};

const MECHANISM: &str = "client certificate";

/// Authorizer presenting an RS256 client assertion instead of a secret.
///
/// The certificate is decoded once at construction, so a malformed store or
/// an unsupported key type surfaces before any network traffic. A fresh
/// assertion is signed for every token request.
#[derive(Debug)]
pub struct ClientCertificateAuthorizer {
    client: reqwest::Client,
    environment: Environment,
    token_version: TokenVersion,
    target: (&'static str, String),
    tenant_id: String,
    auxiliary_tenant_ids: Vec<String>,
    client_id: String,
    certificate: ClientCertificate,
    audience: Option<String>,
    lifetime: Option<Duration>,
}

impl ClientCertificateAuthorizer {
    pub fn is_configured(config: &AuthConfig) -> bool {
        present(&config.tenant_id) && present(&config.client_id) && config.has_certificate()
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        require(&config.tenant_id, MECHANISM, "tenant_id")?;
        require(&config.client_id, MECHANISM, "client_id")?;

        let data = load_certificate(config)?;
        let password = config
            .client_certificate_password
            .as_ref()
            .map(|p| p.expose_secret());
        let certificate = ClientCertificate::from_bytes(&data, password)?;

        tracing::debug!(
            thumbprint = certificate.thumbprint(),
            "Loaded client certificate"
        );

        Self::with_certificate(config, certificate)
    }

    /// Build from an already decoded certificate.
    pub fn with_certificate(config: &AuthConfig, certificate: ClientCertificate) -> Result<Self> {
        Ok(Self {
            client: http_client(config.request_timeout)?,
            environment: config.environment.clone(),
            token_version: config.token_version,
            target: target_param(config),
            tenant_id: config.tenant_id.clone(),
            auxiliary_tenant_ids: config.auxiliary_tenant_ids.clone(),
            client_id: config.client_id.clone(),
            certificate,
            audience: config.assertion_audience.clone().filter(|a| !a.is_empty()),
            lifetime: config.assertion_lifetime,
        })
    }

    pub fn certificate(&self) -> &ClientCertificate {
        &self.certificate
    }

    async fn request(&self, tenant_id: &str) -> Result<AccessToken> {
        let url = self.environment.token_url(tenant_id, self.token_version);
        let audience = self.audience.as_deref().unwrap_or(&url);

        let assertion = AssertionBuilder::new(&self.certificate, &self.client_id, audience)
            .lifetime(self.lifetime)
            .build()?;

        tracing::debug!(tenant_id, "Requesting token with client assertion");

        let (target_name, target_value) = (self.target.0, self.target.1.as_str());
        post_form(
            &self.client,
            &url,
            &[
                ("client_assertion", assertion.as_str()),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_id", &self.client_id),
                ("grant_type", "client_credentials"),
                (target_name, target_value),
            ],
        )
        .await
    }
}

fn load_certificate(config: &AuthConfig) -> Result<Vec<u8>> {
    if let Some(data) = config
        .client_certificate_data
        .as_ref()
        .filter(|d| !d.expose_secret().is_empty())
    {
        return Ok(data.expose_secret().clone());
    }

    let path = config
        .client_certificate_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(Error::MissingField {
            mechanism: MECHANISM,
            field: "client_certificate_data",
        })?;

    std::fs::read(path).map_err(|e| {
        Error::config(format!(
            "failed to read client certificate '{}': {}",
            path, e
        ))
    })
}

#[async_trait]
impl Authorizer for ClientCertificateAuthorizer {
    fn name(&self) -> &str {
        "client_certificate"
    }

    async fn token(&self) -> Result<AccessToken> {
        self.request(&self.tenant_id).await
    }

    fn auxiliary_tenant_ids(&self) -> &[String] {
        &self.auxiliary_tenant_ids
    }

    async fn auxiliary_token(&self, tenant_id: &str) -> Result<AccessToken> {
        self.request(tenant_id).await
    }
}
