//! Client credentials grant with a shared secret.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{present, require};
use crate::auth::endpoint::{http_client, post_form, target_param};
use crate::auth::{AccessToken, AuthConfig, Authorizer, Environment, TokenVersion};
use crate::{Error, Result};

const MECHANISM: &str = "client secret";

/// Authorizer for `grant_type=client_credentials` with `client_secret`.
pub struct ClientSecretAuthorizer {
    client: reqwest::Client,
    environment: Environment,
    token_version: TokenVersion,
    target: (&'static str, String),
    tenant_id: String,
    auxiliary_tenant_ids: Vec<String>,
    client_id: String,
    client_secret: SecretString,
}

impl std::fmt::Debug for ClientSecretAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretAuthorizer")
            .field("environment", &self.environment.name)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

impl ClientSecretAuthorizer {
    /// Whether every required field is present.
    pub fn is_configured(config: &AuthConfig) -> bool {
        present(&config.tenant_id)
            && present(&config.client_id)
            && config
                .client_secret
                .as_ref()
                .is_some_and(|s| !s.expose_secret().is_empty())
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        require(&config.tenant_id, MECHANISM, "tenant_id")?;
        require(&config.client_id, MECHANISM, "client_id")?;
        let client_secret = config
            .client_secret
            .clone()
            .filter(|s| !s.expose_secret().is_empty())
            .ok_or(Error::MissingField {
                mechanism: MECHANISM,
                field: "client_secret",
            })?;

        Ok(Self {
            client: http_client(config.request_timeout)?,
            environment: config.environment.clone(),
            token_version: config.token_version,
            target: target_param(config),
            tenant_id: config.tenant_id.clone(),
            auxiliary_tenant_ids: config.auxiliary_tenant_ids.clone(),
            client_id: config.client_id.clone(),
            client_secret,
        })
    }

    async fn request(&self, tenant_id: &str) -> Result<AccessToken> {
        let url = self.environment.token_url(tenant_id, self.token_version);
        tracing::debug!(tenant_id, "Requesting token with client secret");

        let (target_name, target_value) = (self.target.0, self.target.1.as_str());
        post_form(
            &self.client,
            &url,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", self.client_secret.expose_secret()),
                (target_name, target_value),
            ],
        )
        .await
    }
}

#[async_trait]
impl Authorizer for ClientSecretAuthorizer {
    fn name(&self) -> &str {
        "client_secret"
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
