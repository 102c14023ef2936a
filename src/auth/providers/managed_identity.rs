//! Managed identity through the instance metadata service.

use async_trait::async_trait;

use super::present;
use crate::auth::endpoint::{http_client, read_token};
use crate::auth::{AccessToken, AuthConfig, Authorizer};
use crate::{Error, Result};

const IMDS_API_VERSION: &str = "2018-02-01";

/// Authorizer backed by the platform-issued identity of the host.
///
/// Managed identities are bound to a single tenant, so no auxiliary tokens
/// are available.
#[derive(Debug)]
pub struct ManagedIdentityAuthorizer {
    client: reqwest::Client,
    endpoint: String,
    resource: String,
    client_id: Option<String>,
}

impl ManagedIdentityAuthorizer {
    pub fn is_configured(config: &AuthConfig) -> bool {
        present(&config.environment.managed_identity_endpoint)
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        if !Self::is_configured(config) {
            return Err(Error::MissingField {
                mechanism: "managed identity",
                field: "managed_identity_endpoint",
            });
        }

        url::Url::parse(&config.environment.managed_identity_endpoint).map_err(|e| {
            Error::config(format!(
                "invalid managed identity endpoint '{}': {}",
                config.environment.managed_identity_endpoint, e
            ))
        })?;

        Ok(Self {
            client: http_client(config.request_timeout)?,
            endpoint: config.environment.managed_identity_endpoint.clone(),
            resource: config.environment.resource_endpoint.clone(),
            client_id: config
                .managed_identity_client_id
                .clone()
                .filter(|id| !id.is_empty()),
        })
    }
}

#[async_trait]
impl Authorizer for ManagedIdentityAuthorizer {
    fn name(&self) -> &str {
        "managed_identity"
    }

    async fn token(&self) -> Result<AccessToken> {
        tracing::debug!(
            endpoint = %self.endpoint,
            user_assigned = self.client_id.is_some(),
            "Requesting managed identity token"
        );

        let mut query = vec![
            ("api-version", IMDS_API_VERSION),
            ("resource", self.resource.as_str()),
        ];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await?;
        read_token(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Environment;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> AuthConfig {
        AuthConfig::builder()
            .environment(Environment::global().with_managed_identity_endpoint(format!(
                "{}/metadata/identity/oauth2/token",
                server.uri()
            )))
            .enable_managed_identity_auth(true)
            .build()
    }

    #[tokio::test]
    async fn test_system_assigned_identity() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("api-version", "2018-02-01"))
            .and(query_param("resource", "https://graph.microsoft.com"))
            .and(query_param_is_missing("client_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "imds-token",
                "expires_in": "86399",
                "expires_on": "4102444800",
                "resource": "https://graph.microsoft.com",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let authorizer = ManagedIdentityAuthorizer::from_config(&config(&server)).unwrap();
        let token = authorizer.token().await.unwrap();

        assert_eq!(token.value(), "imds-token");
        assert!(token.is_valid());
        assert!(authorizer.auxiliary_tokens().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_assigned_identity_and_expires_on() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("client_id", "user-assigned-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "user-assigned-token",
                "expires_on": 4102444800u64,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.managed_identity_client_id = Some("user-assigned-id".into());

        let authorizer = ManagedIdentityAuthorizer::from_config(&config).unwrap();
        let token = authorizer.token().await.unwrap();

        assert_eq!(token.value(), "user-assigned-token");
        assert_eq!(token.expires_at().unwrap().timestamp(), 4_102_444_800);
    }

    #[tokio::test]
    async fn test_identity_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":"invalid_request","error_description":"Identity not found"}"#,
            ))
            .mount(&server)
            .await;

        let authorizer = ManagedIdentityAuthorizer::from_config(&config(&server)).unwrap();
        let err = authorizer.token().await.unwrap_err();

        assert!(matches!(err, Error::TokenEndpoint { status: 400, .. }));
        assert!(err.to_string().contains("Identity not found"));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = AuthConfig::builder()
            .environment(Environment::global().with_managed_identity_endpoint("not a url"))
            .build();
        let err = ManagedIdentityAuthorizer::from_config(&config).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
