//! HTTP plumbing shared by the token-endpoint and metadata-endpoint authorizers.

use std::time::Duration;

use chrono::Utc;

use super::response::TokenResponse;
use super::{AccessToken, AuthConfig, TokenVersion};
use crate::{Error, Result};

/// Build the HTTP client used for token requests.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(Error::Network)
}

/// `resource` or `scope` form parameter for the configured endpoint version.
pub(crate) fn target_param(config: &AuthConfig) -> (&'static str, String) {
    match config.token_version {
        TokenVersion::V1 => ("resource", config.environment.resource_endpoint.clone()),
        TokenVersion::V2 => ("scope", config.scopes().join(" ")),
    }
}

/// POST a form to a token endpoint and decode the reply.
pub(crate) async fn post_form(
    client: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
) -> Result<AccessToken> {
    let response = client.post(url).form(form).send().await?;
    read_token(response).await
}

/// Decode a token response, keeping the raw body of failures for diagnostics.
pub(crate) async fn read_token(response: reqwest::Response) -> Result<AccessToken> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        tracing::debug!(status = status.as_u16(), "Token request rejected");
        return Err(Error::TokenEndpoint {
            status: status.as_u16(),
            body,
        });
    }

    TokenResponse::from_body(&body)?.into_access_token(Utc::now())
}
