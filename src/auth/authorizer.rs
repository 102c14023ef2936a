//! Authorizer trait.

use async_trait::async_trait;

use super::AccessToken;
use crate::Result;

/// Header carrying auxiliary-tenant tokens on cross-tenant requests.
pub const AUXILIARY_AUTHORIZATION_HEADER: &str = "x-ms-authorization-auxiliary";

/// Produces access tokens for outbound API requests.
///
/// Implemented by every credential mechanism and by [`CachedAuthorizer`](super::CachedAuthorizer).
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Mechanism name for logging.
    fn name(&self) -> &str;

    /// Obtain a token for the primary tenant.
    async fn token(&self) -> Result<AccessToken>;

    /// Auxiliary tenants this authorizer can issue tokens for.
    fn auxiliary_tenant_ids(&self) -> &[String] {
        &[]
    }

    /// Obtain a token for one auxiliary tenant.
    async fn auxiliary_token(&self, tenant_id: &str) -> Result<AccessToken> {
        Err(crate::Error::config(format!(
            "{} does not support auxiliary tenant '{}'",
            self.name(),
            tenant_id
        )))
    }

    /// Tokens for every auxiliary tenant, in configuration order.
    async fn auxiliary_tokens(&self) -> Result<Vec<AccessToken>> {
        let mut tokens = Vec::with_capacity(self.auxiliary_tenant_ids().len());
        for tenant_id in self.auxiliary_tenant_ids() {
            tokens.push(self.auxiliary_token(tenant_id).await?);
        }
        Ok(tokens)
    }

    /// `Authorization` header (name, value).
    async fn authorization_header(&self) -> Result<(&'static str, String)> {
        let token = self.token().await?;
        Ok(("Authorization", token.header_value()))
    }

    /// Auxiliary authorization header, or `None` without auxiliary tenants.
    async fn auxiliary_authorization_header(&self) -> Result<Option<(&'static str, String)>> {
        let tokens = self.auxiliary_tokens().await?;
        if tokens.is_empty() {
            return Ok(None);
        }
        let value = tokens
            .iter()
            .map(AccessToken::header_value)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Some((AUXILIARY_AUTHORIZATION_HEADER, value)))
    }

    /// Attach both headers to a request.
    async fn authorize_request(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        let (name, value) = self.authorization_header().await?;
        let mut request = request.header(name, value);
        if let Some((name, value)) = self.auxiliary_authorization_header().await? {
            request = request.header(name, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl<A: Authorizer + ?Sized> Authorizer for std::sync::Arc<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn token(&self) -> Result<AccessToken> {
        (**self).token().await
    }

    fn auxiliary_tenant_ids(&self) -> &[String] {
        (**self).auxiliary_tenant_ids()
    }

    async fn auxiliary_token(&self, tenant_id: &str) -> Result<AccessToken> {
        (**self).auxiliary_token(tenant_id).await
    }

    async fn auxiliary_tokens(&self) -> Result<Vec<AccessToken>> {
        (**self).auxiliary_tokens().await
    }
}
