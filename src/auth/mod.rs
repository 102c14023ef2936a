//! Credential acquisition and caching.
//!
//! Provides five authentication mechanisms behind the [`Authorizer`] trait:
//! - **Client certificate**: RS256 client assertion signed with a certificate key
//! - **Client secret**: OAuth2 client credentials grant
//! - **Azure CLI**: token borrowed from a signed-in `az` session
//! - **Managed identity**: instance metadata service of the host
//! - **Custom command**: token printed by an external program
//!
//! [`select`] picks one of them from an [`AuthConfig`] and
//! [`CachedAuthorizer`] shares its tokens across concurrent callers.

mod assertion;
mod authorizer;
mod cache;
mod certificate;
mod claims;
mod config;
mod endpoint;
mod env;
mod environment;
mod executor;
mod providers;
mod response;
mod selection;
mod template;
mod token;

pub use assertion::{AssertionBuilder, AssertionClaims, CLIENT_ASSERTION_TYPE};
pub use authorizer::{AUXILIARY_AUTHORIZATION_HEADER, Authorizer};
pub use cache::CachedAuthorizer;
pub use certificate::ClientCertificate;
pub use claims::Claims;
pub use config::{
    AuthConfig, AuthConfigBuilder, DEFAULT_ASSERTION_LIFETIME, DEFAULT_AZURE_CLI,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOKEN_TYPE, ENV_PREFIX, TokenVersion,
};
pub use environment::{DEFAULT_MANAGED_IDENTITY_ENDPOINT, Environment};
pub use executor::{CommandOutput, Executor, ProcessExecutor, unquote};
pub use providers::{
    AzureCliAuthorizer, ClientCertificateAuthorizer, ClientSecretAuthorizer,
    CustomCommandAuthorizer, ManagedIdentityAuthorizer,
};
pub use response::TokenResponse;
pub use selection::{Mechanism, preferred_mechanism, select, select_with_executor};
pub use template::{ArgsTemplate, TemplateContext};
pub use token::AccessToken;
