//! # graph-authorizer
//!
//! Obtains and keeps valid the bearer tokens used to call a Microsoft Graph
//! style REST API.
//!
//! Five mechanisms are supported: client secret, certificate-backed client
//! assertion, Azure CLI delegation, managed identity and an arbitrary external
//! command. [`auth::select`] picks exactly one of them from an
//! [`auth::AuthConfig`], and [`auth::CachedAuthorizer`] shares a single cached
//! token across any number of concurrent callers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graph_authorizer::auth::{AuthConfig, Authorizer, CachedAuthorizer, select};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), graph_authorizer::Error> {
//!     let config = AuthConfig::builder()
//!         .tenant_id("00000000-0000-0000-0000-000000000000")
//!         .client_id("11111111-1111-1111-1111-111111111111")
//!         .client_secret("super-secret")
//!         .enable_client_secret_auth(true)
//!         .build();
//!
//!     let authorizer = CachedAuthorizer::from_arc(select(&config)?);
//!     let token = authorizer.token().await?;
//!     println!("token type: {}", token.token_type());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod auth;

use std::sync::Arc;
use std::time::Duration;

pub use auth::{
    AccessToken, AuthConfig, AuthConfigBuilder, Authorizer, CachedAuthorizer, Claims,
    Environment, TokenVersion, select,
};

/// Error type for graph-authorizer operations.
///
/// Variants are grouped by [`ErrorCategory`] so callers can tell a
/// misconfiguration apart from an unreachable server or a garbled reply.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A mechanism was enabled without one of its required fields.
    #[error("{mechanism} authentication requires {field}")]
    MissingField {
        mechanism: &'static str,
        field: &'static str,
    },

    /// No mechanism was both enabled and fully configured.
    #[error("no authorizer could be configured, please check your configuration")]
    NoAuthorizer,

    /// Command template could not be parsed.
    #[error("Invalid command template: {0}")]
    Template(String),

    /// The credential holds a key that cannot sign RS256 assertions.
    #[error("Unsupported private key: {0}")]
    UnsupportedKey(String),

    /// Certificate or key material could not be decoded.
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Producing the assertion signature failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Connection-level HTTP failure.
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The token endpoint answered with a non-success status.
    #[error("Token request failed (HTTP {status}): {body}")]
    TokenEndpoint { status: u16, body: String },

    /// An external command exited unsuccessfully.
    #[error("{program} failed{}: {stderr}", match status {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    })]
    Command {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    /// An external command could not be started.
    #[error("Failed to run {program}: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation exceeded its deadline.
    #[error("Operation timed out after {}", format_budget(.0))]
    Timeout(Duration),

    /// The caller cancelled its wait.
    #[error("Operation cancelled")]
    Cancelled,

    /// The token endpoint replied with an unusable body.
    #[error("Invalid token response: {0}")]
    TokenResponse(String),

    /// An access token could not be decoded into claims.
    #[error("Invalid token claims: {0}")]
    Claims(String),

    /// A mechanism produced an empty token.
    #[error("{0} returned an empty token")]
    EmptyToken(String),

    /// Failure of a refresh that several callers were waiting on.
    #[error(transparent)]
    Shared(Arc<Error>),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid configuration, detected before any I/O.
    Configuration,
    /// Certificate decoding or signing failures.
    Crypto,
    /// Network, HTTP status, subprocess or deadline failures.
    Transport,
    /// The remote side answered with something that could not be decoded.
    Parse,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::MissingField { .. }
            | Error::NoAuthorizer
            | Error::Template(_)
            | Error::UnsupportedKey(_) => ErrorCategory::Configuration,

            Error::Certificate(_) | Error::Signing(_) => ErrorCategory::Crypto,

            Error::Network(_)
            | Error::TokenEndpoint { .. }
            | Error::Command { .. }
            | Error::CommandSpawn { .. }
            | Error::Timeout(_)
            | Error::Cancelled => ErrorCategory::Transport,

            Error::TokenResponse(_) | Error::Claims(_) | Error::EmptyToken(_) => {
                ErrorCategory::Parse
            }

            Error::Shared(inner) => inner.category(),
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_transport_error(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }

    pub fn is_parse_error(&self) -> bool {
        self.category() == ErrorCategory::Parse
    }

    /// The error behind any [`Error::Shared`] wrapping.
    pub fn root(&self) -> &Error {
        match self {
            Error::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

impl From<Arc<Error>> for Error {
    fn from(error: Arc<Error>) -> Self {
        Error::Shared(error)
    }
}

fn format_budget(budget: &Duration) -> String {
    if *budget < Duration::from_secs(1) {
        format!("{}ms", budget.as_millis())
    } else {
        format!("{:.1}s", budget.as_secs_f64())
    }
}

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(Error::NoAuthorizer.is_configuration_error());
        assert!(
            Error::MissingField {
                mechanism: "client secret",
                field: "tenant_id"
            }
            .is_configuration_error()
        );
        assert_eq!(
            Error::Certificate("bad".into()).category(),
            ErrorCategory::Crypto
        );
        assert!(
            Error::TokenEndpoint {
                status: 401,
                body: "nope".into()
            }
            .is_transport_error()
        );
        assert!(Error::Claims("garbage".into()).is_parse_error());
    }

    #[test]
    fn test_shared_error_keeps_category() {
        let shared = Error::from(Arc::new(Error::TokenResponse("not json".into())));
        assert!(shared.is_parse_error());
        assert!(matches!(shared.root(), Error::TokenResponse(_)));
        assert_eq!(shared.to_string(), "Invalid token response: not json");
    }

    #[test]
    fn test_command_error_message() {
        let err = Error::Command {
            program: "az".into(),
            status: Some(1),
            stderr: "Please run 'az login'".into(),
        };
        assert_eq!(
            err.to_string(),
            "az failed with exit code 1: Please run 'az login'"
        );
    }

    #[test]
    fn test_timeout_message_precision() {
        assert_eq!(
            Error::Timeout(Duration::from_millis(50)).to_string(),
            "Operation timed out after 50ms"
        );
        assert_eq!(
            Error::Timeout(Duration::from_millis(2500)).to_string(),
            "Operation timed out after 2.5s"
        );
    }
}
