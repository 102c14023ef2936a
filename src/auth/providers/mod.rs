//! Credential mechanisms.

mod azure_cli;
mod client_certificate;
mod client_secret;
mod custom_command;
mod managed_identity;

pub use azure_cli::AzureCliAuthorizer;
pub use client_certificate::ClientCertificateAuthorizer;
pub use client_secret::ClientSecretAuthorizer;
pub use custom_command::CustomCommandAuthorizer;
pub use managed_identity::ManagedIdentityAuthorizer;

use crate::{Error, Result};

/// A required text field counts as set only when it has non-whitespace content.
fn present(value: &str) -> bool {
    !value.trim().is_empty()
}

fn require(value: &str, mechanism: &'static str, field: &'static str) -> Result<()> {
    if !present(value) {
        return Err(Error::MissingField { mechanism, field });
    }
    Ok(())
}
