//! Choosing one authorizer from a configuration.

use std::fmt;
use std::sync::Arc;

use super::executor::{Executor, ProcessExecutor};
use super::providers::{
    AzureCliAuthorizer, ClientCertificateAuthorizer, ClientSecretAuthorizer,
    CustomCommandAuthorizer, ManagedIdentityAuthorizer,
};
use super::{AuthConfig, Authorizer};
use crate::{Error, Result};

/// Authentication mechanisms, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    ClientCertificate,
    ClientSecret,
    AzureCli,
    ManagedIdentity,
    CustomCommand,
}

impl Mechanism {
    /// Order in which [`select`] considers mechanisms.
    pub const PREFERENCE: [Mechanism; 5] = [
        Mechanism::ClientCertificate,
        Mechanism::ClientSecret,
        Mechanism::AzureCli,
        Mechanism::ManagedIdentity,
        Mechanism::CustomCommand,
    ];

    pub fn is_enabled(self, config: &AuthConfig) -> bool {
        match self {
            Mechanism::ClientCertificate => config.enable_client_certificate_auth,
            Mechanism::ClientSecret => config.enable_client_secret_auth,
            Mechanism::AzureCli => config.enable_azure_cli_auth,
            Mechanism::ManagedIdentity => config.enable_managed_identity_auth,
            Mechanism::CustomCommand => config.enable_custom_command_auth,
        }
    }

    /// Whether every field the mechanism requires is present.
    pub fn is_configured(self, config: &AuthConfig) -> bool {
        match self {
            Mechanism::ClientCertificate => ClientCertificateAuthorizer::is_configured(config),
            Mechanism::ClientSecret => ClientSecretAuthorizer::is_configured(config),
            Mechanism::AzureCli => AzureCliAuthorizer::is_configured(config),
            Mechanism::ManagedIdentity => ManagedIdentityAuthorizer::is_configured(config),
            Mechanism::CustomCommand => CustomCommandAuthorizer::is_configured(config),
        }
    }

    fn build(
        self,
        config: &AuthConfig,
        executor: Arc<dyn Executor>,
    ) -> Result<Arc<dyn Authorizer>> {
        Ok(match self {
            Mechanism::ClientCertificate => {
                Arc::new(ClientCertificateAuthorizer::from_config(config)?)
            }
            Mechanism::ClientSecret => Arc::new(ClientSecretAuthorizer::from_config(config)?),
            Mechanism::AzureCli => Arc::new(AzureCliAuthorizer::with_executor(config, executor)?),
            Mechanism::ManagedIdentity => {
                Arc::new(ManagedIdentityAuthorizer::from_config(config)?)
            }
            Mechanism::CustomCommand => {
                Arc::new(CustomCommandAuthorizer::with_executor(config, executor)?)
            }
        })
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mechanism::ClientCertificate => "client certificate",
            Mechanism::ClientSecret => "client secret",
            Mechanism::AzureCli => "azure cli",
            Mechanism::ManagedIdentity => "managed identity",
            Mechanism::CustomCommand => "custom command",
        };
        f.write_str(name)
    }
}

/// The mechanism [`select`] would construct, if any.
pub fn preferred_mechanism(config: &AuthConfig) -> Option<Mechanism> {
    Mechanism::PREFERENCE
        .into_iter()
        .find(|m| m.is_enabled(config) && m.is_configured(config))
}

/// Construct the first mechanism that is both enabled and fully configured.
///
/// A construction failure is returned as is; selection never falls back to a
/// weaker mechanism once a stronger one was chosen.
pub fn select(config: &AuthConfig) -> Result<Arc<dyn Authorizer>> {
    select_with_executor(
        config,
        Arc::new(ProcessExecutor::new(config.request_timeout)),
    )
}

/// [`select`] with a custom subprocess runner for command-backed mechanisms.
pub fn select_with_executor(
    config: &AuthConfig,
    executor: Arc<dyn Executor>,
) -> Result<Arc<dyn Authorizer>> {
    for mechanism in Mechanism::PREFERENCE {
        if !mechanism.is_enabled(config) {
            continue;
        }
        if !mechanism.is_configured(config) {
            tracing::debug!(%mechanism, "Mechanism enabled but not fully configured, skipping");
            continue;
        }

        let authorizer = mechanism.build(config, executor.clone()).map_err(|e| {
            tracing::warn!(%mechanism, error = %e, "Failed to construct authorizer");
            e
        })?;
        tracing::info!(%mechanism, "Selected authorizer");
        return Ok(authorizer);
    }

    Err(Error::NoAuthorizer)
}
