//! Tokens printed by an arbitrary external command.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::present;
use crate::auth::executor::{Executor, ProcessExecutor};
use crate::auth::template::{ArgsTemplate, TemplateContext};
use crate::auth::{AccessToken, AuthConfig, Authorizer};
use crate::{Error, Result};

/// Authorizer that runs a user-supplied command and reads the token from
/// its stdout.
///
/// The argument template is rendered once per tenant at construction.
/// Tokens carry no expiry; bound their reuse with
/// [`CachedAuthorizer::with_max_age`](crate::auth::CachedAuthorizer::with_max_age).
pub struct CustomCommandAuthorizer {
    executor: Arc<dyn Executor>,
    token_type: String,
    primary: Vec<String>,
    auxiliary: HashMap<String, Vec<String>>,
    auxiliary_tenant_ids: Vec<String>,
}

impl std::fmt::Debug for CustomCommandAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomCommandAuthorizer")
            .field("program", &self.primary.first())
            .field("token_type", &self.token_type)
            .field("auxiliary_tenant_ids", &self.auxiliary_tenant_ids)
            .finish()
    }
}

impl CustomCommandAuthorizer {
    pub fn is_configured(config: &AuthConfig) -> bool {
        config
            .custom_command
            .first()
            .is_some_and(|program| present(program))
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::with_executor(
            config,
            Arc::new(ProcessExecutor::new(config.request_timeout)),
        )
    }

    pub fn with_executor(config: &AuthConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        if !Self::is_configured(config) {
            return Err(Error::MissingField {
                mechanism: "custom command",
                field: "custom_command",
            });
        }

        let template = ArgsTemplate::parse(&config.custom_command)?;
        let endpoint = config.environment.resource_endpoint.as_str();
        let render = |tenant_id: &str| {
            template.render(&TemplateContext {
                endpoint,
                tenant_id,
            })
        };

        let auxiliary = config
            .auxiliary_tenant_ids
            .iter()
            .map(|tenant| (tenant.clone(), render(tenant)))
            .collect();

        Ok(Self {
            executor,
            token_type: config.custom_token_type().to_string(),
            primary: render(&config.tenant_id),
            auxiliary,
            auxiliary_tenant_ids: config.auxiliary_tenant_ids.clone(),
        })
    }

    /// Rendered argv for the primary tenant.
    pub fn argv(&self) -> &[String] {
        &self.primary
    }

    async fn run(&self, argv: &[String]) -> Result<AccessToken> {
        let program = argv.first().map(String::as_str).unwrap_or_default();
        tracing::debug!(program, "Running custom token command");

        let output = self.executor.run(argv).await?.check(program)?;

        let value = output.token_text();
        if value.is_empty() {
            return Err(Error::EmptyToken(program.to_string()));
        }
        Ok(AccessToken::new(value, self.token_type.clone()))
    }
}

#[async_trait]
impl Authorizer for CustomCommandAuthorizer {
    fn name(&self) -> &str {
        "custom_command"
    }

    async fn token(&self) -> Result<AccessToken> {
        self.run(&self.primary).await
    }

    fn auxiliary_tenant_ids(&self) -> &[String] {
        &self.auxiliary_tenant_ids
    }

    async fn auxiliary_token(&self, tenant_id: &str) -> Result<AccessToken> {
        let argv = self.auxiliary.get(tenant_id).ok_or_else(|| {
            Error::config(format!("'{}' is not a configured auxiliary tenant", tenant_id))
        })?;
        self.run(argv).await
    }
}
