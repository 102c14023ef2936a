//! Delegated sign-in through the Azure CLI.

use std::sync::Arc;

use async_trait::async_trait;

use super::present;
use crate::auth::executor::{Executor, ProcessExecutor};
use crate::auth::{AccessToken, AuthConfig, Authorizer, Claims};
use crate::{Error, Result};

/// Authorizer that borrows the signed-in `az` session.
///
/// Runs `az account get-access-token` and uses the trimmed stdout as the
/// token. The expiry is taken from the token's own `exp` claim when it can be
/// decoded.
pub struct AzureCliAuthorizer {
    executor: Arc<dyn Executor>,
    program: String,
    resource: String,
    tenant_id: String,
    auxiliary_tenant_ids: Vec<String>,
}

impl std::fmt::Debug for AzureCliAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCliAuthorizer")
            .field("program", &self.program)
            .field("resource", &self.resource)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl AzureCliAuthorizer {
    /// The CLI carries its own sign-in state, so nothing else is required.
    pub fn is_configured(config: &AuthConfig) -> bool {
        present(&config.azure_cli_path)
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
                mechanism: "azure cli",
                field: "azure_cli_path",
            });
        }
        Ok(Self {
            executor,
            program: config.azure_cli_path.clone(),
            resource: config.environment.resource_endpoint.clone(),
            tenant_id: config.tenant_id.clone(),
            auxiliary_tenant_ids: config.auxiliary_tenant_ids.clone(),
        })
    }

    fn argv(&self, tenant_id: &str) -> Vec<String> {
        let mut argv: Vec<String> = [
            self.program.as_str(),
            "account",
            "get-access-token",
            "--resource",
            self.resource.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if !tenant_id.is_empty() {
            argv.push("--tenant".into());
            argv.push(tenant_id.into());
        }
        argv.extend(
            ["--query", "accessToken", "--output", "json"]
                .iter()
                .map(|s| s.to_string()),
        );
        argv
    }

    async fn request(&self, tenant_id: &str) -> Result<AccessToken> {
        tracing::debug!(tenant_id, "Requesting token from Azure CLI");

        let output = self
            .executor
            .run(&self.argv(tenant_id))
            .await?
            .check(&self.program)?;

        let value = output.token_text();
        if value.is_empty() {
            return Err(Error::EmptyToken(self.program.clone()));
        }

        let token = AccessToken::bearer(value);
        match Claims::parse(token.value()).ok().and_then(|c| c.expires) {
            Some(expires) => Ok(token.with_expiry(expires)),
            None => Ok(token),
        }
    }
}

#[async_trait]
impl Authorizer for AzureCliAuthorizer {
    fn name(&self) -> &str {
        "azure_cli"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CommandOutput;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use std::sync::Mutex;

    struct FakeExecutor {
        output: CommandOutput,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeExecutor {
        fn stdout(stdout: &str) -> Arc<Self> {
            Arc::new(Self {
                output: CommandOutput {
                    status: Some(0),
                    success: true,
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: Vec::new(),
                },
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: i32, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                output: CommandOutput {
                    status: Some(status),
                    success: false,
                    stdout: Vec::new(),
                    stderr: stderr.as_bytes().to_vec(),
                },
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn run(&self, argv: &[String]) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(argv.to_vec());
            Ok(self.output.clone())
        }
    }

    fn config() -> AuthConfig {
        AuthConfig::builder()
            .tenant_id("home-tenant")
            .auxiliary_tenant_id("aux-tenant")
            .enable_azure_cli_auth(true)
            .build()
    }

    #[tokio::test]
    async fn test_argv_and_unquoted_token() {
        let executor = FakeExecutor::stdout("\"opaque-cli-token\"\n");
        let authorizer = AzureCliAuthorizer::with_executor(&config(), executor.clone()).unwrap();

        let token = authorizer.token().await.unwrap();
        assert_eq!(token.value(), "opaque-cli-token");
        assert_eq!(token.token_type(), "Bearer");
        assert!(token.expires_at().is_none());

        let calls = executor.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![
                "az",
                "account",
                "get-access-token",
                "--resource",
                "https://graph.microsoft.com",
                "--tenant",
                "home-tenant",
                "--query",
                "accessToken",
                "--output",
                "json"
            ]
        );
    }

    #[tokio::test]
    async fn test_expiry_from_jwt_claims() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"exp":4102444800}"#);
        let executor = FakeExecutor::stdout(&format!("\"h.{}.s\"", payload));
        let authorizer = AzureCliAuthorizer::with_executor(&config(), executor).unwrap();

        let token = authorizer.token().await.unwrap();
        assert_eq!(token.expires_at().unwrap().timestamp(), 4_102_444_800);
    }

    #[tokio::test]
    async fn test_auxiliary_tenant_flag() {
        let executor = FakeExecutor::stdout("aux-token");
        let authorizer = AzureCliAuthorizer::with_executor(&config(), executor.clone()).unwrap();

        authorizer.auxiliary_tokens().await.unwrap();

        let calls = executor.calls.lock().unwrap();
        let tenant_index = calls[0].iter().position(|a| a == "--tenant").unwrap();
        assert_eq!(calls[0][tenant_index + 1], "aux-tenant");
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let executor = FakeExecutor::failing(1, "ERROR: Please run 'az login' to setup account.\n");
        let authorizer = AzureCliAuthorizer::with_executor(&config(), executor).unwrap();

        let err = authorizer.token().await.unwrap_err();
        assert!(err.is_transport_error());
        assert!(err.to_string().contains("az login"));
    }

    #[tokio::test]
    async fn test_empty_output() {
        let executor = FakeExecutor::stdout("  \"\"  \n");
        let authorizer = AzureCliAuthorizer::with_executor(&config(), executor).unwrap();

        assert!(matches!(authorizer.token().await, Err(Error::EmptyToken(_))));
    }
}
