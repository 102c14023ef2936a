//! Authorizer configuration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretBox, SecretString};

use super::env::{env_bool, env_list, env_opt};
use super::Environment;
use crate::{Error, Result};

/// Default lifetime of a signed client assertion.
pub const DEFAULT_ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

/// Default timeout for each HTTP request or subprocess.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default token type attached to custom command tokens.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Default Azure CLI executable.
pub const DEFAULT_AZURE_CLI: &str = "az";

/// Prefix of every variable read by [`AuthConfig::from_env`].
pub const ENV_PREFIX: &str = "GRAPH_AUTH_";

/// Token endpoint flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenVersion {
    /// `oauth2/token`, addressed with a `resource` parameter.
    V1,
    /// `oauth2/v2.0/token`, addressed with a `scope` parameter.
    #[default]
    V2,
}

impl FromStr for TokenVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" | "1.0" => Ok(TokenVersion::V1),
            "2" | "v2" | "2.0" => Ok(TokenVersion::V2),
            other => Err(Error::config(format!("unknown token version '{}'", other))),
        }
    }
}

/// Immutable configuration for every authorizer.
///
/// Several mechanisms may be enabled at once; [`select`](super::select)
/// resolves the conflict in a fixed preference order. Secrets are held in
/// [`secrecy`] containers so the derived `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    pub tenant_id: String,
    pub auxiliary_tenant_ids: Vec<String>,
    pub client_id: String,
    pub token_version: TokenVersion,
    /// Overrides the default scopes derived from the environment.
    pub scopes: Vec<String>,

    pub enable_client_certificate_auth: bool,
    pub enable_client_secret_auth: bool,
    pub enable_azure_cli_auth: bool,
    pub enable_managed_identity_auth: bool,
    pub enable_custom_command_auth: bool,

    pub client_secret: Option<SecretString>,
    /// PKCS#12, PEM or DER encoded certificate with its private key.
    pub client_certificate_data: Option<Arc<SecretBox<Vec<u8>>>>,
    pub client_certificate_path: Option<String>,
    pub client_certificate_password: Option<SecretString>,
    /// Overrides the `aud` claim of client assertions.
    pub assertion_audience: Option<String>,
    pub assertion_lifetime: Option<Duration>,

    /// User-assigned identity; system-assigned when unset.
    pub managed_identity_client_id: Option<String>,

    /// Argument template, e.g. `["get-token", "{{.Endpoint}}", "{{.TenantID}}"]`.
    pub custom_command: Vec<String>,
    pub custom_token_type: Option<String>,

    pub azure_cli_path: String,
    pub request_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            environment: Environment::global(),
            tenant_id: String::new(),
            auxiliary_tenant_ids: Vec::new(),
            client_id: String::new(),
            token_version: TokenVersion::default(),
            scopes: Vec::new(),
            enable_client_certificate_auth: false,
            enable_client_secret_auth: false,
            enable_azure_cli_auth: false,
            enable_managed_identity_auth: false,
            enable_custom_command_auth: false,
            client_secret: None,
            client_certificate_data: None,
            client_certificate_path: None,
            client_certificate_password: None,
            assertion_audience: None,
            assertion_lifetime: Some(DEFAULT_ASSERTION_LIFETIME),
            managed_identity_client_id: None,
            custom_command: Vec::new(),
            custom_token_type: None,
            azure_cli_path: DEFAULT_AZURE_CLI.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AuthConfig {
    /// Create a builder starting from defaults.
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Read the `GRAPH_AUTH_*` variables once into a configuration.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| env_opt(&format!("{}{}", ENV_PREFIX, name));
        let flag = |name: &str| env_bool(&format!("{}{}", ENV_PREFIX, name));

        let mut config = Self::default();

        if let Some(name) = var("ENVIRONMENT") {
            config.environment = Environment::parse(&name)?;
        }
        if let Some(endpoint) = var("MANAGED_IDENTITY_ENDPOINT") {
            config.environment.managed_identity_endpoint = endpoint;
        }
        if let Some(version) = var("TOKEN_VERSION") {
            config.token_version = version.parse()?;
        }

        config.tenant_id = var("TENANT_ID").unwrap_or_default();
        config.client_id = var("CLIENT_ID").unwrap_or_default();
        config.auxiliary_tenant_ids = env_list(&format!("{}AUXILIARY_TENANT_IDS", ENV_PREFIX));

        config.enable_client_certificate_auth = flag("USE_CLIENT_CERTIFICATE");
        config.enable_client_secret_auth = flag("USE_CLIENT_SECRET");
        config.enable_azure_cli_auth = flag("USE_AZURE_CLI");
        config.enable_managed_identity_auth = flag("USE_MANAGED_IDENTITY");
        config.enable_custom_command_auth = flag("USE_CUSTOM_COMMAND");

        config.client_secret = var("CLIENT_SECRET").map(SecretString::from);
        config.client_certificate_path = var("CLIENT_CERTIFICATE_PATH");
        config.client_certificate_password =
            var("CLIENT_CERTIFICATE_PASSWORD").map(SecretString::from);
        config.managed_identity_client_id = var("MANAGED_IDENTITY_CLIENT_ID");

        config.custom_command = var("CUSTOM_COMMAND")
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        config.custom_token_type = var("CUSTOM_TOKEN_TYPE");

        if let Some(path) = var("AZURE_CLI_PATH") {
            config.azure_cli_path = path;
        }

        tracing::debug!(
            environment = %config.environment,
            tenant_id = %config.tenant_id,
            "Loaded authorizer configuration from environment"
        );

        Ok(config)
    }

    /// Scopes requested from v2 endpoints.
    pub fn scopes(&self) -> Vec<String> {
        if self.scopes.is_empty() {
            vec![format!("{}/.default", self.environment.resource_endpoint)]
        } else {
            self.scopes.clone()
        }
    }

    /// Token type attached to custom command tokens.
    pub fn custom_token_type(&self) -> &str {
        self.custom_token_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TOKEN_TYPE)
    }

    pub(crate) fn has_certificate(&self) -> bool {
        self.client_certificate_data
            .as_ref()
            .is_some_and(|data| !data.expose_secret().is_empty())
            || self
                .client_certificate_path
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty())
    }
}

/// Builder for [`AuthConfig`].
#[derive(Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.config.tenant_id = tenant_id.into();
        self
    }

    pub fn auxiliary_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.config.auxiliary_tenant_ids.push(tenant_id.into());
        self
    }

    pub fn auxiliary_tenant_ids(mut self, tenant_ids: Vec<String>) -> Self {
        self.config.auxiliary_tenant_ids = tenant_ids;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    pub fn token_version(mut self, version: TokenVersion) -> Self {
        self.config.token_version = version;
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.scopes.push(scope.into());
        self
    }

    pub fn enable_client_certificate_auth(mut self, enabled: bool) -> Self {
        self.config.enable_client_certificate_auth = enabled;
        self
    }

    pub fn enable_client_secret_auth(mut self, enabled: bool) -> Self {
        self.config.enable_client_secret_auth = enabled;
        self
    }

    pub fn enable_azure_cli_auth(mut self, enabled: bool) -> Self {
        self.config.enable_azure_cli_auth = enabled;
        self
    }

    pub fn enable_managed_identity_auth(mut self, enabled: bool) -> Self {
        self.config.enable_managed_identity_auth = enabled;
        self
    }

    pub fn enable_custom_command_auth(mut self, enabled: bool) -> Self {
        self.config.enable_custom_command_auth = enabled;
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.client_secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn client_certificate_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.config.client_certificate_data =
            Some(Arc::new(SecretBox::new(Box::new(data.into()))));
        self
    }

    pub fn client_certificate_path(mut self, path: impl Into<String>) -> Self {
        self.config.client_certificate_path = Some(path.into());
        self
    }

    pub fn client_certificate_password(mut self, password: impl Into<String>) -> Self {
        self.config.client_certificate_password = Some(SecretString::from(password.into()));
        self
    }

    pub fn assertion_audience(mut self, audience: impl Into<String>) -> Self {
        self.config.assertion_audience = Some(audience.into());
        self
    }

    /// `None` omits the `exp` claim.
    pub fn assertion_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.config.assertion_lifetime = lifetime;
        self
    }

    pub fn managed_identity_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.managed_identity_client_id = Some(client_id.into());
        self
    }

    pub fn custom_command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.custom_command = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn custom_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.config.custom_token_type = Some(token_type.into());
        self
    }

    pub fn azure_cli_path(mut self, path: impl Into<String>) -> Self {
        self.config.azure_cli_path = path.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> AuthConfig {
        self.config
    }
}
