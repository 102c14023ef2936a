//! National cloud endpoints.

use std::fmt;

use crate::{Error, Result};

/// Default instance metadata endpoint for managed identities.
pub const DEFAULT_MANAGED_IDENTITY_ENDPOINT: &str =
    "http://169.254.169.254/metadata/identity/oauth2/token";

/// Endpoints of one national cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Short name, e.g. `global`.
    pub name: String,
    /// Authority that issues tokens, without trailing slash.
    pub login_endpoint: String,
    /// Base URL of the API the tokens are issued for.
    pub resource_endpoint: String,
    /// Instance metadata token endpoint.
    pub managed_identity_endpoint: String,
}

impl Environment {
    pub fn global() -> Self {
        Self::new(
            "global",
            "https://login.microsoftonline.com",
            "https://graph.microsoft.com",
        )
    }

    pub fn china() -> Self {
        Self::new(
            "china",
            "https://login.chinacloudapi.cn",
            "https://microsoftgraph.chinacloudapi.cn",
        )
    }

    pub fn us_gov_l4() -> Self {
        Self::new(
            "usgovernmentl4",
            "https://login.microsoftonline.us",
            "https://graph.microsoft.us",
        )
    }

    pub fn us_gov_l5() -> Self {
        Self::new(
            "usgovernmentl5",
            "https://login.microsoftonline.us",
            "https://dod-graph.microsoft.us",
        )
    }

    /// Custom endpoints, e.g. a mock server in tests.
    pub fn new(
        name: impl Into<String>,
        login_endpoint: impl Into<String>,
        resource_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            login_endpoint: login_endpoint.into().trim_end_matches('/').to_string(),
            resource_endpoint: resource_endpoint.into().trim_end_matches('/').to_string(),
            managed_identity_endpoint: DEFAULT_MANAGED_IDENTITY_ENDPOINT.to_string(),
        }
    }

    pub fn with_managed_identity_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.managed_identity_endpoint = endpoint.into();
        self
    }

    /// Look up a named national cloud.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "global" | "public" => Ok(Self::global()),
            "china" => Ok(Self::china()),
            "usgovernment" | "usgovernmentl4" => Ok(Self::us_gov_l4()),
            "dod" | "usgovernmentl5" => Ok(Self::us_gov_l5()),
            other => Err(Error::config(format!("unknown environment '{}'", other))),
        }
    }

    /// OAuth2 token endpoint of a tenant.
    pub fn token_url(&self, tenant_id: &str, version: super::TokenVersion) -> String {
        match version {
            super::TokenVersion::V1 => {
                format!("{}/{}/oauth2/token", self.login_endpoint, tenant_id)
            }
            super::TokenVersion::V2 => {
                format!("{}/{}/oauth2/v2.0/token", self.login_endpoint, tenant_id)
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
