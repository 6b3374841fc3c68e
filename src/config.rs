use std::path::PathBuf;

use crate::error::{AuthError, AuthResult};

/// Read a required environment variable, failing with the variable's name.
///
/// Each adapter section is validated eagerly at load time so a missing
/// setting disables that adapter at startup instead of surfacing on first
/// use. Other adapters stay usable.
fn must_env(name: &str) -> AuthResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AuthError::MissingConfiguration(name.to_string())),
    }
}

/// Settings shared with feature code, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the portal REST backend. Consumed by feature code via
    /// [`crate::api::ApiClient`]; declared once here.
    pub api_base_url: String,
    /// Directory holding the portal's persisted state file.
    pub state_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> AuthResult<Self> {
        Ok(Config {
            api_base_url: must_env("PORTAL_API_BASE_URL")?,
            state_dir: std::env::var("PORTAL_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
        })
    }
}

/// Enterprise redirect provider settings.
#[derive(Debug, Clone)]
pub struct EnterpriseConfig {
    pub client_id: String,
    /// Issuer base, e.g. `https://login.example-id.com/common`. The
    /// authorize/token/logout endpoints hang off this URL.
    pub authority: String,
    /// Must stay on the dedicated callback screen.
    pub redirect_uri: String,
}

impl EnterpriseConfig {
    pub fn from_env() -> AuthResult<Self> {
        Ok(EnterpriseConfig {
            client_id: must_env("PORTAL_ENTERPRISE_CLIENT_ID")?,
            authority: must_env("PORTAL_ENTERPRISE_AUTHORITY")?,
            redirect_uri: must_env("PORTAL_ENTERPRISE_REDIRECT_URI")?,
        })
    }
}

/// Consumer one-tap provider settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub client_id: String,
}

impl ConsumerConfig {
    pub fn from_env() -> AuthResult<Self> {
        Ok(ConsumerConfig {
            client_id: must_env("PORTAL_ONETAP_CLIENT_ID")?,
        })
    }
}

/// Local user-directory settings.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// User pool id, `{region}_{suffix}`.
    pub user_pool_id: String,
    pub client_id: String,
    /// Explicit service endpoint. When absent it is derived from the pool
    /// id's region prefix.
    pub endpoint: Option<String>,
}

impl DirectoryConfig {
    pub fn from_env() -> AuthResult<Self> {
        Ok(DirectoryConfig {
            user_pool_id: must_env("PORTAL_DIRECTORY_POOL_ID")?,
            client_id: must_env("PORTAL_DIRECTORY_CLIENT_ID")?,
            endpoint: std::env::var("PORTAL_DIRECTORY_ENDPOINT").ok(),
        })
    }

    /// Service endpoint for the directory's JSON protocol.
    pub fn endpoint(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.clone();
        }
        let region = self.user_pool_id.split('_').next().unwrap_or_default();
        format!("https://cognito-idp.{region}.amazonaws.com/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_derived_from_the_pool_region() {
        let cfg = DirectoryConfig {
            user_pool_id: "eu-west-1_AbCdEf123".into(),
            client_id: "client".into(),
            endpoint: None,
        };
        assert_eq!(cfg.endpoint(), "https://cognito-idp.eu-west-1.amazonaws.com/");
    }

    #[test]
    fn explicit_endpoint_wins() {
        let cfg = DirectoryConfig {
            user_pool_id: "eu-west-1_AbCdEf123".into(),
            client_id: "client".into(),
            endpoint: Some("http://127.0.0.1:9000".into()),
        };
        assert_eq!(cfg.endpoint(), "http://127.0.0.1:9000");
    }

    #[test]
    fn shared_config_reads_base_url_and_state_dir() {
        std::env::set_var("PORTAL_API_BASE_URL", "https://api.portal.example");
        std::env::set_var("PORTAL_STATE_DIR", "/var/lib/portal");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.api_base_url, "https://api.portal.example");
        assert_eq!(cfg.state_dir, PathBuf::from("/var/lib/portal"));
    }

    #[test]
    fn missing_setting_names_the_variable() {
        std::env::remove_var("PORTAL_ENTERPRISE_CLIENT_ID");
        let err = EnterpriseConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            AuthError::MissingConfiguration(name) if name == "PORTAL_ENTERPRISE_CLIENT_ID"
        ));
    }
}
