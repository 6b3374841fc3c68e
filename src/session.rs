//! The canonical identity record shared by every provider.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which identity provider authenticated the user. Fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Redirect-based enterprise identity provider.
    Enterprise,
    /// One-tap consumer identity provider.
    Consumer,
    /// Local username/password directory.
    Local,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Enterprise => "enterprise",
            Provider::Consumer => "consumer",
            Provider::Local => "local",
        };
        f.write_str(s)
    }
}

/// In-memory record identifying the authenticated user, plus whatever bearer
/// material the provider handed out at sign-in.
///
/// Immutable except for wholesale replacement: the broker swaps the whole
/// record, it never patches individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub provider: Provider,
    /// Stable per-provider subject identifier.
    pub user_id: String,
    /// Display-only. Never used for authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display-only. Never used for authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Session {
    /// Globally unique user key: `provider:user_id`.
    pub fn user_key(&self) -> String {
        format!("{}:{}", self.provider, self.user_id)
    }
}
