use std::time::Duration;

use crate::session::Provider;

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Unified error type for the portal auth core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    // ── Configuration ───────────────────────────────────────────────────
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    // ── Token resolution ────────────────────────────────────────────────
    #[error("No active enterprise account")]
    NoActiveAccount,

    #[error("Silent token reacquisition failed: {0}")]
    SilentAuthFailed(String),

    #[error("Missing {0} identity token")]
    MissingIdentityToken(Provider),

    // ── User-facing form errors (surfaced verbatim) ─────────────────────
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid confirmation code: {0}")]
    InvalidCode(String),

    #[error("Account is already confirmed")]
    AlreadyConfirmed,

    #[error("Account is not confirmed yet")]
    UserNotConfirmed,

    // ── Consumer prompt ─────────────────────────────────────────────────
    #[error("Sign-in prompt script not available after {0:?}")]
    ScriptNotLoaded(Duration),

    #[error("No credential returned from the sign-in prompt")]
    MissingCredential,

    // ── Enterprise redirect ─────────────────────────────────────────────
    #[error("Redirect has not completed yet")]
    RedirectNotCompleted,

    #[error("State mismatch on redirect return")]
    StateMismatch,

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for AuthError {
    fn from(e: std::io::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}
