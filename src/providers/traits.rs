use async_trait::async_trait;

use crate::error::AuthResult;
use crate::session::{Provider, Session};

/// A provider that can recover an already-established session at startup
/// without user interaction.
///
/// The broker runs sources in a fixed priority order and the first one to
/// report a live session wins. Failures are not errors here: an
/// unauthenticated visitor is an expected state, so sources answer
/// `Some`/`None` and keep their diagnostics to themselves.
#[async_trait]
pub trait RecoverySource: Send + Sync {
    fn provider(&self) -> Provider;

    async fn try_recover_session(&self) -> Option<Session>;
}

/// The host surface for the consumer provider's one-tap prompt.
///
/// The provider's client script loads asynchronously and delivers its
/// credential through a callback; implementations turn that callback into a
/// single awaitable outcome.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Whether the provider's client script has finished loading.
    fn is_ready(&self) -> bool;

    /// Open the credential prompt and wait for exactly one outcome: the
    /// signed identity token, or an error.
    async fn request_credential(&self, client_id: &str) -> AuthResult<String>;

    /// Disable automatic account selection on the surface.
    fn dismiss(&self);
}
