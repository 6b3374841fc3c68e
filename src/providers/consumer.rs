//! Consumer one-tap identity provider.
//!
//! The provider's client script loads asynchronously, so sign-in first waits
//! (bounded) for the prompt surface to become ready, then asks it for a
//! credential. The credential is a signed identity token; its payload is
//! decoded locally without verification to fill the session's display
//! fields. The token itself is the bearer credential; there is no refresh
//! and no silent recovery for this provider.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::claims;
use crate::config::ConsumerConfig;
use crate::error::{AuthError, AuthResult};
use crate::providers::traits::CredentialPrompt;
use crate::session::{Provider, Session};

/// How long to wait for the provider's client script by default.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(7);

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ConsumerAdapter {
    config: ConsumerConfig,
    prompt: Arc<dyn CredentialPrompt>,
}

impl ConsumerAdapter {
    pub fn new(config: ConsumerConfig, prompt: Arc<dyn CredentialPrompt>) -> Self {
        Self { config, prompt }
    }

    /// Open the one-tap prompt and wait for a single outcome.
    ///
    /// `script_timeout` bounds only the wait for the client script; a
    /// timed-out wait fails the attempt rather than hanging.
    pub async fn sign_in(&self, script_timeout: Duration) -> AuthResult<Session> {
        self.wait_for_surface(script_timeout).await?;

        let credential = self.prompt.request_credential(&self.config.client_id).await?;
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let claims = claims::decode_unverified(&credential)?;
        debug!(user = %claims.sub, "one-tap credential accepted");

        Ok(Session {
            provider: Provider::Consumer,
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
            id_token: Some(credential),
            access_token: None,
        })
    }

    async fn wait_for_surface(&self, timeout: Duration) -> AuthResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.prompt.is_ready() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AuthError::ScriptNotLoaded(timeout));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// No remote call: just stop the surface from auto-selecting an account.
    pub fn sign_out(&self) {
        self.prompt.dismiss();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::claims::tests::make_token;

    struct StubPrompt {
        ready: AtomicBool,
        credential: AuthResult<String>,
        dismissed: AtomicUsize,
    }

    impl StubPrompt {
        fn ready(credential: AuthResult<String>) -> Self {
            Self {
                ready: AtomicBool::new(true),
                credential,
                dismissed: AtomicUsize::new(0),
            }
        }

        fn never_ready() -> Self {
            Self {
                ready: AtomicBool::new(false),
                credential: Err(AuthError::MissingCredential),
                dismissed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CredentialPrompt for StubPrompt {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn request_credential(&self, _client_id: &str) -> AuthResult<String> {
            self.credential.clone()
        }

        fn dismiss(&self) {
            self.dismissed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn adapter(prompt: StubPrompt) -> (Arc<StubPrompt>, ConsumerAdapter) {
        let prompt = Arc::new(prompt);
        let adapter = ConsumerAdapter::new(
            ConsumerConfig {
                client_id: "onetap-client".into(),
            },
            prompt.clone(),
        );
        (prompt, adapter)
    }

    #[tokio::test]
    async fn sign_in_decodes_the_credential_payload() {
        let token = make_token(serde_json::json!({
            "sub": "110234",
            "email": "tap@example.com",
            "name": "Tap User",
            "exp": 4_102_444_800i64,
        }));
        let (_, adapter) = adapter(StubPrompt::ready(Ok(token.clone())));

        let session = adapter.sign_in(DEFAULT_SCRIPT_TIMEOUT).await.unwrap();
        assert_eq!(session.provider, Provider::Consumer);
        assert_eq!(session.user_id, "110234");
        assert_eq!(session.email.as_deref(), Some("tap@example.com"));
        assert_eq!(session.id_token.as_deref(), Some(token.as_str()));
        assert_eq!(session.user_key(), "consumer:110234");
    }

    #[tokio::test]
    async fn script_wait_is_time_boxed() {
        let (_, adapter) = adapter(StubPrompt::never_ready());

        let err = adapter.sign_in(Duration::from_millis(120)).await.unwrap_err();
        assert!(matches!(err, AuthError::ScriptNotLoaded(_)));
    }

    #[tokio::test]
    async fn empty_credential_is_rejected() {
        let (_, adapter) = adapter(StubPrompt::ready(Ok(String::new())));
        assert!(matches!(
            adapter.sign_in(DEFAULT_SCRIPT_TIMEOUT).await,
            Err(AuthError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn prompt_rejection_is_surfaced() {
        let (_, adapter) = adapter(StubPrompt::ready(Err(AuthError::MissingCredential)));
        assert!(matches!(
            adapter.sign_in(DEFAULT_SCRIPT_TIMEOUT).await,
            Err(AuthError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn sign_out_dismisses_auto_select() {
        let (prompt, adapter) = adapter(StubPrompt::ready(Ok("t".into())));
        adapter.sign_out();
        assert_eq!(prompt.dismissed.load(Ordering::SeqCst), 1);
    }
}
