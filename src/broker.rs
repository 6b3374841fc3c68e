//! The session broker: process-wide session state and provider dispatch.
//!
//! One explicitly constructed object owns the session cell. Startup
//! recovery runs the providers in a fixed priority order: enterprise
//! first, because its recovery is synchronous and its redirect completion
//! must consume any pending authorization response before a stale local
//! session could win. The broker leaves its loading state exactly once,
//! guarded so a slow recovery path can never clobber a state that a
//! faster one already settled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{ConsumerConfig, DirectoryConfig, EnterpriseConfig};
use crate::error::{AuthError, AuthResult};
use crate::navigation::Navigator;
use crate::providers::{
    ConsumerAdapter, CredentialPrompt, DirectoryAdapter, EnterpriseAdapter, RecoverySource,
    RedirectResponse, SignUpOutcome, DEFAULT_SCRIPT_TIMEOUT,
};
use crate::session::{Provider, Session};
use crate::store::{KeyValueStore, SessionStore};
use crate::token::BearerTokenResolver;

/// Read-only view of the broker's state, published through a watch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    /// Startup recovery has not settled yet.
    pub loading: bool,
    pub session: Option<Session>,
}

pub struct SessionBroker {
    store: SessionStore,
    enterprise: Result<Arc<EnterpriseAdapter>, AuthError>,
    consumer: Result<Arc<ConsumerAdapter>, AuthError>,
    directory: Result<Arc<DirectoryAdapter>, AuthError>,
    state: watch::Sender<AuthSnapshot>,
    settled: AtomicBool,
}

impl SessionBroker {
    /// Build a broker over already-constructed adapters. An adapter slot
    /// holds the configuration error that disabled it; operations needing
    /// that provider return the error while the others stay usable.
    pub fn new(
        store: SessionStore,
        enterprise: Result<Arc<EnterpriseAdapter>, AuthError>,
        consumer: Result<Arc<ConsumerAdapter>, AuthError>,
        directory: Result<Arc<DirectoryAdapter>, AuthError>,
    ) -> Self {
        for (name, slot) in [
            ("enterprise", enterprise.as_ref().err()),
            ("consumer", consumer.as_ref().err()),
            ("directory", directory.as_ref().err()),
        ] {
            if let Some(e) = slot {
                warn!("{name} provider disabled: {e}");
            }
        }

        // Optimistic load for instant paint; startup recovery settles the
        // real answer.
        let initial = AuthSnapshot {
            loading: true,
            session: store.load(),
        };
        let (state, _) = watch::channel(initial);

        Self {
            store,
            enterprise,
            consumer,
            directory,
            state,
            settled: AtomicBool::new(false),
        }
    }

    /// Wire every adapter from environment configuration. Each provider
    /// section is validated independently; a missing setting disables only
    /// that provider.
    pub fn from_env(
        kv: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        prompt: Arc<dyn CredentialPrompt>,
    ) -> Self {
        let store = SessionStore::new(kv.clone());
        let enterprise = EnterpriseConfig::from_env()
            .map(|config| Arc::new(EnterpriseAdapter::new(config, kv.clone(), navigator)));
        let consumer =
            ConsumerConfig::from_env().map(|config| Arc::new(ConsumerAdapter::new(config, prompt)));
        let directory =
            DirectoryConfig::from_env().map(|config| Arc::new(DirectoryAdapter::new(config, kv)));
        Self::new(store, enterprise, consumer, directory)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Observe state changes. The receiver always starts with the current
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    /// A resolver wired to this broker's enterprise adapter.
    pub fn token_resolver(&self) -> BearerTokenResolver {
        BearerTokenResolver::new(self.enterprise.clone())
    }

    pub(crate) fn enterprise(&self) -> AuthResult<Arc<EnterpriseAdapter>> {
        self.enterprise.as_ref().map(Arc::clone).map_err(Clone::clone)
    }

    fn consumer(&self) -> AuthResult<Arc<ConsumerAdapter>> {
        self.consumer.as_ref().map(Arc::clone).map_err(Clone::clone)
    }

    fn directory(&self) -> AuthResult<Arc<DirectoryAdapter>> {
        self.directory.as_ref().map(Arc::clone).map_err(Clone::clone)
    }

    // ── Startup recovery ────────────────────────────────────────────────

    /// Run startup recovery. `redirect` is the authorization response from
    /// the current page's URL, if the application booted on the callback
    /// screen.
    ///
    /// Recovery failures are swallowed into "no session": an
    /// unauthenticated visitor is an expected state, not an error.
    pub async fn start(&self, redirect: Option<RedirectResponse>) {
        // The enterprise adapter must consume any pending redirect before
        // any of its other operations run this page load.
        if let Ok(enterprise) = &self.enterprise {
            if let Err(e) = enterprise.complete_redirect(redirect.as_ref()).await {
                debug!("redirect completion failed during startup: {e}");
            }
        }

        for source in self.recovery_sources() {
            if let Some(session) = source.try_recover_session().await {
                info!(provider = %source.provider(), user = %session.user_key(), "session recovered at startup");
                self.settle(Some(session));
                return;
            }
        }
        self.settle(None);
    }

    /// Recovery sources in priority order: enterprise, then the local
    /// directory. The consumer provider cannot recover silently.
    fn recovery_sources(&self) -> Vec<Arc<dyn RecoverySource>> {
        let mut sources: Vec<Arc<dyn RecoverySource>> = Vec::new();
        if let Ok(enterprise) = &self.enterprise {
            sources.push(enterprise.clone());
        }
        if let Ok(directory) = &self.directory {
            sources.push(directory.clone());
        }
        sources
    }

    /// Leave the loading state, exactly once. Only the first caller wins;
    /// later attempts (a slower recovery path, a second `start`) change
    /// nothing.
    fn settle(&self, session: Option<Session>) -> bool {
        if self
            .settled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("state already settled; ignoring late recovery result");
            return false;
        }
        if let Err(e) = self.store.save(session.as_ref()) {
            warn!("failed to persist session: {e}");
        }
        self.state.send_replace(AuthSnapshot {
            loading: false,
            session,
        });
        true
    }

    /// Replace the held session wholesale and mirror it to the store.
    fn update_session(&self, session: Option<Session>) {
        if let Err(e) = self.store.save(session.as_ref()) {
            warn!("failed to persist session: {e}");
        }
        self.state.send_modify(|snapshot| snapshot.session = session);
    }

    /// Install a session recovered on the callback screen: settles the
    /// broker if startup has not, replaces the session if it already has.
    pub(crate) fn adopt_session(&self, session: Session) {
        if !self.settle(Some(session.clone())) {
            self.update_session(Some(session));
        }
    }

    // ── Sign-in / sign-up ───────────────────────────────────────────────

    /// Begin the enterprise redirect. Control leaves the page; no local
    /// state changes until the redirect completion handler runs on return.
    pub fn sign_in_enterprise(&self) -> AuthResult<()> {
        self.enterprise()?.sign_in()
    }

    /// One-tap consumer sign-in. On success the session and the store are
    /// updated before returning.
    pub async fn sign_in_consumer(&self) -> AuthResult<Session> {
        let session = self.consumer()?.sign_in(DEFAULT_SCRIPT_TIMEOUT).await?;
        self.update_session(Some(session.clone()));
        Ok(session)
    }

    /// Local directory sign-in. On success the session and the store are
    /// updated before returning.
    pub async fn sign_in_local(&self, email: &str, password: &str) -> AuthResult<Session> {
        let session = self.directory()?.sign_in(email, password).await?;
        self.update_session(Some(session.clone()));
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        self.directory()?.sign_up(email, password).await
    }

    pub async fn confirm(&self, email: &str, code: &str) -> AuthResult<()> {
        self.directory()?.confirm(email, code).await
    }

    // ── Sign-out ────────────────────────────────────────────────────────

    /// Sign out of the current session. A no-op when none is held (no store
    /// write). Remote sign-out failures are logged and ignored: once the
    /// user asked to leave, local state is cleared unconditionally.
    pub async fn sign_out(&self) {
        let Some(session) = self.session() else {
            return;
        };

        let result = match session.provider {
            Provider::Enterprise => self.enterprise().and_then(|a| a.sign_out()),
            Provider::Consumer => self.consumer().map(|a| a.sign_out()),
            Provider::Local => match self.directory() {
                Ok(a) => a.sign_out().await,
                Err(e) => Err(e),
            },
        };
        if let Err(e) = result {
            warn!("remote sign-out failed; clearing local session anyway: {e}");
        }

        self.update_session(None);
    }
}
