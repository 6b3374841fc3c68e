//! Enterprise redirect-based identity provider.
//!
//! Sign-in and sign-out both leave the application for the provider's pages;
//! the authorization response comes back on the dedicated callback screen
//! and is consumed exactly once per process by [`EnterpriseAdapter::complete_redirect`].
//! Recovery never touches the network: it only inspects the locally cached
//! account. Token resolution is a silent refresh-grant reacquisition scoped
//! to `openid profile email`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::claims;
use crate::config::EnterpriseConfig;
use crate::error::{AuthError, AuthResult};
use crate::navigation::Navigator;
use crate::providers::traits::RecoverySource;
use crate::session::{Provider, Session};
use crate::store::KeyValueStore;

/// Key for the adapter-owned credential state record.
pub(crate) const STATE_KEY: &str = "iot_portal_enterprise_account_v1";

const SIGN_IN_SCOPES: &str = "openid profile email";

/// Authorization response carried back on the callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectResponse {
    pub code: String,
    pub state: String,
}

impl RedirectResponse {
    /// Extract the response from a callback URL. Returns `None` when the URL
    /// carries no usable authorization response (including provider error
    /// returns), which downstream treats the same as "no pending redirect."
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut code = None;
        let mut state = None;
        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                "code" => code = Some(v.into_owned()),
                "state" => state = Some(v.into_owned()),
                "error" => {
                    debug!(error = %v, "authorization response carried an error");
                    return None;
                }
                _ => {}
            }
        }
        Some(Self {
            code: code?,
            state: state?,
        })
    }
}

/// Provider-owned credential state, opaque to the broker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account: Option<CachedAccount>,
    /// In-flight redirect transaction, written at sign-in and consumed on
    /// return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending: Option<PendingRedirect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAccount {
    home_account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingRedirect {
    state: String,
    pkce_verifier: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct EnterpriseAdapter {
    config: EnterpriseConfig,
    kv: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    http: reqwest::Client,
    state: RwLock<CredentialState>,
    redirect_consumed: AtomicBool,
}

impl EnterpriseAdapter {
    pub fn new(
        config: EnterpriseConfig,
        kv: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let state = load_state(kv.as_ref());
        Self {
            config,
            kv,
            navigator,
            http: reqwest::Client::new(),
            state: RwLock::new(state),
            redirect_consumed: AtomicBool::new(false),
        }
    }

    fn persist(&self, state: &CredentialState) {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to serialize enterprise credential state: {e}");
                return;
            }
        };
        if let Err(e) = self.kv.put(STATE_KEY, &raw) {
            warn!("failed to persist enterprise credential state: {e}");
        }
    }

    fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.config.authority)
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.config.authority)
    }

    fn logout_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/logout", self.config.authority)
    }

    /// Begin a full-page redirect to the provider. Control leaves the
    /// application; the response is consumed by [`Self::complete_redirect`]
    /// on the next page load.
    pub fn sign_in(&self) -> AuthResult<()> {
        let state = generate_state();
        let verifier = generate_pkce_verifier();
        let challenge = generate_pkce_challenge(&verifier);

        {
            let mut credential = self.state.write().expect("enterprise state lock");
            credential.pending = Some(PendingRedirect {
                state: state.clone(),
                pkce_verifier: verifier,
            });
            self.persist(&credential);
        }

        let url = format!(
            "{endpoint}?\
             client_id={client_id}\
             &redirect_uri={redirect_uri}\
             &response_type=code\
             &scope={scope}\
             &state={state}\
             &code_challenge={challenge}\
             &code_challenge_method=S256\
             &prompt=select_account",
            endpoint = self.authorize_endpoint(),
            client_id = urlencoding(&self.config.client_id),
            redirect_uri = urlencoding(&self.config.redirect_uri),
            scope = urlencoding(SIGN_IN_SCOPES),
            state = urlencoding(&state),
            challenge = urlencoding(&challenge),
        );
        let url = Url::parse(&url)
            .map_err(|e| AuthError::ProviderError(format!("invalid authorize URL: {e}")))?;

        self.navigator.external(url);
        Ok(())
    }

    /// Consume the authorization response, once per process. The first call
    /// wins; later calls are no-ops. Must run before any other enterprise
    /// operation on this page load.
    pub async fn complete_redirect(&self, response: Option<&RedirectResponse>) -> AuthResult<()> {
        if self.redirect_consumed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(response) = response else {
            return Ok(());
        };

        let pending = {
            let mut credential = self.state.write().expect("enterprise state lock");
            let pending = credential.pending.take();
            self.persist(&credential);
            pending
        };
        let pending = pending.ok_or(AuthError::StateMismatch)?;
        if pending.state != response.state {
            return Err(AuthError::StateMismatch);
        }

        let tokens = self
            .exchange_code(&response.code, &pending.pkce_verifier)
            .await?;
        let id_token = tokens.id_token.ok_or_else(|| {
            AuthError::ProviderError("authorization response carried no identity token".into())
        })?;
        let claims = claims::decode_unverified(&id_token)?;

        let home_account_id = match (&claims.oid, &claims.tid) {
            (Some(oid), Some(tid)) => format!("{oid}.{tid}"),
            _ => claims.sub.clone(),
        };

        let mut credential = self.state.write().expect("enterprise state lock");
        credential.account = Some(CachedAccount {
            home_account_id,
            username: claims.preferred_username.or(claims.email),
            name: claims.name,
            refresh_token: tokens.refresh_token,
        });
        self.persist(&credential);
        Ok(())
    }

    async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> AuthResult<TokenResponse> {
        let resp = self
            .http
            .post(self.token_endpoint())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", pkce_verifier),
                ("scope", SIGN_IN_SCOPES),
            ])
            .send()
            .await
            .map_err(|e| AuthError::ProviderError(format!("token exchange request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::ProviderError(format!(
                "token exchange failed: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| AuthError::ProviderError(format!("failed to parse token response: {e}")))
    }

    /// Recover a session from the cached account. Synchronous and
    /// non-blocking; never triggers a redirect or a network call.
    pub fn try_recover_session(&self) -> Option<Session> {
        let credential = self.state.read().expect("enterprise state lock");
        let account = credential.account.as_ref()?;
        Some(Session {
            provider: Provider::Enterprise,
            user_id: account.home_account_id.clone(),
            email: account.username.clone(),
            name: account.name.clone(),
            id_token: None,
            access_token: None,
        })
    }

    /// Silently reacquire a fresh identity token for the active account,
    /// scoped to `openid profile email`. No user interaction.
    pub async fn acquire_token_silent(&self) -> AuthResult<String> {
        let account = {
            let credential = self.state.read().expect("enterprise state lock");
            credential.account.clone()
        };
        let account = account.ok_or(AuthError::NoActiveAccount)?;
        let refresh_token = account
            .refresh_token
            .ok_or_else(|| AuthError::SilentAuthFailed("no refresh token cached".into()))?;

        let resp = self
            .http
            .post(self.token_endpoint())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("scope", SIGN_IN_SCOPES),
            ])
            .send()
            .await
            .map_err(|e| AuthError::SilentAuthFailed(format!("refresh request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::SilentAuthFailed(format!(
                "refresh rejected: {body}"
            )));
        }

        let tokens: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::SilentAuthFailed(format!("failed to parse refresh response: {e}")))?;

        // The provider may rotate the refresh token on every grant.
        if let Some(rotated) = &tokens.refresh_token {
            let mut credential = self.state.write().expect("enterprise state lock");
            if let Some(account) = credential.account.as_mut() {
                account.refresh_token = Some(rotated.clone());
            }
            self.persist(&credential);
        }

        tokens
            .id_token
            .ok_or_else(|| AuthError::SilentAuthFailed("refresh response missing identity token".into()))
    }

    /// Clear the cached account and leave for the provider's logout page.
    /// Like sign-in, control does not return normally.
    pub fn sign_out(&self) -> AuthResult<()> {
        let username = {
            let mut credential = self.state.write().expect("enterprise state lock");
            let username = credential.account.as_ref().and_then(|a| a.username.clone());
            credential.account = None;
            credential.pending = None;
            self.persist(&credential);
            username
        };

        let mut url = format!(
            "{endpoint}?post_logout_redirect_uri={redirect_uri}",
            endpoint = self.logout_endpoint(),
            redirect_uri = urlencoding(&self.config.redirect_uri),
        );
        if let Some(username) = username {
            url.push_str(&format!("&logout_hint={}", urlencoding(&username)));
        }
        let url = Url::parse(&url)
            .map_err(|e| AuthError::ProviderError(format!("invalid logout URL: {e}")))?;

        self.navigator.external(url);
        Ok(())
    }
}

#[async_trait]
impl RecoverySource for EnterpriseAdapter {
    fn provider(&self) -> Provider {
        Provider::Enterprise
    }

    async fn try_recover_session(&self) -> Option<Session> {
        EnterpriseAdapter::try_recover_session(self)
    }
}

fn load_state(kv: &dyn KeyValueStore) -> CredentialState {
    let raw = match kv.get(STATE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return CredentialState::default(),
        Err(e) => {
            warn!("failed to read enterprise credential state: {e}");
            return CredentialState::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(state) => state,
        Err(e) => {
            debug!("discarding unreadable enterprise credential state: {e}");
            CredentialState::default()
        }
    }
}

fn generate_state() -> String {
    random_urlsafe()
}

/// RFC 7636 code verifier: 32 random bytes, base64url.
fn generate_pkce_verifier() -> String {
    random_urlsafe()
}

/// S256 challenge for a verifier.
fn generate_pkce_challenge(verifier: &str) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn random_urlsafe() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use rand::Rng;

    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Simple percent-encoding for URL parameters.
fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
