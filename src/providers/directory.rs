//! Local username/password directory (hosted user pool).
//!
//! Speaks the pool's JSON protocol directly: `SignUp`, `ConfirmSignUp`,
//! `InitiateAuth`, `GetUser` and `GlobalSignOut`, posted as
//! `application/x-amz-json-1.1` with an `x-amz-target` header. Directory
//! errors come back as `__type`/`message` pairs and are mapped per
//! operation so form-level messages reach the user verbatim.
//!
//! Both an identity token and an access token are captured at sign-in and
//! kept in the adapter's own credential record; the identity token is never
//! silently refreshed.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::DirectoryConfig;
use crate::error::{AuthError, AuthResult};
use crate::providers::traits::RecoverySource;
use crate::session::{Provider, Session};
use crate::store::KeyValueStore;

/// Key for the adapter-owned credential state record.
pub(crate) const STATE_KEY: &str = "iot_portal_directory_tokens_v1";

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

/// Outcome of a sign-up request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// A confirmation code was sent; it must be submitted before the first
    /// sign-in.
    ConfirmationRequired,
    Done,
}

/// Provider-owned token set captured at sign-in, opaque to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    access_token: String,
}

enum CallError {
    Transport(String),
    Api { kind: String, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignUpResponse {
    user_confirmed: bool,
    #[allow(dead_code)]
    user_sub: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    #[serde(default)]
    authentication_result: Option<AuthenticationResult>,
    #[serde(default)]
    challenge_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserResponse {
    username: String,
    #[serde(default)]
    user_attributes: Vec<UserAttribute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserAttribute {
    name: String,
    value: String,
}

impl GetUserResponse {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.user_attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Stable subject id: the `sub` attribute, falling back to the username.
    fn subject_id(&self) -> &str {
        self.attribute("sub").unwrap_or(&self.username)
    }

    fn email(&self) -> &str {
        self.attribute("email").unwrap_or(&self.username)
    }
}

pub struct DirectoryAdapter {
    config: DirectoryConfig,
    kv: Arc<dyn KeyValueStore>,
    http: reqwest::Client,
    tokens: RwLock<Option<StoredTokens>>,
}

impl DirectoryAdapter {
    pub fn new(config: DirectoryConfig, kv: Arc<dyn KeyValueStore>) -> Self {
        let tokens = load_tokens(kv.as_ref());
        Self {
            config,
            kv,
            http: reqwest::Client::new(),
            tokens: RwLock::new(tokens),
        }
    }

    fn persist(&self, tokens: Option<&StoredTokens>) {
        let result = match tokens {
            Some(tokens) => match serde_json::to_string(tokens) {
                Ok(raw) => self.kv.put(STATE_KEY, &raw),
                Err(e) => {
                    warn!("failed to serialize directory credential state: {e}");
                    return;
                }
            },
            None => self.kv.remove(STATE_KEY),
        };
        if let Err(e) = result {
            warn!("failed to persist directory credential state: {e}");
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        target: &str,
        body: serde_json::Value,
    ) -> Result<T, CallError> {
        let resp = self
            .http
            .post(self.config.endpoint())
            .header(reqwest::header::CONTENT_TYPE, "application/x-amz-json-1.1")
            .header("x-amz-target", format!("{TARGET_PREFIX}.{target}"))
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| CallError::Transport(format!("directory request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CallError::Transport(format!("directory response unreadable: {e}")))?;

        if !status.is_success() {
            #[derive(Deserialize)]
            struct Failure {
                #[serde(rename = "__type", default)]
                kind: String,
                #[serde(default)]
                message: Option<String>,
            }
            let failure: Failure = serde_json::from_str(&text).unwrap_or(Failure {
                kind: String::new(),
                message: None,
            });
            // `__type` may be namespaced, e.g. `service#CodeMismatchException`
            let kind = failure
                .kind
                .rsplit('#')
                .next()
                .unwrap_or_default()
                .to_string();
            let message = failure.message.unwrap_or_else(|| format!("{target} failed ({status})"));
            return Err(CallError::Api { kind, message });
        }

        serde_json::from_str(&text)
            .map_err(|e| CallError::Transport(format!("failed to parse {target} response: {e}")))
    }

    fn sign_up_error(e: CallError) -> AuthError {
        match e {
            CallError::Transport(m) => AuthError::ProviderError(m),
            CallError::Api { kind, message } => match kind.as_str() {
                "UsernameExistsException"
                | "InvalidPasswordException"
                | "InvalidParameterException" => AuthError::InvalidCredentials(message),
                _ => AuthError::ProviderError(message),
            },
        }
    }

    fn confirm_error(e: CallError) -> AuthError {
        match e {
            CallError::Transport(m) => AuthError::ProviderError(m),
            CallError::Api { kind, message } => match kind.as_str() {
                "CodeMismatchException" | "ExpiredCodeException" => AuthError::InvalidCode(message),
                "NotAuthorizedException" => AuthError::AlreadyConfirmed,
                _ => AuthError::ProviderError(message),
            },
        }
    }

    fn sign_in_error(e: CallError) -> AuthError {
        match e {
            CallError::Transport(m) => AuthError::ProviderError(m),
            CallError::Api { kind, message } => match kind.as_str() {
                "NotAuthorizedException" | "UserNotFoundException" => {
                    AuthError::InvalidCredentials(message)
                }
                "UserNotConfirmedException" => AuthError::UserNotConfirmed,
                _ => AuthError::ProviderError(message),
            },
        }
    }

    /// Register a new account. The directory decides whether a confirmation
    /// step is required before the first sign-in.
    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let resp: SignUpResponse = self
            .call(
                "SignUp",
                json!({
                    "ClientId": self.config.client_id,
                    "Username": email,
                    "Password": password,
                    "UserAttributes": [{"Name": "email", "Value": email}],
                }),
            )
            .await
            .map_err(Self::sign_up_error)?;

        Ok(if resp.user_confirmed {
            SignUpOutcome::Done
        } else {
            SignUpOutcome::ConfirmationRequired
        })
    }

    /// Complete a pending confirmation with the emailed code.
    pub async fn confirm(&self, email: &str, code: &str) -> AuthResult<()> {
        let _: serde_json::Value = self
            .call(
                "ConfirmSignUp",
                json!({
                    "ClientId": self.config.client_id,
                    "Username": email,
                    "ConfirmationCode": code,
                }),
            )
            .await
            .map_err(Self::confirm_error)?;
        Ok(())
    }

    /// Establish a session, capturing both the identity token and the
    /// access token handed out at sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let resp: InitiateAuthResponse = self
            .call(
                "InitiateAuth",
                json!({
                    "AuthFlow": "USER_PASSWORD_AUTH",
                    "ClientId": self.config.client_id,
                    "AuthParameters": {"USERNAME": email, "PASSWORD": password},
                }),
            )
            .await
            .map_err(Self::sign_in_error)?;

        let result = match resp.authentication_result {
            Some(result) => result,
            None => {
                let detail = resp
                    .challenge_name
                    .map(|c| format!("unsupported sign-in challenge: {c}"))
                    .unwrap_or_else(|| "sign-in returned no credentials".into());
                return Err(AuthError::ProviderError(detail));
            }
        };
        let access_token = result.access_token.ok_or_else(|| {
            AuthError::ProviderError("sign-in response missing access token".into())
        })?;

        let user = self
            .get_user(&access_token)
            .await
            .map_err(Self::sign_in_error)?;

        let tokens = StoredTokens {
            id_token: result.id_token.clone(),
            access_token: access_token.clone(),
        };
        *self.tokens.write().expect("directory state lock") = Some(tokens.clone());
        self.persist(Some(&tokens));

        Ok(Session {
            provider: Provider::Local,
            user_id: user.subject_id().to_string(),
            email: Some(email.to_string()),
            name: None,
            id_token: result.id_token,
            access_token: Some(access_token),
        })
    }

    async fn get_user(&self, access_token: &str) -> Result<GetUserResponse, CallError> {
        self.call("GetUser", json!({ "AccessToken": access_token }))
            .await
    }

    /// Ask the directory for the currently-authenticated user. Absence of
    /// one is not an error.
    pub async fn try_recover_session(&self) -> Option<Session> {
        let tokens = self.tokens.read().expect("directory state lock").clone()?;

        match self.get_user(&tokens.access_token).await {
            Ok(user) => Some(Session {
                provider: Provider::Local,
                user_id: user.subject_id().to_string(),
                email: Some(user.email().to_string()),
                name: None,
                id_token: tokens.id_token.clone(),
                access_token: Some(tokens.access_token),
            }),
            Err(CallError::Transport(m)) => {
                debug!("directory session recovery failed: {m}");
                None
            }
            Err(CallError::Api { message, .. }) => {
                debug!("no recoverable directory session: {message}");
                None
            }
        }
    }

    /// Global sign-out with the captured access token. The local credential
    /// record is cleared whether or not the remote call succeeds.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let tokens = self.tokens.write().expect("directory state lock").take();
        self.persist(None);

        let Some(tokens) = tokens else {
            return Ok(());
        };
        let _: serde_json::Value = self
            .call(
                "GlobalSignOut",
                json!({ "AccessToken": tokens.access_token }),
            )
            .await
            .map_err(|e| match e {
                CallError::Transport(m) => AuthError::ProviderError(m),
                CallError::Api { message, .. } => AuthError::ProviderError(message),
            })?;
        Ok(())
    }
}

#[async_trait]
impl RecoverySource for DirectoryAdapter {
    fn provider(&self) -> Provider {
        Provider::Local
    }

    async fn try_recover_session(&self) -> Option<Session> {
        DirectoryAdapter::try_recover_session(self).await
    }
}

fn load_tokens(kv: &dyn KeyValueStore) -> Option<StoredTokens> {
    let raw = match kv.get(STATE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("failed to read directory credential state: {e}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(tokens) => Some(tokens),
        Err(e) => {
            debug!("discarding unreadable directory credential state: {e}");
            None
        }
    }
}
