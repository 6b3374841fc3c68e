//! Bearer credential resolution.
//!
//! Every outbound API call resolves a fresh credential immediately before
//! the request; nothing here is cached by callers. Resolution failures mean
//! "not authenticated for this one call" and never sign the user out.

use std::sync::Arc;

use tracing::debug;

use crate::claims;
use crate::error::{AuthError, AuthResult};
use crate::providers::EnterpriseAdapter;
use crate::session::{Provider, Session};

/// Resolves a current bearer credential for a session, dispatching on the
/// provider tag.
///
/// The enterprise provider silently reacquires a fresh token on every call;
/// the consumer and local providers reuse the identity token captured at
/// sign-in.
#[derive(Clone)]
pub struct BearerTokenResolver {
    enterprise: Result<Arc<EnterpriseAdapter>, AuthError>,
}

impl BearerTokenResolver {
    pub fn new(enterprise: Result<Arc<EnterpriseAdapter>, AuthError>) -> Self {
        Self { enterprise }
    }

    /// Either returns a non-empty bearer string or fails with a named
    /// error; never an empty "success."
    pub async fn resolve(&self, session: &Session) -> AuthResult<String> {
        let token = match session.provider {
            Provider::Consumer => session
                .id_token
                .clone()
                .ok_or(AuthError::MissingIdentityToken(Provider::Consumer))?,
            Provider::Local => {
                let token = session
                    .id_token
                    .clone()
                    .ok_or(AuthError::MissingIdentityToken(Provider::Local))?;
                // Never silently refreshed: once expired (or unreadable),
                // the user must re-authenticate.
                match claims::decode_unverified(&token) {
                    Ok(claims) if claims.is_expired() => {
                        debug!("local identity token expired");
                        return Err(AuthError::MissingIdentityToken(Provider::Local));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("local identity token unreadable: {e}");
                        return Err(AuthError::MissingIdentityToken(Provider::Local));
                    }
                }
                token
            }
            Provider::Enterprise => {
                let adapter = self.enterprise.as_ref().map_err(Clone::clone)?;
                adapter.acquire_token_silent().await?
            }
        };

        if token.is_empty() {
            return Err(AuthError::MissingIdentityToken(session.provider));
        }
        Ok(token)
    }
}
