use reqwest::Method;

use crate::error::{AuthError, AuthResult};
use crate::session::Session;
use crate::token::BearerTokenResolver;

/// HTTP client for the portal backend.
///
/// Tokens are resolved per request and never cached across requests; a
/// resolution failure fails that one call only.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    resolver: BearerTokenResolver,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, resolver: BearerTokenResolver) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            resolver,
        }
    }

    /// Build a request for `path` with a freshly resolved bearer credential
    /// attached.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        session: &Session,
    ) -> AuthResult<reqwest::RequestBuilder> {
        let token = self.resolver.resolve(session).await?;
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Tell the backend who just signed in; identity comes from the token,
    /// the body stays empty.
    pub async fn sync_me(&self, session: &Session) -> AuthResult<()> {
        let resp = self
            .request(Method::POST, "me/sync", session)
            .await?
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AuthError::ProviderError(format!("me/sync request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::ProviderError(format!(
                "me/sync failed: {status} {body}"
            )));
        }
        Ok(())
    }
}
