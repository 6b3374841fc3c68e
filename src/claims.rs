//! Local inspection of identity-token payloads.
//!
//! Tokens are decoded without signature verification: the portal never trusts
//! them for authorization, it only reads display fields and the subject id.
//! Signature verification is the backend's responsibility.

use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::{AuthError, AuthResult};

/// Payload claims of an OIDC identity token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Enterprise tokens carry the sign-in name here rather than in `email`.
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Enterprise object id, paired with `tid` to form the home account id.
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub tid: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl IdTokenClaims {
    /// Whether the token's `exp` claim has passed. Tokens without `exp`
    /// are treated as unexpired.
    pub fn is_expired(&self) -> bool {
        match self.exp {
            Some(exp) => exp <= Utc::now().timestamp(),
            None => false,
        }
    }
}

/// Decode a token's payload without verifying its signature.
pub fn decode_unverified(token: &str) -> AuthResult<IdTokenClaims> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.set_required_spec_claims::<&str>(&[]);
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data = decode::<IdTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    Ok(data.claims)
}
