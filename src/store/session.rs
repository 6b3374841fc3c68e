//! The canonical persisted session record.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AuthResult;
use crate::session::Session;
use crate::store::KeyValueStore;

/// Fixed key under which the one session record lives.
pub const SESSION_KEY: &str = "iot_portal_session_v1";

/// Persists at most one [`Session`] across reloads. Pure read/write.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the persisted session, if any. A record that fails to parse is
    /// treated as absent and its key is deleted; an unauthenticated visitor
    /// is an expected state, never an error.
    pub fn load(&self) -> Option<Session> {
        let raw = match self.kv.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("failed to read persisted session: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!("discarding unreadable session record: {e}");
                if let Err(e) = self.kv.remove(SESSION_KEY) {
                    warn!("failed to delete unreadable session record: {e}");
                }
                None
            }
        }
    }

    /// Replace the persisted record wholesale. `None` deletes the key
    /// rather than storing an empty value.
    pub fn save(&self, session: Option<&Session>) -> AuthResult<()> {
        match session {
            Some(session) => {
                let raw = serde_json::to_string(session)?;
                self.kv.put(SESSION_KEY, &raw)
            }
            None => self.kv.remove(SESSION_KEY),
        }
    }
}
