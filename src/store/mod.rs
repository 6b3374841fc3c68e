//! Persisted state — the keyed record store and the canonical session record.
//!
//! One small key-value facility backs everything that must survive a reload:
//! the session record itself plus each adapter's own credential state.
//! Records are whole-value JSON, written last-writer-wins; nothing ever
//! patches a field in place.

pub mod kv;
pub mod session;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use session::{SessionStore, SESSION_KEY};
