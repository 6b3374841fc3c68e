//! Unified authentication session broker for the IoT device portal.
//!
//! Federates three identity providers (the enterprise redirect provider,
//! the consumer one-tap provider and the local user directory) behind a
//! single [`Session`] abstraction, and resolves a fresh bearer credential
//! for every outbound API call regardless of which provider authenticated
//! the user.
//!
//! The host constructs a [`SessionBroker`] explicitly, injecting its
//! navigation and prompt surfaces, runs [`SessionBroker::start`] at boot,
//! and reads state through [`SessionBroker::subscribe`]. Feature code makes
//! API calls through [`api::ApiClient`], which resolves a bearer token
//! immediately before each request.

pub mod api;
pub mod broker;
pub mod callback;
pub mod claims;
pub mod config;
pub mod error;
pub mod navigation;
pub mod providers;
pub mod session;
pub mod store;
pub mod token;

pub use broker::{AuthSnapshot, SessionBroker};
pub use callback::PollOptions;
pub use config::Config;
pub use error::{AuthError, AuthResult};
pub use navigation::{Navigator, Route};
pub use providers::{CredentialPrompt, RedirectResponse, SignUpOutcome};
pub use session::{Provider, Session};
pub use token::BearerTokenResolver;
