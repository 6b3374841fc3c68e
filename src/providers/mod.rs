//! Identity provider adapters.
//!
//! One adapter per provider, each encapsulating that provider's
//! sign-in/sign-out/recovery protocol behind the capability traits in
//! [`traits`]. The broker talks to adapters only through their declared
//! operations; whatever account or token state a provider keeps for itself
//! stays opaque.

pub mod consumer;
pub mod directory;
pub mod enterprise;
pub mod traits;

pub use consumer::{ConsumerAdapter, DEFAULT_SCRIPT_TIMEOUT};
pub use directory::{DirectoryAdapter, SignUpOutcome};
pub use enterprise::{EnterpriseAdapter, RedirectResponse};
pub use traits::{CredentialPrompt, RecoverySource};
