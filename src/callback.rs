//! Redirect completion handler for the dedicated callback screen.
//!
//! After the enterprise provider redirects back, the authorization response
//! must be consumed and the user moved off the callback screen. Recovery is
//! not guaranteed to be observable on the very first check (startup may
//! still be finishing the same redirect), so a short bounded poll absorbs
//! the propagation delay before giving up. Both outcomes navigate exactly
//! once, replacing history so back-navigation cannot land here again.

use std::time::Duration;

use tracing::{debug, info};

use crate::broker::SessionBroker;
use crate::navigation::{Navigator, Route};
use crate::providers::RedirectResponse;

/// Bounded retry for the recovery race. Never unbounded: an unrecoverable
/// state must terminate in bounded time.
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(150),
            attempts: 2,
        }
    }
}

/// Finish an in-flight enterprise sign-in and leave the callback screen.
pub async fn complete_sign_in(
    broker: &SessionBroker,
    navigator: &dyn Navigator,
    redirect: Option<RedirectResponse>,
    opts: PollOptions,
) {
    let Ok(enterprise) = broker.enterprise() else {
        navigator.replace(Route::SignIn);
        return;
    };

    // One-time per page load; a no-op if startup already consumed it.
    if let Err(e) = enterprise.complete_redirect(redirect.as_ref()).await {
        debug!("redirect completion failed: {e}");
    }

    if let Some(session) = enterprise.try_recover_session() {
        info!(user = %session.user_key(), "sign-in completed after redirect");
        broker.adopt_session(session);
        navigator.replace(Route::Home);
        return;
    }

    // Startup may still be finishing the exchange; give it a moment.
    let mut tries = opts.attempts;
    while tries > 0 {
        tokio::time::sleep(opts.interval).await;
        if let Some(session) = enterprise.try_recover_session() {
            info!(user = %session.user_key(), "sign-in completed after redirect");
            broker.adopt_session(session);
            navigator.replace(Route::Home);
            return;
        }
        tries -= 1;
    }

    debug!("no session after redirect completion; returning to sign-in");
    navigator.replace(Route::SignIn);
}
