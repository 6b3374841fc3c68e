//! Navigation seam between the auth core and the host shell.
//!
//! The enterprise provider signs in and out by leaving the application for
//! the provider's pages, and the redirect completion handler moves the user
//! off the callback screen. Both go through this trait so the core never
//! touches the host's routing directly.

use url::Url;

/// In-app destinations the auth core navigates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Application home, after a completed sign-in.
    Home,
    /// Sign-in screen, when no session could be established.
    SignIn,
}

pub trait Navigator: Send + Sync {
    /// Replace the current history entry with an in-app route, so
    /// back-navigation cannot return to the screen being left.
    fn replace(&self, route: Route);

    /// Leave the application for an external URL. Control does not return
    /// to the caller in the normal sense.
    fn external(&self, url: Url);
}
