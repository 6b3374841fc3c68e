//! Outbound portal API access.
//!
//! Feature code never handles bearer material itself: every request goes
//! through [`ApiClient`], which resolves a fresh credential immediately
//! before the call and attaches it as an `Authorization: Bearer` header.

pub mod client;

pub use client::ApiClient;
