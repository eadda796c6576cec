//! Upstream Craftboard API client and credential verification
//!
//! Everything that talks to the Craftboard SaaS lives here: the
//! [`UpstreamHandle`] trait the dispatcher and session registry depend on,
//! the reqwest-backed [`CraftboardClient`] implementation, and the stateless
//! [`CredentialVerifier`] fronting the identity service.

mod client;
mod handle;
mod verifier;

pub use client::{CraftboardClient, CraftboardHandleFactory};
pub use handle::{HandleFactory, UpstreamHandle};
pub use verifier::{CredentialVerifier, IdentityVerifier};
