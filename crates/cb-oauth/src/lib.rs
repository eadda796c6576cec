//! Authorization-code broker
//!
//! A deliberately minimal OAuth2 authorization-code grant where this gateway
//! is the authorization server, fronting the Craftboard identity service.
//! All records are ephemeral, in-memory, and single-use.

mod broker;
pub mod pages;

pub use broker::{AuthCodeBroker, AuthorizeAction, SubmitOutcome, DIRECT_LOGIN_STATE};
