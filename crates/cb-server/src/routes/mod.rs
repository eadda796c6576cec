//! HTTP route handlers

pub mod mcp;
pub mod oauth;
pub mod session;
