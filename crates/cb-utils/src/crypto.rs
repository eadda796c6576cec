//! Cryptographic utilities
//!
//! Secure random identifier generation for session ids, authorization
//! codes, and callback-session keys.

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};

/// Generate an opaque identifier: `{prefix}-{base64url(32 bytes)}`
///
/// 32 random bytes gives 256 bits of entropy, far beyond the point where
/// collisions or guessing are a concern.
pub fn generate_opaque_id(prefix: &str) -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("Failed to generate random bytes"))?;

    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    Ok(format!("{}-{}", prefix, encoded))
}
