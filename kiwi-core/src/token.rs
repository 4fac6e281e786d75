//! Random token generation
//!
//! Session tokens and transport session handles are 32 bytes from the OS RNG,
//! run through SHA-256 and hex encoded (64 chars).

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes drawn per token
const TOKEN_BYTES: usize = 32;

/// Generate a fresh unpredictable token.
///
/// Fails instead of falling back to a weaker source when the OS RNG is
/// unavailable.
pub fn generate_token() -> Result<String, rand::Error> {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut buf)?;
    Ok(hex::encode(Sha256::digest(buf)))
}
