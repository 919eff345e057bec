//! Reality key material.
//!
//! Keys are X25519 static secrets, base64url without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid private key encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("private key must be 32 bytes (got {0})")]
    Length(usize),
}

/// Generate a fresh private key.
pub fn generate_private_key() -> String {
    let secret = StaticSecret::random_from_rng(OsRng);
    URL_SAFE_NO_PAD.encode(secret.to_bytes())
}

/// Public key matching `private_key`.
pub fn derive_public_key(private_key: &str) -> Result<String, KeyError> {
    let raw = URL_SAFE_NO_PAD.decode(private_key)?;
    let bytes: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::Length(raw.len()))?;
    let public = PublicKey::from(&StaticSecret::from(bytes));
    Ok(URL_SAFE_NO_PAD.encode(public.as_bytes()))
}

/// Random 8 hex character short ID.
pub fn random_short_id() -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
