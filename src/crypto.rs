//! Signature verification for signup messages
//!
//! A signup carries an ed25519 signature over the SHA3-256 digest of the
//! author's handle. Users routinely sign a slightly different string than
//! the canonical `@handle` (no `@`, autocorrected case, a trailing newline),
//! so every tolerated variant is tried.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha3::{Digest, Sha3_256};

/// Trailing characters commonly left behind when a handle is signed
const TRAILING_WHITESPACE: [&str; 5] = ["", " ", "\n", "\r\n", "\t"];

/// Result type for key decoding
pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid public key format: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid signature format: {0}")]
    InvalidSignature(String),
}

/// Decode a 32-byte hex-encoded ed25519 public key
pub fn parse_public_key(public_key_hex: &str) -> CryptoResult<VerifyingKey> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let key_array: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        CryptoError::InvalidPublicKey(format!("Ed25519 key must be 32 bytes, got {}", b.len()))
    })?;
    VerifyingKey::from_bytes(&key_array).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Decode a base64-encoded 64-byte ed25519 signature
pub fn parse_signature(signature_b64: &str) -> CryptoResult<Signature> {
    let bytes = BASE64
        .decode(signature_b64)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let sig_array: [u8; 64] = bytes.try_into().map_err(|b: Vec<u8>| {
        CryptoError::InvalidSignature(format!(
            "Ed25519 signature must be 64 bytes, got {}",
            b.len()
        ))
    })?;
    Ok(Signature::from_bytes(&sig_array))
}

/// SHA3-256 digest of the UTF-8 message; this is what users sign
pub fn message_digest(message: &str) -> [u8; 32] {
    Sha3_256::digest(message.as_bytes()).into()
}

/// All strings accepted as a signature payload for `handle`.
///
/// Case variants {as given, upper, lower} x {with `@`, without} x trailing
/// whitespace. Duplicates are dropped, order is stable.
pub fn candidates(handle: &str) -> Vec<String> {
    let bare = handle.strip_prefix('@').unwrap_or(handle);
    let cases = [bare.to_string(), bare.to_uppercase(), bare.to_lowercase()];

    let mut out: Vec<String> = Vec::with_capacity(cases.len() * 2 * TRAILING_WHITESPACE.len());
    for case in &cases {
        for prefix in ["@", ""] {
            for suffix in TRAILING_WHITESPACE {
                let candidate = format!("{prefix}{case}{suffix}");
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
    }
    out
}

/// Check whether `signature_b64` signs any accepted variant of `handle`.
///
/// Malformed keys or signatures simply fail verification.
pub fn verify(public_key_hex: &str, signature_b64: &str, handle: &str) -> bool {
    let key = match parse_public_key(public_key_hex) {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!("Rejecting public key: {}", e);
            return false;
        }
    };
    let signature = match parse_signature(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::debug!("Rejecting signature: {}", e);
            return false;
        }
    };

    candidates(handle)
        .iter()
        .any(|candidate| key.verify(&message_digest(candidate), &signature).is_ok())
}
