//! Signup message parsing
//!
//! Pulls the hex public key and the base64 signature out of free-form
//! message text. Tokens may appear in any order and be surrounded by
//! arbitrary text, punctuation or emoji.

use std::sync::LazyLock;

use regex::Regex;

/// 64 hex chars (32 bytes), not touching any other word character
static PUBKEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{64}\b").expect("invalid pubkey pattern"));

/// At least 60 base64 chars closed by `==`, not part of a longer base64 run
static SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9+/=])([A-Za-z0-9+/]{60,}==)(?:$|[^A-Za-z0-9+/=])")
        .expect("invalid signature pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("missing handle")]
    MissingHandle,
    #[error("missing pubkey")]
    MissingPubkey,
    #[error("missing signature")]
    MissingSignature,
}

/// Candidate key material found in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub public_key: String,
    pub signature: String,
}

/// Check that `text` mentions `handle` as a whole token (case-insensitive)
pub fn mentions_handle(text: &str, handle: &str) -> bool {
    if handle.is_empty() {
        return false;
    }
    let pattern = format!(r"(?i)(?:^|[^\w@]){}(?:$|\W)", regex::escape(handle));
    Regex::new(&pattern)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Extract the public key and signature from a signup message.
///
/// When several key- or signature-shaped tokens are present the leftmost
/// one wins.
pub fn parse(text: &str, expected_handle: &str) -> Result<ParsedMessage, FormatError> {
    if !mentions_handle(text, expected_handle) {
        return Err(FormatError::MissingHandle);
    }

    let public_key = PUBKEY_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .ok_or(FormatError::MissingPubkey)?;

    let signature = SIGNATURE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(FormatError::MissingSignature)?;

    Ok(ParsedMessage {
        public_key,
        signature,
    })
}
