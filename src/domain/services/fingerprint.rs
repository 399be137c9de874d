//! Stable per-account message identity used for archive deduplication.

use sha2::{Digest, Sha256};

/// Normalise a Message-ID header value: angle brackets and surrounding
/// whitespace are not part of the identity. Empty ids count as absent.
pub fn normalize_message_id(message_id: &str) -> Option<String> {
    let trimmed = message_id
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Fingerprint derived from the protocol message-id.
pub fn from_message_id(account_id: &str, folder: &str, message_id: &str) -> Option<String> {
    let message_id = normalize_message_id(message_id)?;
    Some(digest(account_id, folder, message_id.as_bytes(), b"mid"))
}

/// Fingerprint derived from the raw message bytes, for messages without a message-id.
pub fn from_content(account_id: &str, folder: &str, raw: &[u8]) -> String {
    digest(account_id, folder, raw, b"raw")
}

/// Message-id based fingerprint when one is available, content hash otherwise.
pub fn compute(account_id: &str, folder: &str, message_id: Option<&str>, raw: &[u8]) -> String {
    message_id
        .and_then(|id| from_message_id(account_id, folder, id))
        .unwrap_or_else(|| from_content(account_id, folder, raw))
}

fn digest(account_id: &str, folder: &str, payload: &[u8], tag: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update([0u8]);
    hasher.update(account_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(folder.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    hex::encode(hasher.finalize())
}
