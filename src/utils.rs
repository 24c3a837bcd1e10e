use std::collections::HashSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::types::Track;

/// Generates a PKCE code verifier.
///
/// 32 bytes from the thread-local CSPRNG, base64url without padding
/// (43 characters, inside the RFC 7636 range of 43-128).
#[must_use]
pub fn generate_code_verifier() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// `challenge = BASE64URL(SHA256(verifier))`, no padding.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Returns a fresh `(verifier, challenge)` pair.
#[must_use]
pub fn generate_challenge_pair() -> (String, String) {
    let verifier = generate_code_verifier();
    let challenge = generate_code_challenge(&verifier);
    (verifier, challenge)
}

/// Anti-forgery state, independent of the PKCE material (16 random bytes).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Hex SHA-256, used to key secrets without holding them in plain text.
pub fn digest_hex(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Lowercases, trims and collapses inner whitespace.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Removes duplicates, keeping the first occurrence. Comparison is on
/// [`normalize`]d values; the kept value is trimmed but otherwise untouched.
pub fn dedupe_normalized<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(normalize(v)))
        .collect()
}

/// Drops tracks whose `id` was already seen.
pub fn remove_duplicate_tracks(tracks: &mut Vec<Track>) {
    let mut seen_ids = HashSet::new();
    tracks.retain(|track| seen_ids.insert(track.id.clone()));
}

/// Maximum occurrences of one artist for a requested playlist size.
pub fn diversity_cap(target_count: u32) -> usize {
    match target_count {
        0..=20 => 2,
        21..=40 => 3,
        _ => 4,
    }
}

/// Whole-word containment on already-normalised text: `"maitre gims"`
/// contains `"gims"`, `"trap"` does not contain `"rap"`.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Strips brackets and dashes that trip up catalog text search.
pub fn sanitize_query(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' | ')' | '[' | ']' | '-' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
