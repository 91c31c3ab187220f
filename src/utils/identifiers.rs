// src/utils/identifiers.rs
//! Certificate number and verification code generation.
//!
//! Generated values are *candidates*: global uniqueness is enforced by the
//! store's constraints and the issuance path retries on conflict.
//!
//! # Formats
//! - Certificate number: `{PREFIX}-{YYYYMMDD}-{NNNNNNNN}`, e.g. `CERT-20261016-00421733`
//! - Verification code: `[{HINT}-]XXXXX-XXXXX` over [`CODE_ALPHABET`], e.g. `RUST101-7KQ4M-X9TZC`

use chrono::Utc;
use rand::Rng;

/// Unambiguous uppercase alphabet: no `0`/`O`, `1`/`I`/`L`, or `U`.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Shortest random part accepted for verification codes.
pub const MIN_CODE_LENGTH: usize = 8;

/// Longest subject hint embedded in a verification code.
pub const MAX_HINT_LENGTH: usize = 8;

const CODE_GROUP: usize = 5;

/// Source of candidate identifiers for new certificates.
pub trait IdentifierSource: Send + Sync {
    /// Next candidate certificate number.
    fn next_certificate_number(&self) -> String;

    /// Next candidate verification code, optionally prefixed by a subject hint.
    fn next_verification_code(&self, subject_hint: Option<&str>) -> String;
}

/// Random, time-prefixed identifier generator.
#[derive(Debug, Clone)]
pub struct RandomIdentifiers {
    prefix: String,
    code_length: usize,
}

impl RandomIdentifiers {
    /// Creates a generator.
    ///
    /// # Arguments
    /// * `prefix` - Certificate number prefix (sanitised to uppercase alphanumerics)
    /// * `code_length` - Random characters per verification code (at least [`MIN_CODE_LENGTH`])
    pub fn new(prefix: &str, code_length: usize) -> Self {
        let prefix: String = prefix
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self {
            prefix: if prefix.is_empty() { "CERT".into() } else { prefix },
            code_length: code_length.max(MIN_CODE_LENGTH),
        }
    }
}

impl Default for RandomIdentifiers {
    fn default() -> Self {
        Self::new("CERT", 10)
    }
}

impl IdentifierSource for RandomIdentifiers {
    fn next_certificate_number(&self) -> String {
        let serial: u32 = rand::thread_rng().gen_range(0..100_000_000);
        format!(
            "{}-{}-{:08}",
            self.prefix,
            Utc::now().format("%Y%m%d"),
            serial
        )
    }

    fn next_verification_code(&self, subject_hint: Option<&str>) -> String {
        let mut rng = rand::thread_rng();
        let random: Vec<u8> = (0..self.code_length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())])
            .collect();

        let groups: Vec<&str> = random
            .chunks(CODE_GROUP)
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect();
        let body = groups.join("-");

        match subject_hint.and_then(sanitize_hint) {
            Some(hint) => format!("{}-{}", hint, body),
            None => body,
        }
    }
}

/// Reduces a subject short-code to uppercase alphanumerics, at most
/// [`MAX_HINT_LENGTH`] characters. Returns `None` when nothing usable remains.
pub fn sanitize_hint(hint: &str) -> Option<String> {
    let cleaned: String = hint
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(MAX_HINT_LENGTH)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Canonical lookup form of a user-supplied verification code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
