// kegsmith-net/src/validation.rs
use kegsmith_common::error::{KegError, Result};
use sha2::{Digest, Sha256};
use url::Url;

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Verifies the SHA256 checksum of downloaded bytes.
///
/// `subject` names the formula or resource the bytes belong to, so a mismatch
/// can be reported against it.
pub fn verify_checksum(subject: &str, url: &str, bytes: &[u8], expected: &str) -> Result<()> {
    let expected = expected.trim();
    if expected.is_empty() {
        // Formulas are validated on load; this only guards direct callers.
        return Err(KegError::Config(format!(
            "No checksum provided for '{subject}' ({url}); refusing to continue"
        )));
    }
    let actual = sha256_hex(bytes);
    tracing::debug!(
        "Calculated SHA256 for '{}': {} ({} bytes)",
        subject,
        actual,
        bytes.len()
    );
    tracing::debug!("Expected SHA256:   {}", expected);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(KegError::ChecksumMismatch {
            subject: subject.to_string(),
            url: url.to_string(),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

/// Validates a URL, ensuring it uses the https or file scheme.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).map_err(|e| KegError::FetchFailure {
        url: url_str.to_string(),
        reason: format!("invalid URL: {e}"),
    })?;
    match url.scheme() {
        "https" | "file" => Ok(url),
        scheme => Err(KegError::FetchFailure {
            url: url_str.to_string(),
            reason: format!("unsupported URL scheme '{scheme}' (must be https or file)"),
        }),
    }
}
