use crate::error::{KegError, Result};

const SHA256_HEX_LEN: usize = 64;

/// Checks that `value` is a usable SHA-256 digest.
///
/// Empty values and placeholders such as `PLACEHOLDER` are configuration
/// errors: a formula without real checksums cannot be installed.
pub fn validate_sha256(owner: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(KegError::Config(format!(
            "{owner}: missing sha256 checksum"
        )));
    }
    if trimmed.len() != SHA256_HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(KegError::Config(format!(
            "{owner}: sha256 '{trimmed}' is not a 64-digit hex digest (placeholder checksums are not accepted)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hex_digests_in_either_case() {
        let lower = "a".repeat(64);
        let upper = "ABCDEF0123456789".repeat(4);
        assert!(validate_sha256("x", &lower).is_ok());
        assert!(validate_sha256("x", &upper).is_ok());
    }

    #[test]
    fn rejects_placeholders() {
        for bad in ["", "PLACEHOLDER", "PLACEHOLDER_SHA256", &"g".repeat(64)] {
            let err = validate_sha256("resource 'google-auth'", bad).unwrap_err();
            match err {
                KegError::Config(msg) => assert!(msg.contains("google-auth"), "{msg}"),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
