//! Utilities for working with `tele`.

use ring::rand::SecureRandom;

/// Length of the suffix produced by [`unique_id`].
pub const UNIQUE_ID_SUFFIX_LENGTH: usize = 26;

/// Returns the lowercase hex sha256 digest of the given bytes.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, bytes.as_ref());
    data_encoding::HEXLOWER.encode(digest.as_ref())
}

/// Returns a time-ordered unique identifier of [`UNIQUE_ID_SUFFIX_LENGTH`]
/// characters: eighteen digits of microseconds since the unix epoch
/// followed by eight random hex digits.
pub fn unique_id() -> Result<String, ring::error::Unspecified> {
    let micros = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default();
    let mut random = [0u8; 4];
    ring::rand::SystemRandom::new().fill(&mut random)?;
    Ok(format!(
        "{micros:018}{}",
        data_encoding::HEXLOWER.encode(&random)
    ))
}

/// Returns whether `suffix` looks like the output of [`unique_id`].
pub fn is_unique_id(suffix: &str) -> bool {
    let bytes = suffix.as_bytes();
    bytes.len() == UNIQUE_ID_SUFFIX_LENGTH
        && bytes[..18].iter().all(u8::is_ascii_digit)
        && bytes[18..]
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unique_ids_are_distinct_and_recognizable() {
        let a = unique_id().unwrap();
        let b = unique_id().unwrap();
        assert_ne!(a, b);
        assert!(is_unique_id(&a), "{a}");
        assert!(!is_unique_id("my-key"));
        assert!(!is_unique_id("0000000000000000000000000Z"));
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            sha256_hex("")
        );
    }
}
