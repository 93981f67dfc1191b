use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Case-insensitive checksum comparison in constant time over the digest
/// text. Only the length check short-circuits.
pub fn checksums_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x.to_ascii_lowercase() ^ y.to_ascii_lowercase()))
        == 0
}

pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    checksums_match(&sha256_hex(data), expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        // sha256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"").len(), 64);
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(sha256_hex(b"payload"), sha256_hex(b"payload"));
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let digest = sha256_hex(b"abc");
        assert!(checksums_match(&digest, &digest.to_uppercase()));
        assert!(verify_checksum(b"abc", &digest.to_uppercase()));
    }

    #[test]
    fn mismatches_are_detected() {
        let digest = sha256_hex(b"abc");
        assert!(!verify_checksum(b"abd", &digest));
        assert!(!checksums_match(&digest, &digest[..63]));
    }
}
