use sha2::{Digest, Sha256};

/// Compute the checksum of an operation from its forward and rollback code.
///
/// The two parts are separated by a NUL byte so that moving text between
/// them always changes the digest.
pub fn compute_checksum(code: &str, rollback_code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update([0u8]);
    hasher.update(rollback_code.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_deterministic() {
        let a = compute_checksum("CREATE TABLE t (id INT);", "DROP TABLE t;");
        let b = compute_checksum("CREATE TABLE t (id INT);", "DROP TABLE t;");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_checksum_changes_with_either_input() {
        let base = compute_checksum("up", "down");
        assert_ne!(base, compute_checksum("up2", "down"));
        assert_ne!(base, compute_checksum("up", "down2"));
        assert_ne!(base, compute_checksum("up", ""));
    }

    #[test]
    fn test_checksum_is_not_plain_concatenation() {
        // "ab" + "c" and "a" + "bc" must not collide
        assert_ne!(compute_checksum("ab", "c"), compute_checksum("a", "bc"));
    }
}
