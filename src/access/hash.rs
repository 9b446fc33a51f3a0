use rand::RngCore;
use sha2::{Digest, Sha256};

/// Bytes of entropy in an access token.
pub const ACCESS_TOKEN_BYTES: usize = 32;

/// Deterministic one-way hash of a resource password.
///
/// The resource id is mixed in so equal passwords on different resources
/// do not share a hash. No per-record random salt and no slow KDF.
pub fn hash_password(resource_id: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare two digests without short-circuiting on the first difference.
pub fn digests_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 256-bit random token, hex encoded.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; ACCESS_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_hex() {
        let a = hash_password("character-1", "hunter2");
        assert_eq!(a, hash_password("character-1", "hunter2"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_depends_on_resource_and_password() {
        let base = hash_password("character-1", "hunter2");
        assert_ne!(base, hash_password("character-2", "hunter2"));
        assert_ne!(base, hash_password("character-1", "hunter3"));
        assert_ne!(hash_password("ab", "c"), hash_password("a", "bc"));
    }

    #[test]
    fn digest_comparison() {
        assert!(digests_match("abcd", "abcd"));
        assert!(!digests_match("abcd", "abce"));
        assert!(!digests_match("abcd", "abc"));
    }

    #[test]
    fn tokens_are_unique_and_256_bit() {
        let a = generate_access_token();
        let b = generate_access_token();
        assert_eq!(a.len(), ACCESS_TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }
}
