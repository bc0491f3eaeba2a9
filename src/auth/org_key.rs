//! Org key generation and hashing for non-interactive callers

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

const ORG_KEY_PREFIX: &str = "orgApiKey-";

/// Org key generator
pub struct OrgKeyGenerator;

impl OrgKeyGenerator {
    /// Generate a new org key
    /// Format: orgApiKey-<40-char-random>
    pub fn generate() -> String {
        let random: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(40)
            .map(char::from)
            .collect();

        format!("{}{}", ORG_KEY_PREFIX, random)
    }

    /// Hash org key for storage and lookup using SHA-256
    pub fn hash(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.trim().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_org_key() {
        let key = OrgKeyGenerator::generate();
        assert!(key.starts_with(ORG_KEY_PREFIX));
        assert_eq!(key.len(), ORG_KEY_PREFIX.len() + 40);
        assert_ne!(key, OrgKeyGenerator::generate());
    }

    #[test]
    fn test_hash_is_deterministic_and_hex() {
        let key = "orgApiKey-abc";
        assert_eq!(OrgKeyGenerator::hash(key), OrgKeyGenerator::hash(key));
        // SHA-256 produces 64 hex characters
        assert_eq!(OrgKeyGenerator::hash(key).len(), 64);
    }

    #[test]
    fn test_hash_ignores_surrounding_whitespace() {
        assert_eq!(
            OrgKeyGenerator::hash("orgApiKey-abc\n"),
            OrgKeyGenerator::hash("orgApiKey-abc")
        );
        assert_ne!(
            OrgKeyGenerator::hash("orgApiKey-abc"),
            OrgKeyGenerator::hash("orgApiKey-abd")
        );
    }
}
