//! Salted password digests for staff credentials.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use eventhire_core::DomainError;

const SALT_LEN: usize = 16;
const MIN_PASSWORD_LEN: usize = 8;

/// Salted SHA-256 digest of a password.
///
/// Stored on the `User` aggregate's events; the cleartext never leaves the
/// login boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    salt: String,
    digest: String,
}

impl PasswordHash {
    /// Hash a new password with a fresh random salt.
    pub fn create(password: &str) -> Result<Self, DomainError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = hex::encode(salt_bytes);
        let digest = digest_with_salt(&salt, password);

        Ok(Self { salt, digest })
    }

    /// Check a login attempt against the stored digest.
    pub fn verify(&self, password: &str) -> bool {
        let candidate = digest_with_salt(&self.salt, password);

        // Byte-wise comparison over fixed-length hex digests.
        candidate.len() == self.digest.len()
            && candidate
                .bytes()
                .zip(self.digest.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

fn digest_with_salt(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let hash = PasswordHash::create("correct horse").unwrap();
        assert!(hash.verify("correct horse"));
    }

    #[test]
    fn wrong_password_fails() {
        let hash = PasswordHash::create("correct horse").unwrap();
        assert!(!hash.verify("battery staple"));
    }

    #[test]
    fn short_password_is_rejected() {
        assert!(matches!(
            PasswordHash::create("short"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = PasswordHash::create("correct horse").unwrap();
        let b = PasswordHash::create("correct horse").unwrap();
        assert_ne!(a, b);
    }
}
