//! Password hashing
//!
//! Argon2id with the crate's default parameters and a fresh random salt per
//! hash. Hashes are stored in PHC string format, which carries the algorithm,
//! parameters and salt alongside the digest.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a plaintext password.
///
/// ```ignore
/// let hash = conduit::services::password::hash_password("hunter2")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("{}", e))
        .context("Failed to hash password")?;

    Ok(hash.to_string())
}

/// Check a plaintext password against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow!("{}", e))
        .context("Stored password hash is malformed")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("{}", e)).context("Failed to verify password"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_argon2id_phc_string() {
        let hash = hash_password("jakejake").expect("Failed to hash password");
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("jakejake"));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let first = hash_password("jakejake").unwrap();
        let second = hash_password("jakejake").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_roundtrip() {
        let hash = hash_password("jakejake").unwrap();
        assert!(verify_password("jakejake", &hash).unwrap());
        assert!(!verify_password("JakeJake", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(verify_password("jakejake", "plaintext").is_err());
    }

    #[test]
    fn test_unicode_password() {
        let hash = hash_password("пароль🔐").unwrap();
        assert!(verify_password("пароль🔐", &hash).unwrap());
    }
}
