use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

/// Argon2id with a fresh random salt per call.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            anyhow::anyhow!(e.to_string())
        })
}

/// `Ok(false)` means a wrong password; a malformed stored hash is an error,
/// since that points at data corruption rather than user input.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "stored password hash is malformed");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_salt_gives_distinct_hashes() {
        let a = hash_password("clave-segura-1").unwrap();
        let b = hash_password("clave-segura-1").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("clave-segura-1", &a).unwrap());
        assert!(verify_password("clave-segura-1", &b).unwrap());
    }

    #[test]
    fn wrong_password_does_not_verify() {
        let hash = hash_password("primera-clave").unwrap();
        assert!(!verify_password("otra-clave", &hash).unwrap());
    }

    #[test]
    fn garbage_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("whatever", "$argon2id$not-a-real-hash").is_err());
        assert!(verify_password("whatever", "").is_err());
    }
}
