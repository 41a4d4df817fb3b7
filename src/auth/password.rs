//! Account password handling. Plain text only exists between request parsing
//! and `hash_password`; the store only ever sees argon2 PHC strings.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub const MIN_PASSWORD_LEN: usize = 5;

/// Length rule applied on registration and on profile updates. Whitespace counts.
pub fn check_password_length(plain: &str) -> Result<(), String> {
    if plain.chars().count() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(format!(
            "Ensure this field has at least {MIN_PASSWORD_LEN} characters."
        ))
    }
}

/// Hashes a password that already passed [`check_password_length`].
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            anyhow::anyhow!("hash account password: {e}")
        })
}

/// `Ok(false)` on a wrong password; `Err` only when the stored hash is unreadable.
pub fn verify_password(plain: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        error!(error = %e, "stored password hash is malformed");
        anyhow::anyhow!("parse stored password hash: {e}")
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
