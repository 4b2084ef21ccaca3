use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

use crate::error::{AppError, AppResult};

/// Longest password accepted, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

fn check_length(plain: &str) -> AppResult<()> {
    if plain.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::validation(format!(
            "password cannot be longer than {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> AppResult<String> {
    check_length(plain)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            AppError::Internal(anyhow::anyhow!("hash password: {e}"))
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> AppResult<bool> {
    // An over-long candidate can never match a stored digest.
    if plain.len() > MAX_PASSWORD_BYTES {
        return Ok(false);
    }
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        AppError::Internal(anyhow::anyhow!("parse password hash: {e}"))
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Hashes on the blocking pool so request workers keep serving.
pub async fn hash_password_blocking(plain: String) -> AppResult<String> {
    check_length(&plain)?;
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hash task failed: {e}")))?
}

pub async fn verify_password_blocking(plain: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("verify task failed: {e}")))?
}

lazy_static! {
    // Stand-in digest for accounts with no password, so a failed lookup costs one verify.
    static ref DUMMY_HASH: Option<String> = hash_password("no-such-account-placeholder").ok();
}

/// Runs a full verify against a throwaway digest and discards the result.
pub async fn verify_dummy_blocking(plain: String) {
    let outcome = tokio::task::spawn_blocking(move || {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = verify_password(&plain, hash);
        }
    })
    .await;
    if let Err(e) = outcome {
        error!(error = %e, "dummy verify task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("longpassword1").unwrap();
        let b = hash_password("longpassword1").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("longpassword1", &a).unwrap());
        assert!(verify_password("longpassword1", &b).unwrap());
    }

    #[test]
    fn rejects_passwords_over_72_bytes() {
        let at_limit = "a".repeat(MAX_PASSWORD_BYTES);
        assert!(hash_password(&at_limit).is_ok());

        // 25 three-byte characters: 25 chars but 75 bytes.
        let multibyte = "€".repeat(25);
        let err = hash_password(&multibyte).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn dummy_hash_is_a_real_digest_nobody_matches() {
        let hash = DUMMY_HASH.as_deref().expect("dummy hash");
        assert!(hash.starts_with("$argon2"));
        assert!(!verify_password("longpassword1", hash).unwrap());
    }

    #[tokio::test]
    async fn blocking_wrappers_agree_with_sync_versions() {
        let hash = hash_password_blocking("longpassword1".into()).await.unwrap();
        assert!(verify_password_blocking("longpassword1".into(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password_blocking("longpassword2".into(), hash)
            .await
            .unwrap());
    }
}
