//! Password hashing and verification using Argon2id
use crate::twoface::{BlockingResp, Cause, ExternalError, Fallible, TfError};
use actix_web::web::block;
use anyhow::anyhow;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};

const MIN_PASSWORD_CHARS: usize = 8;

/// Hash a password using Argon2id. Returns a PHC string suitable for storage.
pub fn hash_password(password: &str) -> Fallible<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("couldn't hash password: {}", e))?
        .to_string();
    Ok(hash)
}

/// Fails with `UserBadAuth` if the password doesn't match.
pub fn verify_password(password: &str, hash: &str) -> Fallible<()> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow!("stored password hash is invalid: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| TfError::reject(Cause::UserBadAuth, "Invalid username or password"))
}

/// Runs on the blocking thread pool.
pub async fn hash_password_blocking(password: String) -> Fallible<String> {
    block(move || hash_password(&password)).await.to_resp()
}

pub async fn verify_password_blocking(password: String, hash: String) -> Fallible<()> {
    block(move || verify_password(&password, &hash))
        .await
        .to_resp()
}

/// Rules every new password must pass: a minimum length, not only digits, and not the username.
pub fn check_password_rules(password: &str, confirmation: &str, username: &str) -> Fallible<()> {
    let rejection = |text| {
        Err(TfError {
            internal: anyhow!("password rejected: {}", text),
            external: ExternalError::invalid_field(text),
        })
    };
    if password != confirmation {
        return rejection("The two password fields didn't match");
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return rejection("This password is too short. It must contain at least 8 characters");
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return rejection("This password is entirely numeric");
    }
    if password.eq_ignore_ascii_case(username) {
        return rejection("The password is too similar to the username");
    }
    Ok(())
}
