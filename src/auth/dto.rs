use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, User, UserPatch};
use crate::error::{AppError, AppResult};

const MAX_USERNAME_CHARS: usize = 150;
const MAX_FULL_NAME_CHARS: usize = 255;
const MIN_PASSWORD_CHARS: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::validation("invalid email"));
    }
    Ok(email)
}

fn check_username(username: &str) -> AppResult<()> {
    let n = username.chars().count();
    if n == 0 || n > MAX_USERNAME_CHARS {
        return Err(AppError::validation(format!(
            "username must be 1 to {MAX_USERNAME_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_full_name(full_name: Option<&str>) -> AppResult<()> {
    if full_name.is_some_and(|n| n.chars().count() > MAX_FULL_NAME_CHARS) {
        return Err(AppError::validation(format!(
            "full_name cannot exceed {MAX_FULL_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

// The 72-byte upper bound is enforced by the hasher.
fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::validation("password too short"));
    }
    Ok(())
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

impl RegisterRequest {
    pub fn validate(self) -> AppResult<NewUser> {
        check_username(&self.username)?;
        check_full_name(self.full_name.as_deref())?;
        check_password(&self.password)?;
        Ok(NewUser {
            email: normalize_email(&self.email)?,
            username: self.username,
            password: self.password,
            full_name: self.full_name,
        })
    }
}

/// Request body for creating an account without credentials.
#[derive(Debug, Deserialize)]
pub struct OfflineUserRequest {
    pub username: String,
    pub full_name: Option<String>,
}

impl OfflineUserRequest {
    pub fn validate(&self) -> AppResult<()> {
        check_username(&self.username)?;
        check_full_name(self.full_name.as_deref())
    }
}

/// Request body for upgrading an offline account.
#[derive(Debug, Deserialize)]
pub struct AddAuthenticationRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl AddAuthenticationRequest {
    pub fn validate(mut self) -> AppResult<Self> {
        check_password(&self.password)?;
        self.email = normalize_email(&self.email)?;
        Ok(self)
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub fn validate_patch(mut patch: UserPatch) -> AppResult<UserPatch> {
    if let Some(username) = patch.username.as_deref() {
        check_username(username)?;
    }
    if let Some(Some(full_name)) = patch.full_name.as_ref() {
        check_full_name(Some(full_name))?;
    }
    if let Some(password) = patch.password.as_deref() {
        check_password(password)?;
    }
    if let Some(email) = patch.email.take() {
        patch.email = Some(normalize_email(&email)?);
    }
    Ok(patch)
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub token_version: i32,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: Uuid,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            full_name: u.full_name,
            email: u.email,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
