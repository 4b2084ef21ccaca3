use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::patch::nullable;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>, // NULL for offline accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 hash, not exposed in JSON
    pub token_version: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Both email and password set; only such accounts can log in.
    pub fn is_online(&self) -> bool {
        self.email.is_some() && self.password_hash.is_some()
    }
}

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// Sparse profile update. Keys outside these four are dropped during deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub full_name: Option<Option<String>>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.full_name.is_none()
            && self.email.is_none()
            && self.password.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn user(email: Option<&str>, hash: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            full_name: None,
            email: email.map(str::to_string),
            password_hash: hash.map(str::to_string),
            token_version: 1,
            created_at: datetime!(2024-01-01 0:00 UTC),
            updated_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    #[test]
    fn online_requires_email_and_password() {
        assert!(user(Some("a@x.com"), Some("h")).is_online());
        assert!(!user(None, None).is_online());
        assert!(!user(Some("a@x.com"), None).is_online());
        assert!(!user(None, Some("h")).is_online());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_string(&user(Some("a@x.com"), Some("$argon2id$secret"))).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn patch_drops_unknown_keys() {
        let patch: UserPatch =
            serde_json::from_str(r#"{"token_version": 99, "id": "x"}"#).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_distinguishes_null_from_absent_full_name() {
        let cleared: UserPatch = serde_json::from_str(r#"{"full_name": null}"#).unwrap();
        assert_eq!(cleared.full_name, Some(None));
        assert!(!cleared.is_empty());

        let absent: UserPatch = serde_json::from_str(r#"{"username": "bob"}"#).unwrap();
        assert_eq!(absent.full_name, None);
    }
}
