use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,        // username
    pub uid: Uuid,          // users.id, survives renames and username reuse
    pub token_version: i32, // users.token_version at issue time
    pub iat: i64,           // issued at (unix timestamp)
    pub exp: i64,           // expires at (unix timestamp)
    pub iss: String,        // issuer
    pub aud: String,        // audience
}
