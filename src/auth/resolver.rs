use async_trait::async_trait;
use tracing::warn;

use super::{jwt::JwtKeys, repo_types::User};
use crate::error::{AppError, AppResult};

/// Read side the resolver needs: a live user that is allowed to authenticate.
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Returns the user only if both email and password hash are set.
    async fn find_authenticatable(&self, username: &str) -> AppResult<Option<User>>;
}

/// Turns a bearer token into the live user record.
///
/// The store is consulted on every call; nothing is cached, so a logout revokes
/// outstanding tokens immediately.
pub async fn resolve_identity<L>(keys: &JwtKeys, users: &L, token: &str) -> AppResult<User>
where
    L: UserLookup + ?Sized,
{
    let claims = keys.verify(token).map_err(|e| {
        warn!(reason = %e, "token rejected");
        AppError::unauthorized("could not validate credentials")
    })?;

    let Some(user) = users.find_authenticatable(&claims.sub).await? else {
        warn!(subject = %claims.sub, "token subject missing or offline");
        return Err(AppError::unauthorized("could not validate credentials"));
    };

    // The username may have been freed and taken by a new account since issue.
    if user.id != claims.uid {
        warn!(
            subject = %claims.sub,
            token_uid = %claims.uid,
            user_id = %user.id,
            "token issued to another account"
        );
        return Err(AppError::unauthorized("could not validate credentials"));
    }

    if user.token_version != claims.token_version {
        warn!(
            user_id = %user.id,
            presented = claims.token_version,
            current = user.token_version,
            "revoked token presented"
        );
        return Err(AppError::unauthorized(
            "token has been revoked, please login again",
        ));
    }

    Ok(user)
}
