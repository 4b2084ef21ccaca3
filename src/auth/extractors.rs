use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use super::{jwt::JwtKeys, repo::UserDirectory, repo_types::User, resolver::resolve_identity};
use crate::error::AppError;

/// The verified, live user behind the request's bearer token.
pub struct AuthUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    UserDirectory: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let keys = JwtKeys::from_ref(state);
        let users = UserDirectory::from_ref(state);
        let user = resolve_identity(&keys, &users, token).await?;
        Ok(AuthUser(user))
    }
}

/// Pulls `<token>` out of `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;

    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("invalid auth scheme"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    use crate::state::AppState;

    fn headers(value: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(v) = value {
            h.insert(AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token(&headers(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert_eq!(bearer_token(&headers(Some("bearer abc"))).unwrap(), "abc");
    }

    #[test]
    fn rejects_missing_or_foreign_scheme() {
        for h in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer "), Some("abc")] {
            let err = bearer_token(&headers(h)).unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(_)));
        }
    }

    // The lazy pool never connects: rejection happens before any store access.
    #[tokio::test]
    async fn bad_token_is_rejected_without_touching_the_store() {
        let state = AppState::fake();
        let req = Request::builder()
            .header(AUTHORIZATION, "Bearer not-a-jwt")
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .expect("rejected");
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
