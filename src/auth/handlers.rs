use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            validate_patch, AddAuthenticationRequest, DeletedResponse, LoginRequest, LogoutResponse,
            OfflineUserRequest, PublicUser, RegisterRequest, TokenResponse,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        repo::UserDirectory,
        repo_types::UserPatch,
    },
    error::{AppError, AppResult},
    extract::AppJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/create_offline", post(create_offline))
        .route("/users/add_authentication", post(add_authentication))
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
}

#[instrument(skip(users, payload), fields(username = %payload.username))]
pub async fn register(
    State(users): State<UserDirectory>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let new = payload.validate()?;
    let user = users.register(new).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(users, payload), fields(username = %payload.username))]
pub async fn create_offline(
    State(users): State<UserDirectory>,
    AppJson(payload): AppJson<OfflineUserRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    payload.validate()?;
    let user = users
        .create_offline(&payload.username, payload.full_name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(users, payload), fields(username = %payload.username))]
pub async fn add_authentication(
    State(users): State<UserDirectory>,
    AppJson(payload): AppJson<AddAuthenticationRequest>,
) -> AppResult<Json<PublicUser>> {
    let req = payload.validate()?;
    let user = users
        .add_authentication(&req.username, &req.email, req.password)
        .await?;
    Ok(Json(user.into()))
}

#[instrument(skip(users, keys, payload), fields(username = %payload.username))]
pub async fn login(
    State(users): State<UserDirectory>,
    State(keys): State<JwtKeys>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let (user, token_version) = users.login(&payload.username, &payload.password).await?;
    let access_token = keys
        .issue(&user.username, user.id, token_version, keys.ttl)
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
        user: user.into(),
    }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn logout(
    State(users): State<UserDirectory>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<LogoutResponse>> {
    let token_version = users.logout(&user).await?;
    Ok(Json(LogoutResponse { token_version }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_me(
    State(users): State<UserDirectory>,
    AuthUser(user): AuthUser,
    AppJson(patch): AppJson<UserPatch>,
) -> AppResult<Json<PublicUser>> {
    let patch = validate_patch(patch)?;
    let updated = users.update_partial(&user.username, patch).await?;
    Ok(Json(updated.into()))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn delete_me(
    State(users): State<UserDirectory>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<DeletedResponse>> {
    let id = users.delete(&user.username).await?;
    Ok(Json(DeletedResponse { id }))
}
