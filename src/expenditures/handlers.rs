use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{ApprovedCount, DateRange, DeletedExpenditure},
    repo::ExpenditureStore,
    repo_types::{Expenditure, ExpenditurePatch, ExpenditureStatus, NewExpenditure},
};
use crate::{
    auth::AuthUser,
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/expenditures", get(list))
        .route("/expenditures/pending", get(list_pending))
        .route("/expenditures/approved", get(list_approved))
        .route("/expenditures/range", get(list_in_range))
        .route("/expenditures/:id", get(get_one))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/expenditures", post(create))
        .route("/expenditures/bulk", post(create_bulk))
        .route("/expenditures/approve", patch(approve_all))
        .route("/expenditures/:id", patch(update).delete(delete))
        .route("/expenditures/:id/approve", patch(approve))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Expenditure>>> {
    Ok(Json(store.list(user.id).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_pending(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Expenditure>>> {
    Ok(Json(store.list_by_status(user.id, ExpenditureStatus::Pending).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_approved(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Expenditure>>> {
    Ok(Json(store.list_by_status(user.id, ExpenditureStatus::Approved).await?))
}

#[instrument(skip_all, fields(user_id = %user.id, start = %range.start, end = %range.end))]
pub async fn list_in_range(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
    AppQuery(range): AppQuery<DateRange>,
) -> AppResult<Json<Vec<Expenditure>>> {
    Ok(Json(store.list_by_date_range(user.id, range.start, range.end).await?))
}

#[instrument(skip_all, fields(user_id = %user.id, %id))]
pub async fn get_one(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Expenditure>> {
    Ok(Json(store.get(user.id, id).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<NewExpenditure>,
) -> AppResult<(StatusCode, Json<Expenditure>)> {
    let row = store.create(user.id, body).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

#[instrument(skip_all, fields(user_id = %user.id, count = body.len()))]
pub async fn create_bulk(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<Vec<NewExpenditure>>,
) -> AppResult<(StatusCode, Json<Vec<Expenditure>>)> {
    let rows = store.create_bulk(user.id, body).await?;
    Ok((StatusCode::CREATED, Json(rows)))
}

#[instrument(skip_all, fields(user_id = %user.id, %id))]
pub async fn update(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(patch): AppJson<ExpenditurePatch>,
) -> AppResult<Json<Expenditure>> {
    Ok(Json(store.update_partial(user.id, id, patch).await?))
}

#[instrument(skip_all, fields(user_id = %user.id, %id))]
pub async fn approve(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Expenditure>> {
    Ok(Json(store.approve(user.id, id).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn approve_all(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ApprovedCount>> {
    let count = store.approve_all(user.id).await?;
    Ok(Json(ApprovedCount { count }))
}

#[instrument(skip_all, fields(user_id = %user.id, %id))]
pub async fn delete(
    State(store): State<ExpenditureStore>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<DeletedExpenditure>> {
    let id = store.delete(user.id, id).await?;
    Ok(Json(DeletedExpenditure { id }))
}
