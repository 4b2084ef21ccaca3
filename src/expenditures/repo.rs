use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::repo_types::{Expenditure, ExpenditurePatch, ExpenditureStatus, NewExpenditure};
use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    state::AppState,
};

const RETURNING: &str =
    " RETURNING id, owner_id, name, date_of_expense, amount, category, notes, status, created_at";

/// Expenditure access scoped to a single owner.
///
/// Every statement filters on `owner_id`, so a row belonging to someone else looks
/// exactly like a row that does not exist.
#[derive(Clone)]
pub struct ExpenditureStore {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

impl FromRef<AppState> for ExpenditureStore {
    fn from_ref(state: &AppState) -> Self {
        ExpenditureStore::new(state.db.clone(), state.clock.clone())
    }
}

fn not_found() -> AppError {
    AppError::not_found("expenditure not found")
}

async fn insert_one(
    conn: &mut PgConnection,
    owner: Uuid,
    new: NewExpenditure,
    now: OffsetDateTime,
) -> AppResult<Expenditure> {
    let row = sqlx::query_as::<_, Expenditure>(
        r#"
        INSERT INTO expenditures (id, owner_id, name, date_of_expense, amount, category, notes, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, owner_id, name, date_of_expense, amount, category, notes, status, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner)
    .bind(new.name)
    .bind(new.date_of_expense)
    .bind(new.amount)
    .bind(new.category)
    .bind(new.notes)
    .bind(new.status.as_str())
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Builds the UPDATE for a patch. Column names come from this function only; caller
/// input reaches the statement solely as bound parameters.
fn build_update(owner: Uuid, id: Uuid, patch: ExpenditurePatch) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE expenditures SET ");
    let mut set = qb.separated(", ");
    if let Some(v) = patch.name {
        set.push("name = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.date_of_expense {
        set.push("date_of_expense = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.amount {
        set.push("amount = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.category {
        set.push("category = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.notes {
        set.push("notes = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.status {
        set.push("status = ").push_bind_unseparated(v.as_str());
    }
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(" AND owner_id = ").push_bind(owner);
    qb.push(RETURNING);
    qb
}

impl ExpenditureStore {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn list(&self, owner: Uuid) -> AppResult<Vec<Expenditure>> {
        let rows = sqlx::query_as::<_, Expenditure>(
            r#"
            SELECT id, owner_id, name, date_of_expense, amount, category, notes, status, created_at
            FROM expenditures
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn list_by_status(&self, owner: Uuid, status: ExpenditureStatus) -> AppResult<Vec<Expenditure>> {
        let rows = sqlx::query_as::<_, Expenditure>(
            r#"
            SELECT id, owner_id, name, date_of_expense, amount, category, notes, status, created_at
            FROM expenditures
            WHERE owner_id = $1 AND status = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner)
        .bind(status.as_str())
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Inclusive on both ends, by `date_of_expense`.
    pub async fn list_by_date_range(&self, owner: Uuid, start: Date, end: Date) -> AppResult<Vec<Expenditure>> {
        if start > end {
            return Err(AppError::validation("start date must not be after end date"));
        }
        let rows = sqlx::query_as::<_, Expenditure>(
            r#"
            SELECT id, owner_id, name, date_of_expense, amount, category, notes, status, created_at
            FROM expenditures
            WHERE owner_id = $1 AND date_of_expense BETWEEN $2 AND $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, owner: Uuid, id: Uuid) -> AppResult<Expenditure> {
        sqlx::query_as::<_, Expenditure>(
            r#"
            SELECT id, owner_id, name, date_of_expense, amount, category, notes, status, created_at
            FROM expenditures
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(not_found)
    }

    pub async fn create(&self, owner: Uuid, new: NewExpenditure) -> AppResult<Expenditure> {
        new.validate()?;
        let mut tx = self.db.begin().await?;
        let row = insert_one(&mut tx, owner, new, self.clock.now()).await?;
        tx.commit().await?;

        info!(owner_id = %owner, expenditure_id = %row.id, "expenditure created");
        Ok(row)
    }

    /// All-or-nothing: the first failing row rolls back every row inserted before it.
    pub async fn create_bulk(&self, owner: Uuid, items: Vec<NewExpenditure>) -> AppResult<Vec<Expenditure>> {
        if items.is_empty() {
            return Err(AppError::validation("expenditure list must not be empty"));
        }
        let now = self.clock.now();
        let mut created = Vec::with_capacity(items.len());

        let mut tx = self.db.begin().await?;
        for (index, item) in items.into_iter().enumerate() {
            let result = match item.validate() {
                Ok(()) => insert_one(&mut tx, owner, item, now).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(row) => created.push(row),
                Err(e) => {
                    tx.rollback().await?;
                    warn!(owner_id = %owner, index, error = %e, "bulk create rolled back");
                    return Err(match e {
                        AppError::Validation(msg) => AppError::validation(format!("item {index}: {msg}")),
                        other => other,
                    });
                }
            }
        }
        tx.commit().await?;

        info!(owner_id = %owner, count = created.len(), "expenditures created");
        Ok(created)
    }

    pub async fn update_partial(&self, owner: Uuid, id: Uuid, patch: ExpenditurePatch) -> AppResult<Expenditure> {
        if patch.is_empty() {
            return Err(AppError::validation("no recognized fields to update"));
        }
        patch.validate()?;

        let mut tx = self.db.begin().await?;
        let updated = build_update(owner, id, patch)
            .build_query_as::<Expenditure>()
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = updated else {
            tx.rollback().await?;
            return Err(not_found());
        };
        tx.commit().await?;

        info!(owner_id = %owner, expenditure_id = %id, "expenditure updated");
        Ok(row)
    }

    /// Pending → Approved. An already approved row reports `NotFound`, same as a missing one.
    pub async fn approve(&self, owner: Uuid, id: Uuid) -> AppResult<Expenditure> {
        let mut tx = self.db.begin().await?;
        let approved = sqlx::query_as::<_, Expenditure>(
            r#"
            UPDATE expenditures
            SET status = $3
            WHERE id = $1 AND owner_id = $2 AND status = $4
            RETURNING id, owner_id, name, date_of_expense, amount, category, notes, status, created_at
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(ExpenditureStatus::Approved.as_str())
        .bind(ExpenditureStatus::Pending.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = approved else {
            tx.rollback().await?;
            return Err(AppError::not_found("pending expenditure not found"));
        };
        tx.commit().await?;

        info!(owner_id = %owner, expenditure_id = %id, "expenditure approved");
        Ok(row)
    }

    pub async fn approve_all(&self, owner: Uuid) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;
        let count = sqlx::query("UPDATE expenditures SET status = $2 WHERE owner_id = $1 AND status = $3")
            .bind(owner)
            .bind(ExpenditureStatus::Approved.as_str())
            .bind(ExpenditureStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        info!(owner_id = %owner, count, "pending expenditures approved");
        Ok(count)
    }

    pub async fn delete(&self, owner: Uuid, id: Uuid) -> AppResult<Uuid> {
        let mut tx = self.db.begin().await?;
        let affected = sqlx::query("DELETE FROM expenditures WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            tx.rollback().await?;
            return Err(not_found());
        }
        tx.commit().await?;

        info!(owner_id = %owner, expenditure_id = %id, "expenditure deleted");
        Ok(id)
    }
}
