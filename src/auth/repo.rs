use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        password::{hash_password_blocking, verify_dummy_blocking, verify_password_blocking},
        repo_types::{NewUser, User, UserPatch},
        resolver::UserLookup,
    },
    clock::Clock,
    error::{AppError, AppResult},
    state::AppState,
};

/// Transactional access to the `users` table.
///
/// UNIQUE constraints on `username` and `email` are what actually guarantee uniqueness.
/// The existence checks below only give a friendlier message on the common path; a
/// concurrent writer that slips past them still trips the constraint, which surfaces
/// as `AppError::Conflict` through `From<sqlx::Error>`.
#[derive(Clone)]
pub struct UserDirectory {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

impl FromRef<AppState> for UserDirectory {
    fn from_ref(state: &AppState) -> Self {
        UserDirectory::new(state.db.clone(), state.clock.clone())
    }
}

async fn username_taken(conn: &mut sqlx::PgConnection, username: &str) -> AppResult<bool> {
    let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
        .bind(username)
        .fetch_one(conn)
        .await?;
    Ok(taken)
}

async fn email_taken_by_other(conn: &mut sqlx::PgConnection, email: &str, except: Option<Uuid>) -> AppResult<bool> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2))",
    )
    .bind(email)
    .bind(except)
    .fetch_one(conn)
    .await?;
    Ok(taken)
}

impl UserDirectory {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn register(&self, new: NewUser) -> AppResult<User> {
        // Hash before opening the transaction so the connection isn't held during it.
        let password_hash = hash_password_blocking(new.password).await?;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        if username_taken(&mut tx, &new.username).await? {
            return Err(AppError::conflict("username already exists"));
        }
        if email_taken_by_other(&mut tx, &new.email, None).await? {
            return Err(AppError::conflict("email already in use"));
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, full_name, email, password_hash, token_version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 1, $6, $6)
            RETURNING id, username, full_name, email, password_hash, token_version, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.full_name)
        .bind(&new.email)
        .bind(&password_hash)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    pub async fn create_offline(&self, username: &str, full_name: Option<&str>) -> AppResult<User> {
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        if username_taken(&mut tx, username).await? {
            return Err(AppError::conflict("username already exists"));
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, full_name, token_version, created_at, updated_at)
            VALUES ($1, $2, $3, 1, $4, $4)
            RETURNING id, username, full_name, email, password_hash, token_version, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(full_name)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = %user.id, username = %user.username, "offline user created");
        Ok(user)
    }

    /// One-way upgrade of an offline account: email and password can be set here once.
    pub async fn add_authentication(&self, username: &str, email: &str, password: String) -> AppResult<User> {
        let password_hash = hash_password_blocking(password).await?;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        let current = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, full_name, email, password_hash, token_version, created_at, updated_at
            FROM users
            WHERE username = $1
            FOR UPDATE
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

        if current.email.is_some() || current.password_hash.is_some() {
            return Err(AppError::conflict("user already has authentication enabled"));
        }
        if email_taken_by_other(&mut tx, email, Some(current.id)).await? {
            return Err(AppError::conflict("email already in use"));
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, updated_at = $4
            WHERE id = $1
            RETURNING id, username, full_name, email, password_hash, token_version, created_at, updated_at
            "#,
        )
        .bind(current.id)
        .bind(email)
        .bind(&password_hash)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = %user.id, "authentication added to offline user");
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, full_name, email, password_hash, token_version, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        user.ok_or_else(|| AppError::not_found("user not found"))
    }

    pub async fn update_partial(&self, username: &str, patch: UserPatch) -> AppResult<User> {
        if patch.is_empty() {
            return Err(AppError::validation("no fields to update"));
        }
        let password_hash = match patch.password {
            Some(p) => Some(hash_password_blocking(p).await?),
            None => None,
        };
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        let current = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, full_name, email, password_hash, token_version, created_at, updated_at
            FROM users
            WHERE username = $1
            FOR UPDATE
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

        if (patch.email.is_some() || password_hash.is_some()) && !current.is_online() {
            return Err(AppError::validation(
                "offline accounts must add authentication before changing email or password",
            ));
        }
        if let Some(new_username) = patch.username.as_deref() {
            if new_username != current.username && username_taken(&mut tx, new_username).await? {
                return Err(AppError::conflict("username already exists"));
            }
        }
        if let Some(new_email) = patch.email.as_deref() {
            if email_taken_by_other(&mut tx, new_email, Some(current.id)).await? {
                return Err(AppError::conflict("email already in use"));
            }
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = ");
        qb.push_bind(now);
        if let Some(v) = patch.username {
            qb.push(", username = ").push_bind(v);
        }
        if let Some(v) = patch.full_name {
            qb.push(", full_name = ").push_bind(v);
        }
        if let Some(v) = patch.email {
            qb.push(", email = ").push_bind(v);
        }
        if let Some(v) = password_hash {
            qb.push(", password_hash = ").push_bind(v);
        }
        qb.push(" WHERE id = ").push_bind(current.id);
        qb.push(" RETURNING id, username, full_name, email, password_hash, token_version, created_at, updated_at");

        let user = qb.build_query_as::<User>().fetch_one(&mut *tx).await?;
        tx.commit().await?;

        info!(user_id = %user.id, "user updated");
        Ok(user)
    }

    pub async fn delete(&self, username: &str) -> AppResult<Uuid> {
        let mut tx = self.db.begin().await?;
        let deleted = sqlx::query_scalar::<_, Uuid>("DELETE FROM users WHERE username = $1 RETURNING id")
            .bind(username)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(id) = deleted else {
            tx.rollback().await?;
            return Err(AppError::not_found("user not found"));
        };
        tx.commit().await?;

        info!(user_id = %id, "user deleted");
        Ok(id)
    }

    /// Checks credentials and returns the user with the token version to embed.
    /// Unknown user, offline account and wrong password all produce the same error,
    /// and all of them pay for one Argon2 verify.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<(User, i32)> {
        let invalid = || AppError::unauthorized("invalid credentials");

        let user = match self.find_by_username(username).await {
            Ok(u) => u,
            Err(AppError::NotFound(_)) => {
                warn!(username, "login unknown username");
                verify_dummy_blocking(password.to_string()).await;
                return Err(invalid());
            }
            Err(e) => return Err(e),
        };
        let Some(hash) = user.password_hash.clone().filter(|_| user.email.is_some()) else {
            warn!(user_id = %user.id, "login attempt on offline account");
            verify_dummy_blocking(password.to_string()).await;
            return Err(invalid());
        };
        if !verify_password_blocking(password.to_string(), hash).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(invalid());
        }

        info!(user_id = %user.id, "user logged in");
        let version = user.token_version;
        Ok((user, version))
    }

    /// Bumps the token version, revoking every token issued so far.
    pub async fn logout(&self, user: &User) -> AppResult<i32> {
        let mut tx = self.db.begin().await?;
        let version = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE users
            SET token_version = token_version + 1, updated_at = $2
            WHERE id = $1
            RETURNING token_version
            "#,
        )
        .bind(user.id)
        .bind(self.clock.now())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(version) = version else {
            tx.rollback().await?;
            return Err(AppError::not_found("user not found"));
        };
        tx.commit().await?;

        info!(user_id = %user.id, token_version = version, "tokens revoked");
        Ok(version)
    }
}

#[async_trait]
impl UserLookup for UserDirectory {
    async fn find_authenticatable(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, full_name, email, password_hash, token_version, created_at, updated_at
            FROM users
            WHERE username = $1 AND email IS NOT NULL AND password_hash IS NOT NULL
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

// Database-backed; run with `DATABASE_URL=... cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn directory(pool: PgPool) -> UserDirectory {
        UserDirectory::new(pool, Arc::new(SystemClock))
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password: "longpassword1".into(),
            full_name: Some("Alice Liddell".into()),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn register_then_find(pool: PgPool) {
        let users = directory(pool);
        let created = users.register(new_user("alice", "alice@x.com")).await.unwrap();
        assert_eq!(created.token_version, 1);
        assert!(created.is_online());
        assert_ne!(created.password_hash.as_deref(), Some("longpassword1"));

        let found = users.find_by_username("alice").await.unwrap();
        assert_eq!(found.id, created.id);
        assert!(matches!(
            users.find_by_username("Alice").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn register_rejects_duplicate_username_and_email(pool: PgPool) {
        let users = directory(pool);
        users.register(new_user("alice", "alice@x.com")).await.unwrap();

        let dup_name = users.register(new_user("alice", "other@x.com")).await;
        assert!(matches!(dup_name, Err(AppError::Conflict(_))));
        let dup_email = users.register(new_user("bob", "alice@x.com")).await;
        assert!(matches!(dup_email, Err(AppError::Conflict(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn concurrent_registration_yields_one_conflict(pool: PgPool) {
        let users = directory(pool);
        let (a, b) = tokio::join!(
            users.register(new_user("racer", "racer1@x.com")),
            users.register(new_user("racer", "racer2@x.com")),
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AppError::Conflict(_))))
                .count(),
            1
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn offline_user_upgrades_once(pool: PgPool) {
        let users = directory(pool);
        let offline = users.create_offline("carol", None).await.unwrap();
        assert!(!offline.is_online());
        assert!(matches!(
            users.create_offline("carol", None).await,
            Err(AppError::Conflict(_))
        ));

        // Offline accounts cannot log in.
        assert!(matches!(
            users.login("carol", "longpassword1").await,
            Err(AppError::Unauthorized(_))
        ));

        let upgraded = users
            .add_authentication("carol", "carol@x.com", "longpassword1".into())
            .await
            .unwrap();
        assert!(upgraded.is_online());
        assert!(users.login("carol", "longpassword1").await.is_ok());

        let again = users
            .add_authentication("carol", "carol2@x.com", "longpassword2".into())
            .await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn add_authentication_checks_existence_and_email(pool: PgPool) {
        let users = directory(pool);
        let missing = users
            .add_authentication("nobody", "n@x.com", "longpassword1".into())
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        users.register(new_user("alice", "alice@x.com")).await.unwrap();
        users.create_offline("dave", None).await.unwrap();
        let taken = users
            .add_authentication("dave", "alice@x.com", "longpassword1".into())
            .await;
        assert!(matches!(taken, Err(AppError::Conflict(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn login_errors_are_indistinguishable(pool: PgPool) {
        let users = directory(pool);
        users.register(new_user("alice", "alice@x.com")).await.unwrap();
        users.create_offline("ghost", None).await.unwrap();

        let unknown = users.login("nobody", "longpassword1").await.unwrap_err();
        let wrong = users.login("alice", "wrong-password").await.unwrap_err();
        let offline = users.login("ghost", "longpassword1").await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(wrong.to_string(), offline.to_string());
        assert!(matches!(wrong, AppError::Unauthorized(_)));

        let (user, version) = users.login("alice", "longpassword1").await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(version, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn update_partial_applies_only_given_fields(pool: PgPool) {
        let users = directory(pool);
        let before = users.register(new_user("alice", "alice@x.com")).await.unwrap();
        users.register(new_user("bob", "bob@x.com")).await.unwrap();

        let empty = users.update_partial("alice", UserPatch::default()).await;
        assert!(matches!(empty, Err(AppError::Validation(_))));

        let clash = users
            .update_partial(
                "alice",
                UserPatch {
                    email: Some("bob@x.com".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(clash, Err(AppError::Conflict(_))));

        let after = users
            .update_partial(
                "alice",
                UserPatch {
                    full_name: Some(None),
                    password: Some("newpassword9".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(after.full_name, None);
        assert_eq!(after.email, before.email);
        assert!(after.updated_at >= before.updated_at);
        assert_ne!(after.password_hash, before.password_hash);
        assert!(users.login("alice", "newpassword9").await.is_ok());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn logout_increments_version(pool: PgPool) {
        let users = directory(pool);
        let user = users.register(new_user("alice", "alice@x.com")).await.unwrap();
        assert_eq!(users.logout(&user).await.unwrap(), 2);
        assert_eq!(users.logout(&user).await.unwrap(), 3);
        assert_eq!(users.find_by_username("alice").await.unwrap().token_version, 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn delete_removes_user(pool: PgPool) {
        let users = directory(pool);
        let user = users.register(new_user("alice", "alice@x.com")).await.unwrap();
        assert_eq!(users.delete("alice").await.unwrap(), user.id);
        assert!(matches!(users.delete("alice").await, Err(AppError::NotFound(_))));
    }
}
