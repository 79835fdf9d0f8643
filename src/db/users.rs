use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::RepoError;
use crate::models::{NewUser, User};

/// Persistence operations on the `users` table.
///
/// Implementations translate every backend failure into a [`RepoError`]
/// before returning; callers never see driver error types.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a row and return the store-assigned id.
    async fn create(&self, user: &NewUser) -> Result<i64, RepoError>;

    async fn get_by_id(&self, id: i64) -> Result<User, RepoError>;

    /// Overwrite every mutable column of the row.
    async fn update_by_id(&self, id: i64, user: &NewUser) -> Result<(), RepoError>;

    async fn delete_by_id(&self, id: i64) -> Result<(), RepoError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        PgUserRepository { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &NewUser) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, password_hash, email, phone_number, role)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, RepoError> {
        let mut rows = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, email, phone_number, role, created_at, last_login
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        match rows.len() {
            0 => Err(RepoError::NotFound),
            1 => Ok(rows.remove(0)),
            n => Err(RepoError::Infrastructure(format!(
                "{n} rows found for user id {id}"
            ))),
        }
    }

    async fn update_by_id(&self, id: i64, user: &NewUser) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE users
             SET username = $2, password_hash = $3, email = $4, phone_number = $5, role = $6
             WHERE id = $1",
        )
        .bind(id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.role)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        // A zero-row UPDATE is not an error to Postgres.
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

/// Map a driver error onto the repository taxonomy.
pub fn classify(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => RepoError::Conflict,
        other => RepoError::Infrastructure(other.to_string()),
    }
}
