use async_trait::async_trait;
use chrono::Utc;
use groupdesk_core::{CoreError, CoreResult, User, UserRepository};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::rows::{convert_all, UserRow, USER_COLUMNS};

pub struct StoreUserRepository {
    pool: PgPool,
}

impl StoreUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for StoreUserRepository {
    async fn create(&self, user: &User) -> CoreResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (id, agency_id, username, password_hash, role, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(user.agency_id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        info!("User created: {} in agency {}", user.username, user.agency_id);
        Ok(User::try_from(row)?)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(User::try_from).transpose()?)
    }

    async fn find_by_username(&self, agency_id: Uuid, username: &str) -> CoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE agency_id = $1 AND username = $2",
            USER_COLUMNS
        ))
        .bind(agency_id)
        .bind(username.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(User::try_from).transpose()?)
    }

    async fn list(&self, agency_id: Uuid) -> CoreResult<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE agency_id = $1 ORDER BY username",
            USER_COLUMNS
        ))
        .bind(agency_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> CoreResult<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET is_active = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(is_active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        match row {
            Some(row) => Ok(User::try_from(row)?),
            None => Err(CoreError::NotFound(format!("user {}", id))),
        }
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match CoreError::from(StoreError::from(e)) {
                CoreError::Conflict(_) => {
                    CoreError::Conflict(format!("user {} still owns flight groups", id))
                }
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }
}
