use async_trait::async_trait;
use chrono::Utc;
use groupdesk_core::agency::{ensure_acyclic, MAX_AGENCY_DEPTH};
use groupdesk_core::{Agency, AgencyRepository, AgencyStatus, CoreError, CoreResult};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::rows::{convert_all, AgencyRow, AGENCY_COLUMNS};

/// Serializes hierarchy changes so two concurrent re-parents cannot form a cycle.
const HIERARCHY_LOCK_KEY: i64 = 0x6772_6f75_7064_6b01;

pub struct StoreAgencyRepository {
    pool: PgPool,
}

impl StoreAgencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> StoreResult<Option<Agency>> {
        let row: Option<AgencyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM agencies WHERE id = $1",
            AGENCY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Agency::try_from).transpose()?)
    }

    async fn insert(&self, agency: &Agency) -> StoreResult<Agency> {
        let mut tx = self.pool.begin().await?;
        if let Some(parent) = agency.parent_agency_id {
            lock_hierarchy(&mut tx).await?;
            ensure_exists(&mut tx, parent).await?;
        }

        let row: AgencyRow = sqlx::query_as(&format!(
            "INSERT INTO agencies (id, name, code, parent_agency_id, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            AGENCY_COLUMNS
        ))
        .bind(agency.id)
        .bind(&agency.name)
        .bind(&agency.code)
        .bind(agency.parent_agency_id)
        .bind(agency.status.as_str())
        .bind(agency.created_at)
        .bind(agency.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Agency created: {} ({})", agency.code, agency.id);
        Ok(Agency::try_from(row)?)
    }

    async fn reparent(&self, id: Uuid, parent: Option<Uuid>) -> StoreResult<Agency> {
        let mut tx = self.pool.begin().await?;
        lock_hierarchy(&mut tx).await?;
        ensure_exists(&mut tx, id).await?;

        if let Some(parent) = parent {
            ensure_exists(&mut tx, parent).await?;
            let ancestry: Vec<Uuid> = sqlx::query_scalar(
                r#"
                WITH RECURSIVE chain (id, parent_agency_id, depth) AS (
                    SELECT id, parent_agency_id, 1 FROM agencies WHERE id = $1
                    UNION ALL
                    SELECT a.id, a.parent_agency_id, c.depth + 1
                    FROM agencies a
                    JOIN chain c ON a.id = c.parent_agency_id
                    WHERE c.depth <= $2
                )
                SELECT id FROM chain ORDER BY depth
                "#,
            )
            .bind(parent)
            .bind(MAX_AGENCY_DEPTH as i32)
            .fetch_all(&mut *tx)
            .await?;
            ensure_acyclic(id, &ancestry)?;
        }

        let row: AgencyRow = sqlx::query_as(&format!(
            "UPDATE agencies SET parent_agency_id = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            AGENCY_COLUMNS
        ))
        .bind(id)
        .bind(parent)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Agency::try_from(row)?)
    }
}

async fn lock_hierarchy(tx: &mut Transaction<'_, Postgres>) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(HIERARCHY_LOCK_KEY)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn ensure_exists(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> StoreResult<()> {
    let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM agencies WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(CoreError::NotFound(format!("agency {}", id)).into()),
    }
}

#[async_trait]
impl AgencyRepository for StoreAgencyRepository {
    async fn create(&self, agency: &Agency) -> CoreResult<Agency> {
        Ok(self.insert(agency).await?)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Agency>> {
        Ok(self.fetch(id).await?)
    }

    async fn get_by_code(&self, code: &str) -> CoreResult<Option<Agency>> {
        let row: Option<AgencyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM agencies WHERE code = $1",
            AGENCY_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(Agency::try_from).transpose()?)
    }

    async fn list(&self) -> CoreResult<Vec<Agency>> {
        let rows: Vec<AgencyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM agencies ORDER BY code",
            AGENCY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn list_children(&self, id: Uuid) -> CoreResult<Vec<Agency>> {
        let rows: Vec<AgencyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM agencies WHERE parent_agency_id = $1 ORDER BY code",
            AGENCY_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn update_status(&self, id: Uuid, status: AgencyStatus) -> CoreResult<Agency> {
        let row: Option<AgencyRow> = sqlx::query_as(&format!(
            "UPDATE agencies SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            AGENCY_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        match row {
            Some(row) => Ok(Agency::try_from(row)?),
            None => Err(CoreError::NotFound(format!("agency {}", id))),
        }
    }

    async fn set_parent(&self, id: Uuid, parent_agency_id: Option<Uuid>) -> CoreResult<Agency> {
        Ok(self.reparent(id, parent_agency_id).await?)
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM agencies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("agency {}", id)));
        }
        info!("Agency deleted: {}", id);
        Ok(())
    }
}
