use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupdesk_core::lifecycle::{ensure_deletable, ensure_editable, validate_transition};
use groupdesk_core::seat_bucket::ensure_currency_matches;
use groupdesk_core::{
    BucketSpec, CoreResult, FlightGroup, FlightGroupRepository, FlightGroupStatus,
    HoldStatus, PaxType, SeatBucket, StatusChange,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::database::set_lock_timeout;
use crate::error::{StoreError, StoreResult};
use crate::ledger_repo::{lock_group, resolve_held, save_counters};
use crate::rows::{convert_all, FlightGroupRow, SeatBucketRow, BUCKET_COLUMNS, GROUP_COLUMNS};

pub struct StoreFlightGroupRepository {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl StoreFlightGroupRepository {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self { pool, lock_timeout_ms }
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;
        Ok(tx)
    }

    async fn buckets_for_update(
        tx: &mut Transaction<'_, Postgres>,
        group_id: Uuid,
    ) -> StoreResult<Vec<SeatBucket>> {
        let rows: Vec<SeatBucketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM group_seat_buckets WHERE flight_group_id = $1 ORDER BY id FOR UPDATE",
            BUCKET_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&mut **tx)
        .await?;
        convert_all(rows)
    }

    async fn upsert_in_tx(
        &self,
        group_id: Uuid,
        pax_type: PaxType,
        spec: &BucketSpec,
        single_currency: bool,
    ) -> StoreResult<SeatBucket> {
        spec.validate()?;
        let mut tx = self.begin().await?;
        let group = lock_group(&mut tx, group_id, "FOR UPDATE").await?;
        ensure_editable(&group)?;

        let buckets = Self::buckets_for_update(&mut tx, group_id).await?;
        if single_currency {
            ensure_currency_matches(&buckets, pax_type, &spec.currency)?;
        }

        let bucket = match buckets.into_iter().find(|b| b.pax_type == pax_type) {
            Some(mut bucket) => {
                bucket.apply_spec(spec)?;
                save_counters(&mut tx, &bucket).await?;
                bucket
            }
            None => {
                let bucket = SeatBucket::new(group_id, pax_type, spec)?;
                sqlx::query(
                    "INSERT INTO group_seat_buckets \
                     (id, flight_group_id, pax_type, total_seats, seats_on_hold, seats_issued, \
                      base_fare, tax_amount, fee_amount, currency, version, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                )
                .bind(bucket.id)
                .bind(bucket.flight_group_id)
                .bind(bucket.pax_type.as_str())
                .bind(bucket.total_seats)
                .bind(bucket.seats_on_hold)
                .bind(bucket.seats_issued)
                .bind(bucket.base_fare)
                .bind(bucket.tax_amount)
                .bind(bucket.fee_amount)
                .bind(&bucket.currency)
                .bind(bucket.version)
                .bind(bucket.created_at)
                .bind(bucket.updated_at)
                .execute(&mut *tx)
                .await?;
                bucket
            }
        };

        tx.commit().await?;
        info!(
            "Seat bucket {} {} on group {}: total={} currency={}",
            bucket.id, pax_type, group_id, bucket.total_seats, bucket.currency
        );
        Ok(bucket)
    }

    async fn transition_in_tx(
        &self,
        group_id: Uuid,
        target: FlightGroupStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusChange> {
        let mut tx = self.begin().await?;
        let group = lock_group(&mut tx, group_id, "FOR UPDATE").await?;
        let mut buckets = Self::buckets_for_update(&mut tx, group_id).await?;
        validate_transition(&group, &buckets, target)?;

        let mut released_holds = 0;
        if target == FlightGroupStatus::Cancelled {
            for bucket in buckets.iter_mut() {
                released_holds += resolve_held(&mut tx, bucket, HoldStatus::Released, now, false).await?;
            }
        }

        let row: FlightGroupRow = sqlx::query_as(&format!(
            "UPDATE flight_groups SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .bind(target.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            "Flight group {} moved {} -> {} ({} holds released)",
            group_id, group.status, target, released_holds
        );
        Ok(StatusChange { group: FlightGroup::try_from(row)?, released_holds })
    }

    async fn delete_in_tx(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let group = lock_group(&mut tx, id, "FOR UPDATE").await?;
        ensure_deletable(&group)?;
        sqlx::query("DELETE FROM flight_groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("Flight group deleted: {}", id);
        Ok(())
    }
}

#[async_trait]
impl FlightGroupRepository for StoreFlightGroupRepository {
    async fn create(&self, group: &FlightGroup) -> CoreResult<FlightGroup> {
        let row: FlightGroupRow = sqlx::query_as(&format!(
            "INSERT INTO flight_groups \
             (id, agency_id, carrier_code, flight_number, pnr_mode, origin, destination, \
              departure_time_utc, departure_time_local, arrival_time_utc, arrival_time_local, \
              sales_start, sales_end, status, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             RETURNING {}",
            GROUP_COLUMNS
        ))
        .bind(group.id)
        .bind(group.agency_id)
        .bind(&group.carrier_code)
        .bind(&group.flight_number)
        .bind(group.pnr_mode.as_str())
        .bind(&group.origin)
        .bind(&group.destination)
        .bind(group.departure_time_utc)
        .bind(group.departure_time_local)
        .bind(group.arrival_time_utc)
        .bind(group.arrival_time_local)
        .bind(group.sales_start)
        .bind(group.sales_end)
        .bind(group.status.as_str())
        .bind(group.created_by)
        .bind(group.created_at)
        .bind(group.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        info!(
            "Flight group created: {}{} {}-{} ({})",
            group.carrier_code, group.flight_number, group.origin, group.destination, group.id
        );
        Ok(FlightGroup::try_from(row)?)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<FlightGroup>> {
        let row: Option<FlightGroupRow> = sqlx::query_as(&format!(
            "SELECT {} FROM flight_groups WHERE id = $1",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(FlightGroup::try_from).transpose()?)
    }

    async fn list(&self, agency_id: Option<Uuid>) -> CoreResult<Vec<FlightGroup>> {
        let rows: Vec<FlightGroupRow> = sqlx::query_as(&format!(
            "SELECT {} FROM flight_groups WHERE ($1::uuid IS NULL OR agency_id = $1) \
             ORDER BY departure_time_utc",
            GROUP_COLUMNS
        ))
        .bind(agency_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        Ok(self.delete_in_tx(id).await?)
    }

    async fn list_buckets(&self, group_id: Uuid) -> CoreResult<Vec<SeatBucket>> {
        let rows: Vec<SeatBucketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM group_seat_buckets WHERE flight_group_id = $1 ORDER BY pax_type",
            BUCKET_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn upsert_bucket(
        &self,
        group_id: Uuid,
        pax_type: PaxType,
        spec: &BucketSpec,
        single_currency: bool,
    ) -> CoreResult<SeatBucket> {
        Ok(self.upsert_in_tx(group_id, pax_type, spec, single_currency).await?)
    }

    async fn transition_status(
        &self,
        group_id: Uuid,
        target: FlightGroupStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<StatusChange> {
        Ok(self.transition_in_tx(group_id, target, now).await?)
    }
}
