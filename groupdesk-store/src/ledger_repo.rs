//! Postgres seat ledger.
//!
//! Lock order is always flight group row, then bucket row, then hold rows.
//! Bucket rows are taken `FOR UPDATE`; every transaction bounds its waits
//! with `lock_timeout` so contention surfaces as `LockTimeout`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupdesk_core::lifecycle::ensure_on_sale;
use groupdesk_core::{
    CoreError, CoreResult, FlightGroup, HoldRequest, HoldResolution, HoldStatus, InventoryLedger,
    PaxType, SeatBucket, SeatHold,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::set_lock_timeout;
use crate::error::{StoreError, StoreResult};
use crate::rows::{
    FlightGroupRow, SeatBucketRow, SeatHoldRow, BUCKET_COLUMNS, GROUP_COLUMNS, HOLD_COLUMNS,
};

pub struct StoreInventoryLedger {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl StoreInventoryLedger {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self { pool, lock_timeout_ms }
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;
        Ok(tx)
    }

    async fn reserve_in_tx(&self, request: &HoldRequest) -> StoreResult<SeatHold> {
        request.validate()?;
        let mut tx = self.begin().await?;

        // FOR SHARE: a concurrent status change waits for in-flight holds.
        let group = lock_group(&mut tx, request.flight_group_id, "FOR SHARE").await?;
        ensure_on_sale(&group, request.now)?;

        let mut bucket = lock_bucket_by_pax(&mut tx, request.flight_group_id, request.pax_type)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "{} bucket of flight group {}",
                    request.pax_type, request.flight_group_id
                ))
            })?;

        let expired = resolve_held(&mut tx, &mut bucket, HoldStatus::Expired, request.now, true).await?;
        if expired > 0 {
            debug!("Expired {} stale holds on bucket {} before reserving", expired, bucket.id);
        }

        bucket.reserve(request.quantity)?;
        save_counters(&mut tx, &bucket).await?;

        let hold = SeatHold::open(bucket.id, request)?;
        sqlx::query(
            "INSERT INTO group_seat_holds \
             (id, bucket_id, flight_group_id, agency_id, pax_type, quantity, status, created_by, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(hold.id)
        .bind(hold.bucket_id)
        .bind(hold.flight_group_id)
        .bind(hold.agency_id)
        .bind(hold.pax_type.as_str())
        .bind(hold.quantity)
        .bind(hold.status.as_str())
        .bind(hold.created_by)
        .bind(hold.expires_at)
        .bind(hold.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            "Hold {} placed: {} x {} on group {} (on_hold={}, issued={}, total={})",
            hold.id, hold.quantity, hold.pax_type, hold.flight_group_id,
            bucket.seats_on_hold, bucket.seats_issued, bucket.total_seats
        );
        Ok(hold)
    }

    /// Loads the hold and its bucket under lock, bucket first.
    async fn lock_hold(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        hold_id: Uuid,
    ) -> StoreResult<(SeatHold, SeatBucket)> {
        let bucket_id: Option<Uuid> =
            sqlx::query_scalar("SELECT bucket_id FROM group_seat_holds WHERE id = $1")
                .bind(hold_id)
                .fetch_optional(&mut **tx)
                .await?;
        let bucket_id = bucket_id.ok_or(CoreError::HoldNotFound(hold_id))?;

        let bucket = lock_bucket(tx, bucket_id).await?;
        let row: Option<SeatHoldRow> = sqlx::query_as(&format!(
            "SELECT {} FROM group_seat_holds WHERE id = $1 FOR UPDATE",
            HOLD_COLUMNS
        ))
        .bind(hold_id)
        .fetch_optional(&mut **tx)
        .await?;
        let hold = row
            .map(SeatHold::try_from)
            .transpose()?
            .ok_or(CoreError::HoldNotFound(hold_id))?;
        Ok((hold, bucket))
    }

    async fn confirm_in_tx(&self, hold_id: Uuid, now: DateTime<Utc>) -> StoreResult<HoldResolution> {
        let mut tx = self.begin().await?;
        let (mut hold, mut bucket) = self.lock_hold(&mut tx, hold_id).await?;

        match hold.status {
            HoldStatus::Confirmed => return Ok(HoldResolution { hold, changed: false }),
            HoldStatus::Released | HoldStatus::Expired => {
                return Err(CoreError::HoldNotFound(hold_id).into())
            }
            HoldStatus::Held => {}
        }

        if hold.is_stale(now) {
            // Past its expiry: give the seats back now, then report it gone.
            bucket.release_held(hold.quantity)?;
            save_counters(&mut tx, &bucket).await?;
            hold.resolve(HoldStatus::Expired, now);
            save_hold_status(&mut tx, &hold).await?;
            tx.commit().await?;
            warn!("Hold {} expired before confirmation", hold_id);
            return Err(CoreError::HoldNotFound(hold_id).into());
        }

        bucket.issue_held(hold.quantity)?;
        save_counters(&mut tx, &bucket).await?;
        hold.resolve(HoldStatus::Confirmed, now);
        save_hold_status(&mut tx, &hold).await?;
        tx.commit().await?;

        info!("Hold {} confirmed: {} seats issued on bucket {}", hold_id, hold.quantity, bucket.id);
        Ok(HoldResolution { hold, changed: true })
    }

    async fn release_in_tx(&self, hold_id: Uuid, now: DateTime<Utc>) -> StoreResult<HoldResolution> {
        let mut tx = self.begin().await?;
        let (mut hold, mut bucket) = self.lock_hold(&mut tx, hold_id).await?;

        if hold.status != HoldStatus::Held {
            return Ok(HoldResolution { hold, changed: false });
        }

        bucket.release_held(hold.quantity)?;
        save_counters(&mut tx, &bucket).await?;
        hold.resolve(HoldStatus::Released, now);
        save_hold_status(&mut tx, &hold).await?;
        tx.commit().await?;

        info!("Hold {} released: {} seats back on bucket {}", hold_id, hold.quantity, bucket.id);
        Ok(HoldResolution { hold, changed: true })
    }

    async fn expire_in_tx(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let bucket_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT bucket_id FROM group_seat_holds WHERE status = 'HELD' AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut expired = 0;
        for bucket_id in bucket_ids {
            let mut tx = self.begin().await?;
            let mut bucket = lock_bucket(&mut tx, bucket_id).await?;
            expired += resolve_held(&mut tx, &mut bucket, HoldStatus::Expired, now, true).await?;
            tx.commit().await?;
        }
        Ok(expired)
    }
}

pub(crate) async fn lock_group(
    tx: &mut Transaction<'_, Postgres>,
    group_id: Uuid,
    mode: &str,
) -> StoreResult<FlightGroup> {
    let row: Option<FlightGroupRow> = sqlx::query_as(&format!(
        "SELECT {} FROM flight_groups WHERE id = $1 {}",
        GROUP_COLUMNS, mode
    ))
    .bind(group_id)
    .fetch_optional(&mut **tx)
    .await?;
    match row {
        Some(row) => Ok(FlightGroup::try_from(row)?),
        None => Err(CoreError::NotFound(format!("flight group {}", group_id)).into()),
    }
}

pub(crate) async fn lock_bucket(tx: &mut Transaction<'_, Postgres>, bucket_id: Uuid) -> StoreResult<SeatBucket> {
    let row: SeatBucketRow = sqlx::query_as(&format!(
        "SELECT {} FROM group_seat_buckets WHERE id = $1 FOR UPDATE",
        BUCKET_COLUMNS
    ))
    .bind(bucket_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(SeatBucket::try_from(row)?)
}

pub(crate) async fn lock_bucket_by_pax(
    tx: &mut Transaction<'_, Postgres>,
    group_id: Uuid,
    pax_type: PaxType,
) -> StoreResult<Option<SeatBucket>> {
    let row: Option<SeatBucketRow> = sqlx::query_as(&format!(
        "SELECT {} FROM group_seat_buckets WHERE flight_group_id = $1 AND pax_type = $2 FOR UPDATE",
        BUCKET_COLUMNS
    ))
    .bind(group_id)
    .bind(pax_type.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(SeatBucket::try_from).transpose()?)
}

/// Writes counters, version and pricing back. The bucket row must be locked.
pub(crate) async fn save_counters(tx: &mut Transaction<'_, Postgres>, bucket: &SeatBucket) -> StoreResult<()> {
    bucket.check_invariant()?;
    sqlx::query(
        "UPDATE group_seat_buckets SET total_seats = $2, seats_on_hold = $3, seats_issued = $4, \
         base_fare = $5, tax_amount = $6, fee_amount = $7, currency = $8, version = $9, updated_at = $10 \
         WHERE id = $1",
    )
    .bind(bucket.id)
    .bind(bucket.total_seats)
    .bind(bucket.seats_on_hold)
    .bind(bucket.seats_issued)
    .bind(bucket.base_fare)
    .bind(bucket.tax_amount)
    .bind(bucket.fee_amount)
    .bind(&bucket.currency)
    .bind(bucket.version)
    .bind(bucket.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn save_hold_status(tx: &mut Transaction<'_, Postgres>, hold: &SeatHold) -> StoreResult<()> {
    sqlx::query("UPDATE group_seat_holds SET status = $2, resolved_at = $3 WHERE id = $1")
        .bind(hold.id)
        .bind(hold.status.as_str())
        .bind(hold.resolved_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Resolves HELD holds of a locked bucket to `status` and returns their seats
/// to the pool. With `stale_only`, only holds past `expires_at` are touched.
pub(crate) async fn resolve_held(
    tx: &mut Transaction<'_, Postgres>,
    bucket: &mut SeatBucket,
    status: HoldStatus,
    now: DateTime<Utc>,
    stale_only: bool,
) -> StoreResult<u64> {
    let quantities: Vec<i32> = sqlx::query_scalar(
        "UPDATE group_seat_holds SET status = $2, resolved_at = $3 \
         WHERE bucket_id = $1 AND status = 'HELD' AND (NOT $4 OR expires_at <= $3) \
         RETURNING quantity",
    )
    .bind(bucket.id)
    .bind(status.as_str())
    .bind(now)
    .bind(stale_only)
    .fetch_all(&mut **tx)
    .await?;

    let seats: i32 = quantities.iter().sum();
    if seats > 0 {
        bucket.release_held(seats)?;
        save_counters(tx, bucket).await?;
    }
    Ok(quantities.len() as u64)
}

#[async_trait]
impl InventoryLedger for StoreInventoryLedger {
    async fn reserve(&self, request: &HoldRequest) -> CoreResult<SeatHold> {
        Ok(self.reserve_in_tx(request).await?)
    }

    async fn confirm(&self, hold_id: Uuid, now: DateTime<Utc>) -> CoreResult<HoldResolution> {
        Ok(self.confirm_in_tx(hold_id, now).await?)
    }

    async fn release(&self, hold_id: Uuid, now: DateTime<Utc>) -> CoreResult<HoldResolution> {
        Ok(self.release_in_tx(hold_id, now).await?)
    }

    async fn expire_stale_holds(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let expired = self.expire_in_tx(now).await?;
        if expired > 0 {
            info!("Expired {} stale holds", expired);
        }
        Ok(expired)
    }

    async fn get_hold(&self, hold_id: Uuid) -> CoreResult<Option<SeatHold>> {
        let row: Option<SeatHoldRow> = sqlx::query_as(&format!(
            "SELECT {} FROM group_seat_holds WHERE id = $1",
            HOLD_COLUMNS
        ))
        .bind(hold_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(SeatHold::try_from).transpose()?)
    }

    async fn get_bucket(&self, group_id: Uuid, pax_type: PaxType) -> CoreResult<Option<SeatBucket>> {
        let row: Option<SeatBucketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM group_seat_buckets WHERE flight_group_id = $1 AND pax_type = $2",
            BUCKET_COLUMNS
        ))
        .bind(group_id)
        .bind(pax_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(SeatBucket::try_from).transpose()?)
    }
}
