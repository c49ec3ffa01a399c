//! Inventory orchestration in front of the ledger.
//!
//! Every entry point takes a pre-validated [`Identity`], checks its capability
//! and agency scope, then delegates the atomic work to the ledger or group
//! repository. Lock contention is retried once after `retry_backoff`.

use chrono::{DateTime, Duration, Utc};
use groupdesk_core::lifecycle::ensure_on_sale;
use groupdesk_core::{
    BucketSpec, Capability, CoreError, CoreResult, FlightGroup, FlightGroupRepository,
    FlightGroupStatus, HoldRequest, HoldResolution, Identity, InventoryLedger, JobQueue, PaxType,
    SeatBucket, SeatHold, StatusChange,
};
use groupdesk_shared::Job;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pricing::{self, FareQuote};

#[derive(Debug, Clone)]
pub struct InventoryPolicy {
    pub hold_ttl: Duration,
    pub retry_backoff: std::time::Duration,
    pub enforce_single_currency: bool,
}

impl Default for InventoryPolicy {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::seconds(900),
            retry_backoff: std::time::Duration::from_millis(50),
            enforce_single_currency: true,
        }
    }
}

#[derive(Clone)]
pub struct InventoryService {
    groups: Arc<dyn FlightGroupRepository>,
    ledger: Arc<dyn InventoryLedger>,
    jobs: Arc<dyn JobQueue>,
    policy: InventoryPolicy,
}

impl InventoryService {
    pub fn new(
        groups: Arc<dyn FlightGroupRepository>,
        ledger: Arc<dyn InventoryLedger>,
        jobs: Arc<dyn JobQueue>,
        policy: InventoryPolicy,
    ) -> Self {
        Self { groups, ledger, jobs, policy }
    }

    pub fn policy(&self) -> &InventoryPolicy {
        &self.policy
    }

    // ========================================================================
    // Holds
    // ========================================================================

    pub async fn hold_seats(
        &self,
        identity: &Identity,
        group_id: Uuid,
        pax_type: PaxType,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> CoreResult<SeatHold> {
        identity.authorize(Capability::HoldSeats)?;
        let group = self.scoped_group(identity, group_id).await?;
        // Re-checked by the ledger under the group lock.
        ensure_on_sale(&group, now)?;

        let request = HoldRequest {
            flight_group_id: group.id,
            pax_type,
            quantity,
            agency_id: group.agency_id,
            requested_by: identity.user_id,
            ttl: self.policy.hold_ttl,
            now,
        };
        request.validate()?;

        let hold = self.with_retry("reserve", || self.ledger.reserve(&request)).await?;
        info!(
            "User {} holds {} x {} on group {} until {}",
            identity.user_id, hold.quantity, hold.pax_type, group.id, hold.expires_at
        );
        Ok(hold)
    }

    pub async fn confirm_hold(
        &self,
        identity: &Identity,
        hold_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<HoldResolution> {
        identity.authorize(Capability::ConfirmHolds)?;
        self.scoped_hold(identity, hold_id).await?;

        let resolution = self.with_retry("confirm", || self.ledger.confirm(hold_id, now)).await?;
        if resolution.changed {
            let hold = &resolution.hold;
            self.emit(Job::pnr_sync(hold.flight_group_id, hold.id, hold.pax_type.as_str(), hold.quantity))
                .await;
        }
        Ok(resolution)
    }

    pub async fn release_hold(
        &self,
        identity: &Identity,
        hold_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<HoldResolution> {
        identity.authorize(Capability::ReleaseHolds)?;
        self.scoped_hold(identity, hold_id).await?;
        self.with_retry("release", || self.ledger.release(hold_id, now)).await
    }

    pub async fn get_hold(&self, identity: &Identity, hold_id: Uuid) -> CoreResult<SeatHold> {
        identity.authorize(Capability::ViewFlightGroups)?;
        self.scoped_hold(identity, hold_id).await
    }

    /// On-demand sweep for administrators.
    pub async fn expire_stale_holds(&self, identity: &Identity, now: DateTime<Utc>) -> CoreResult<u64> {
        identity.authorize(Capability::ExpireHolds)?;
        self.sweep_expired(now).await
    }

    /// Periodic sweep run by the background worker.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        self.with_retry("expire", || self.ledger.expire_stale_holds(now)).await
    }

    // ========================================================================
    // Buckets and lifecycle
    // ========================================================================

    pub async fn list_buckets(&self, identity: &Identity, group_id: Uuid) -> CoreResult<Vec<SeatBucket>> {
        identity.authorize(Capability::ViewFlightGroups)?;
        self.scoped_group(identity, group_id).await?;
        self.groups.list_buckets(group_id).await
    }

    pub async fn upsert_bucket(
        &self,
        identity: &Identity,
        group_id: Uuid,
        pax_type: PaxType,
        spec: &BucketSpec,
    ) -> CoreResult<SeatBucket> {
        identity.authorize(Capability::ManageFlightGroups)?;
        self.scoped_group(identity, group_id).await?;
        spec.validate()?;
        let single_currency = self.policy.enforce_single_currency;
        self.with_retry("upsert bucket", || {
            self.groups.upsert_bucket(group_id, pax_type, spec, single_currency)
        })
        .await
    }

    pub async fn quote(
        &self,
        identity: &Identity,
        group_id: Uuid,
        pax_type: PaxType,
        quantity: i32,
    ) -> CoreResult<FareQuote> {
        identity.authorize(Capability::ViewFlightGroups)?;
        self.scoped_group(identity, group_id).await?;
        let bucket = self
            .ledger
            .get_bucket(group_id, pax_type)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{} bucket of flight group {}", pax_type, group_id)))?;
        pricing::quote(&bucket, quantity)
    }

    pub async fn transition_group(
        &self,
        identity: &Identity,
        group_id: Uuid,
        target: FlightGroupStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<StatusChange> {
        identity.authorize(Capability::ManageFlightGroups)?;
        self.scoped_group(identity, group_id).await?;

        let change = self
            .with_retry("transition", || self.groups.transition_status(group_id, target, now))
            .await?;

        let group = &change.group;
        match target {
            FlightGroupStatus::Published => {
                self.emit(Job::email(
                    group.agency_id,
                    "group_published",
                    &format!("{}{} is on sale", group.carrier_code, group.flight_number),
                    json!({ "flight_group_id": group.id, "sales_end": group.sales_end }),
                ))
                .await;
            }
            FlightGroupStatus::Cancelled => {
                self.emit(Job::email(
                    group.agency_id,
                    "group_cancelled",
                    &format!("{}{} was cancelled", group.carrier_code, group.flight_number),
                    json!({ "flight_group_id": group.id, "released_holds": change.released_holds }),
                ))
                .await;
            }
            _ => {}
        }
        Ok(change)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn scoped_group(&self, identity: &Identity, group_id: Uuid) -> CoreResult<FlightGroup> {
        let group = self
            .groups
            .get(group_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("flight group {}", group_id)))?;
        identity.ensure_agency(group.agency_id)?;
        Ok(group)
    }

    async fn scoped_hold(&self, identity: &Identity, hold_id: Uuid) -> CoreResult<SeatHold> {
        let hold = self
            .ledger
            .get_hold(hold_id)
            .await?
            .ok_or(CoreError::HoldNotFound(hold_id))?;
        identity.ensure_agency(hold.agency_id)?;
        Ok(hold)
    }

    /// Runs `op`, retrying once on contention. A second contended attempt
    /// surfaces as `LockTimeout`.
    async fn with_retry<T, F, Fut>(&self, name: &str, mut op: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        match op().await {
            Err(err) if err.is_retryable() => {
                warn!("{} contended ({}), retrying in {:?}", name, err, self.policy.retry_backoff);
                tokio::time::sleep(self.policy.retry_backoff).await;
                op().await.map_err(|err| {
                    if err.is_retryable() {
                        CoreError::LockTimeout
                    } else {
                        err
                    }
                })
            }
            other => other,
        }
    }

    /// Job delivery is best effort; the inventory change is already committed.
    async fn emit(&self, job: Job) {
        if let Err(err) = self.jobs.enqueue(&job).await {
            warn!("Failed to enqueue {:?} job {}: {}", job.queue(), job.id(), err);
        }
    }
}
