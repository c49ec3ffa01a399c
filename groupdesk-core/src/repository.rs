use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupdesk_shared::{Job, QueueName};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    Agency, AgencyStatus, BucketSpec, CoreResult, FlightGroup, FlightGroupStatus, HoldRequest,
    HoldResolution, PaxType, SeatBucket, SeatHold, User,
};

/// Repository trait for agency data access
#[async_trait]
pub trait AgencyRepository: Send + Sync {
    /// Fails with `Conflict` on a duplicate code and `NotFound` on an unknown parent.
    async fn create(&self, agency: &Agency) -> CoreResult<Agency>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Agency>>;

    async fn get_by_code(&self, code: &str) -> CoreResult<Option<Agency>>;

    async fn list(&self) -> CoreResult<Vec<Agency>>;

    async fn list_children(&self, id: Uuid) -> CoreResult<Vec<Agency>>;

    async fn update_status(&self, id: Uuid, status: AgencyStatus) -> CoreResult<Agency>;

    /// Re-parents `id`. Rejects parents that would make it its own ancestor.
    async fn set_parent(&self, id: Uuid, parent_agency_id: Option<Uuid>) -> CoreResult<Agency>;

    /// Deletes the agency with its users and groups; children are detached.
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
}

/// Repository trait for user data access
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the username is taken within the agency.
    async fn create(&self, user: &User) -> CoreResult<User>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn find_by_username(&self, agency_id: Uuid, username: &str) -> CoreResult<Option<User>>;

    async fn list(&self, agency_id: Uuid) -> CoreResult<Vec<User>>;

    async fn set_active(&self, id: Uuid, is_active: bool) -> CoreResult<User>;

    /// Fails with `Conflict` while flight groups still reference the user.
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
}

/// Result of a status transition.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub group: FlightGroup,
    /// Holds released by a cancellation; zero for every other transition.
    pub released_holds: u64,
}

/// Repository trait for flight groups and their seat buckets
#[async_trait]
pub trait FlightGroupRepository: Send + Sync {
    async fn create(&self, group: &FlightGroup) -> CoreResult<FlightGroup>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<FlightGroup>>;

    /// All groups, or only those of `agency_id`.
    async fn list(&self, agency_id: Option<Uuid>) -> CoreResult<Vec<FlightGroup>>;

    /// Only DRAFT groups can be deleted; buckets and holds go with them.
    async fn delete(&self, id: Uuid) -> CoreResult<()>;

    async fn list_buckets(&self, group_id: Uuid) -> CoreResult<Vec<SeatBucket>>;

    /// Creates or edits the (group, pax type) bucket under the group lock.
    /// With `single_currency` every bucket of the group must share a currency.
    async fn upsert_bucket(
        &self,
        group_id: Uuid,
        pax_type: PaxType,
        spec: &BucketSpec,
        single_currency: bool,
    ) -> CoreResult<SeatBucket>;

    /// Validates and applies a lifecycle transition. Cancelling releases every
    /// HELD hold of the group in the same unit of work.
    async fn transition_status(
        &self,
        group_id: Uuid,
        target: FlightGroupStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<StatusChange>;
}

/// Seat counters and holds. Every method is one atomic read-modify-write.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Re-checks the sales gate, expires stale holds of the bucket and then
    /// reserves. Fails with `CapacityExceeded` when seats run out.
    async fn reserve(&self, request: &HoldRequest) -> CoreResult<SeatHold>;

    /// HELD -> CONFIRMED, moving seats from on-hold to issued.
    async fn confirm(&self, hold_id: Uuid, now: DateTime<Utc>) -> CoreResult<HoldResolution>;

    /// HELD -> RELEASED. A no-op for holds that are already resolved.
    async fn release(&self, hold_id: Uuid, now: DateTime<Utc>) -> CoreResult<HoldResolution>;

    /// Marks every HELD hold with `expires_at <= now` EXPIRED and returns the count.
    async fn expire_stale_holds(&self, now: DateTime<Utc>) -> CoreResult<u64>;

    async fn get_hold(&self, hold_id: Uuid) -> CoreResult<Option<SeatHold>>;

    async fn get_bucket(&self, group_id: Uuid, pax_type: PaxType) -> CoreResult<Option<SeatBucket>>;
}

/// Placeholder job transport (email, PNR sync).
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &Job) -> CoreResult<()>;

    async fn dequeue(&self, queue: QueueName) -> CoreResult<Option<Job>>;
}
