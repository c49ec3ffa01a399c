//! In-process store implementing every repository trait.
//!
//! One `tokio::sync::Mutex` guards all state, so each call is a serializable
//! unit of work. Waiting for the mutex is bounded by `lock_timeout` and
//! surfaces as `LockTimeout`, mirroring `lock_timeout` in Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupdesk_core::agency::{ensure_acyclic, MAX_AGENCY_DEPTH};
use groupdesk_core::lifecycle::{ensure_deletable, ensure_editable, ensure_on_sale, validate_transition};
use groupdesk_core::seat_bucket::ensure_currency_matches;
use groupdesk_core::{
    Agency, AgencyRepository, AgencyStatus, BucketSpec, CoreError, CoreResult, FlightGroup,
    FlightGroupRepository, FlightGroupStatus, HoldRequest, HoldResolution, HoldStatus,
    InventoryLedger, JobQueue, PaxType, SeatBucket, SeatHold, StatusChange, User, UserRepository,
};
use groupdesk_shared::{Job, QueueName};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Default)]
struct MemoryState {
    agencies: HashMap<Uuid, Agency>,
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, FlightGroup>,
    buckets: HashMap<Uuid, SeatBucket>,
    holds: HashMap<Uuid, SeatHold>,
}

impl MemoryState {
    fn group(&self, id: Uuid) -> CoreResult<&FlightGroup> {
        self.groups
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("flight group {}", id)))
    }

    fn bucket(&self, id: Uuid) -> CoreResult<SeatBucket> {
        self.buckets
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::InternalError(format!("bucket {} vanished", id)))
    }

    fn bucket_id(&self, group_id: Uuid, pax_type: PaxType) -> Option<Uuid> {
        self.buckets
            .values()
            .find(|b| b.flight_group_id == group_id && b.pax_type == pax_type)
            .map(|b| b.id)
    }

    fn group_buckets(&self, group_id: Uuid) -> Vec<SeatBucket> {
        let mut buckets: Vec<SeatBucket> = self
            .buckets
            .values()
            .filter(|b| b.flight_group_id == group_id)
            .cloned()
            .collect();
        buckets.sort_by_key(|b| b.pax_type);
        buckets
    }

    /// Resolves HELD holds of one bucket and returns their seats. Nothing is
    /// written unless the bucket arithmetic succeeds.
    fn resolve_held(
        &mut self,
        bucket_id: Uuid,
        status: HoldStatus,
        now: DateTime<Utc>,
        stale_only: bool,
    ) -> CoreResult<u64> {
        let hold_ids = self.held_on(bucket_id, now, stale_only);
        if hold_ids.is_empty() {
            return Ok(0);
        }

        let mut bucket = self.bucket(bucket_id)?;
        bucket.release_held(self.seats_in(&hold_ids))?;
        bucket.check_invariant()?;

        self.buckets.insert(bucket_id, bucket);
        self.mark(&hold_ids, status, now);
        Ok(hold_ids.len() as u64)
    }

    fn held_on(&self, bucket_id: Uuid, now: DateTime<Utc>, stale_only: bool) -> Vec<Uuid> {
        self.holds
            .values()
            .filter(|h| h.bucket_id == bucket_id)
            .filter(|h| if stale_only { h.is_stale(now) } else { h.status == HoldStatus::Held })
            .map(|h| h.id)
            .collect()
    }

    fn seats_in(&self, hold_ids: &[Uuid]) -> i32 {
        hold_ids.iter().filter_map(|id| self.holds.get(id)).map(|h| h.quantity).sum()
    }

    fn mark(&mut self, hold_ids: &[Uuid], status: HoldStatus, now: DateTime<Utc>) {
        for id in hold_ids {
            if let Some(hold) = self.holds.get_mut(id) {
                hold.resolve(status, now);
            }
        }
    }

    fn remove_group(&mut self, group_id: Uuid) {
        self.groups.remove(&group_id);
        self.buckets.retain(|_, b| b.flight_group_id != group_id);
        self.holds.retain(|_, h| h.flight_group_id != group_id);
    }
}

pub struct MemoryStore {
    state: Mutex<MemoryState>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            lock_timeout,
        }
    }

    async fn lock(&self) -> CoreResult<MutexGuard<'_, MemoryState>> {
        tokio::time::timeout(self.lock_timeout, self.state.lock())
            .await
            .map_err(|_| CoreError::LockTimeout)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

// ============================================================================
// Agencies
// ============================================================================

#[async_trait]
impl AgencyRepository for MemoryStore {
    async fn create(&self, agency: &Agency) -> CoreResult<Agency> {
        let mut state = self.lock().await?;
        if state.agencies.values().any(|a| a.code == agency.code) {
            return Err(CoreError::Conflict(format!("agency code {} already exists", agency.code)));
        }
        if let Some(parent) = agency.parent_agency_id {
            if !state.agencies.contains_key(&parent) {
                return Err(CoreError::NotFound(format!("agency {}", parent)));
            }
        }
        state.agencies.insert(agency.id, agency.clone());
        info!("Agency created: {} ({})", agency.code, agency.id);
        Ok(agency.clone())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Agency>> {
        Ok(self.lock().await?.agencies.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> CoreResult<Option<Agency>> {
        let state = self.lock().await?;
        Ok(state.agencies.values().find(|a| a.code == code).cloned())
    }

    async fn list(&self) -> CoreResult<Vec<Agency>> {
        let state = self.lock().await?;
        let mut agencies: Vec<Agency> = state.agencies.values().cloned().collect();
        agencies.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(agencies)
    }

    async fn list_children(&self, id: Uuid) -> CoreResult<Vec<Agency>> {
        let state = self.lock().await?;
        let mut children: Vec<Agency> = state
            .agencies
            .values()
            .filter(|a| a.parent_agency_id == Some(id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(children)
    }

    async fn update_status(&self, id: Uuid, status: AgencyStatus) -> CoreResult<Agency> {
        let mut state = self.lock().await?;
        let agency = state
            .agencies
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("agency {}", id)))?;
        agency.status = status;
        agency.updated_at = Utc::now();
        Ok(agency.clone())
    }

    async fn set_parent(&self, id: Uuid, parent_agency_id: Option<Uuid>) -> CoreResult<Agency> {
        let mut state = self.lock().await?;
        if !state.agencies.contains_key(&id) {
            return Err(CoreError::NotFound(format!("agency {}", id)));
        }

        if let Some(parent) = parent_agency_id {
            let mut ancestry = Vec::new();
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                let agency = state
                    .agencies
                    .get(&current)
                    .ok_or_else(|| CoreError::NotFound(format!("agency {}", current)))?;
                ancestry.push(current);
                if ancestry.len() > MAX_AGENCY_DEPTH || current == id {
                    break;
                }
                cursor = agency.parent_agency_id;
            }
            ensure_acyclic(id, &ancestry)?;
        }

        let agency = state
            .agencies
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("agency {}", id)))?;
        agency.parent_agency_id = parent_agency_id;
        agency.updated_at = Utc::now();
        Ok(agency.clone())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut state = self.lock().await?;
        if !state.agencies.contains_key(&id) {
            return Err(CoreError::NotFound(format!("agency {}", id)));
        }

        // Users of this agency who created groups of another agency block the delete.
        let referenced = state.groups.values().any(|g| {
            g.agency_id != id
                && state
                    .users
                    .get(&g.created_by)
                    .map_or(false, |u| u.agency_id == id)
        });
        if referenced {
            return Err(CoreError::Conflict(format!(
                "users of agency {} created flight groups of other agencies",
                id
            )));
        }

        let group_ids: Vec<Uuid> = state
            .groups
            .values()
            .filter(|g| g.agency_id == id)
            .map(|g| g.id)
            .collect();
        for group_id in group_ids {
            state.remove_group(group_id);
        }
        state.users.retain(|_, u| u.agency_id != id);
        for child in state.agencies.values_mut() {
            if child.parent_agency_id == Some(id) {
                child.parent_agency_id = None;
            }
        }
        state.agencies.remove(&id);
        info!("Agency deleted: {}", id);
        Ok(())
    }
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: &User) -> CoreResult<User> {
        let mut state = self.lock().await?;
        if !state.agencies.contains_key(&user.agency_id) {
            return Err(CoreError::NotFound(format!("agency {}", user.agency_id)));
        }
        let taken = state
            .users
            .values()
            .any(|u| u.agency_id == user.agency_id && u.username == user.username);
        if taken {
            return Err(CoreError::Conflict(format!("username {} already exists", user.username)));
        }
        state.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.lock().await?.users.get(&id).cloned())
    }

    async fn find_by_username(&self, agency_id: Uuid, username: &str) -> CoreResult<Option<User>> {
        let username = username.to_lowercase();
        let state = self.lock().await?;
        Ok(state
            .users
            .values()
            .find(|u| u.agency_id == agency_id && u.username == username)
            .cloned())
    }

    async fn list(&self, agency_id: Uuid) -> CoreResult<Vec<User>> {
        let state = self.lock().await?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.agency_id == agency_id)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> CoreResult<User> {
        let mut state = self.lock().await?;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("user {}", id)))?;
        user.is_active = is_active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut state = self.lock().await?;
        if !state.users.contains_key(&id) {
            return Err(CoreError::NotFound(format!("user {}", id)));
        }
        if state.groups.values().any(|g| g.created_by == id) {
            return Err(CoreError::Conflict(format!("user {} still owns flight groups", id)));
        }
        state.users.remove(&id);
        Ok(())
    }
}

// ============================================================================
// Flight groups and buckets
// ============================================================================

#[async_trait]
impl FlightGroupRepository for MemoryStore {
    async fn create(&self, group: &FlightGroup) -> CoreResult<FlightGroup> {
        let mut state = self.lock().await?;
        if !state.agencies.contains_key(&group.agency_id) {
            return Err(CoreError::NotFound(format!("agency {}", group.agency_id)));
        }
        if !state.users.contains_key(&group.created_by) {
            return Err(CoreError::NotFound(format!("user {}", group.created_by)));
        }
        state.groups.insert(group.id, group.clone());
        Ok(group.clone())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<FlightGroup>> {
        Ok(self.lock().await?.groups.get(&id).cloned())
    }

    async fn list(&self, agency_id: Option<Uuid>) -> CoreResult<Vec<FlightGroup>> {
        let state = self.lock().await?;
        let mut groups: Vec<FlightGroup> = state
            .groups
            .values()
            .filter(|g| agency_id.map_or(true, |a| g.agency_id == a))
            .cloned()
            .collect();
        groups.sort_by_key(|g| g.departure_time_utc);
        Ok(groups)
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut state = self.lock().await?;
        ensure_deletable(state.group(id)?)?;
        state.remove_group(id);
        Ok(())
    }

    async fn list_buckets(&self, group_id: Uuid) -> CoreResult<Vec<SeatBucket>> {
        Ok(self.lock().await?.group_buckets(group_id))
    }

    async fn upsert_bucket(
        &self,
        group_id: Uuid,
        pax_type: PaxType,
        spec: &BucketSpec,
        single_currency: bool,
    ) -> CoreResult<SeatBucket> {
        spec.validate()?;
        let mut state = self.lock().await?;
        ensure_editable(state.group(group_id)?)?;

        if single_currency {
            ensure_currency_matches(&state.group_buckets(group_id), pax_type, &spec.currency)?;
        }

        let bucket = match state.bucket_id(group_id, pax_type) {
            Some(id) => {
                let mut bucket = state.bucket(id)?;
                bucket.apply_spec(spec)?;
                bucket
            }
            None => SeatBucket::new(group_id, pax_type, spec)?,
        };
        state.buckets.insert(bucket.id, bucket.clone());
        Ok(bucket)
    }

    async fn transition_status(
        &self,
        group_id: Uuid,
        target: FlightGroupStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<StatusChange> {
        let mut state = self.lock().await?;
        let buckets = state.group_buckets(group_id);
        validate_transition(state.group(group_id)?, &buckets, target)?;

        let mut released_holds = 0;
        if target == FlightGroupStatus::Cancelled {
            for bucket in &buckets {
                released_holds += state.resolve_held(bucket.id, HoldStatus::Released, now, false)?;
            }
        }

        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| CoreError::NotFound(format!("flight group {}", group_id)))?;
        let from = group.status;
        group.status = target;
        group.updated_at = now;
        info!(
            "Flight group {} moved {} -> {} ({} holds released)",
            group_id, from, target, released_holds
        );
        Ok(StatusChange { group: group.clone(), released_holds })
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn reserve(&self, request: &HoldRequest) -> CoreResult<SeatHold> {
        request.validate()?;
        let mut state = self.lock().await?;
        ensure_on_sale(state.group(request.flight_group_id)?, request.now)?;

        let bucket_id = state
            .bucket_id(request.flight_group_id, request.pax_type)
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "{} bucket of flight group {}",
                    request.pax_type, request.flight_group_id
                ))
            })?;

        // Stale holds expire only if the reserve succeeds.
        let stale = state.held_on(bucket_id, request.now, true);
        let mut bucket = state.bucket(bucket_id)?;
        if !stale.is_empty() {
            bucket.release_held(state.seats_in(&stale))?;
        }
        bucket.reserve(request.quantity)?;
        bucket.check_invariant()?;
        let hold = SeatHold::open(bucket_id, request)?;

        if !stale.is_empty() {
            state.mark(&stale, HoldStatus::Expired, request.now);
            debug!("Expired {} stale holds on bucket {} before reserving", stale.len(), bucket_id);
        }
        state.buckets.insert(bucket_id, bucket);
        state.holds.insert(hold.id, hold.clone());
        Ok(hold)
    }

    async fn confirm(&self, hold_id: Uuid, now: DateTime<Utc>) -> CoreResult<HoldResolution> {
        let mut state = self.lock().await?;
        let mut hold = state
            .holds
            .get(&hold_id)
            .cloned()
            .ok_or(CoreError::HoldNotFound(hold_id))?;

        match hold.status {
            HoldStatus::Confirmed => return Ok(HoldResolution { hold, changed: false }),
            HoldStatus::Released | HoldStatus::Expired => return Err(CoreError::HoldNotFound(hold_id)),
            HoldStatus::Held => {}
        }

        let mut bucket = state.bucket(hold.bucket_id)?;
        if hold.is_stale(now) {
            bucket.release_held(hold.quantity)?;
            hold.resolve(HoldStatus::Expired, now);
            state.buckets.insert(bucket.id, bucket);
            state.holds.insert(hold_id, hold);
            return Err(CoreError::HoldNotFound(hold_id));
        }

        bucket.issue_held(hold.quantity)?;
        bucket.check_invariant()?;
        hold.resolve(HoldStatus::Confirmed, now);
        state.buckets.insert(bucket.id, bucket);
        state.holds.insert(hold_id, hold.clone());
        Ok(HoldResolution { hold, changed: true })
    }

    async fn release(&self, hold_id: Uuid, now: DateTime<Utc>) -> CoreResult<HoldResolution> {
        let mut state = self.lock().await?;
        let mut hold = state
            .holds
            .get(&hold_id)
            .cloned()
            .ok_or(CoreError::HoldNotFound(hold_id))?;

        if hold.status != HoldStatus::Held {
            return Ok(HoldResolution { hold, changed: false });
        }

        let mut bucket = state.bucket(hold.bucket_id)?;
        bucket.release_held(hold.quantity)?;
        hold.resolve(HoldStatus::Released, now);
        state.buckets.insert(bucket.id, bucket);
        state.holds.insert(hold_id, hold.clone());
        Ok(HoldResolution { hold, changed: true })
    }

    async fn expire_stale_holds(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let mut state = self.lock().await?;
        let mut bucket_ids: Vec<Uuid> = state
            .holds
            .values()
            .filter(|h| h.is_stale(now))
            .map(|h| h.bucket_id)
            .collect();
        bucket_ids.sort();
        bucket_ids.dedup();

        let mut expired = 0;
        for bucket_id in bucket_ids {
            expired += state.resolve_held(bucket_id, HoldStatus::Expired, now, true)?;
        }
        Ok(expired)
    }

    async fn get_hold(&self, hold_id: Uuid) -> CoreResult<Option<SeatHold>> {
        Ok(self.lock().await?.holds.get(&hold_id).cloned())
    }

    async fn get_bucket(&self, group_id: Uuid, pax_type: PaxType) -> CoreResult<Option<SeatBucket>> {
        let state = self.lock().await?;
        Ok(state
            .bucket_id(group_id, pax_type)
            .and_then(|id| state.buckets.get(&id).cloned()))
    }
}

// ============================================================================
// Job queue
// ============================================================================

/// FIFO queues kept in memory; used in tests and when Redis is not wanted.
#[derive(Default)]
pub struct MemoryJobQueue {
    queues: Mutex<HashMap<QueueName, VecDeque<Job>>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, queue: QueueName) -> usize {
        self.queues.lock().await.get(&queue).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &Job) -> CoreResult<()> {
        self.queues
            .lock()
            .await
            .entry(job.queue())
            .or_default()
            .push_back(job.clone());
        Ok(())
    }

    async fn dequeue(&self, queue: QueueName) -> CoreResult<Option<Job>> {
        Ok(self.queues.lock().await.get_mut(&queue).and_then(VecDeque::pop_front))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use groupdesk_core::{NewFlightGroup, PnrMode, Role};
    use rust_decimal::Decimal;

    async fn agency(store: &MemoryStore, code: &str, parent: Option<Uuid>) -> Agency {
        let agency = Agency::new(&format!("{} Travel", code), code, parent).unwrap();
        AgencyRepository::create(store, &agency).await.unwrap()
    }

    async fn user(store: &MemoryStore, agency_id: Uuid, username: &str) -> User {
        let user = User::new(agency_id, username, "hash".to_string(), Role::Manager).unwrap();
        UserRepository::create(store, &user).await.unwrap()
    }

    async fn group(store: &MemoryStore, agency_id: Uuid, created_by: Uuid) -> FlightGroup {
        let departure = Utc::now() + ChronoDuration::days(20);
        let input = NewFlightGroup {
            agency_id,
            carrier_code: "KC".to_string(),
            flight_number: "101".to_string(),
            pnr_mode: PnrMode::GroupPnr,
            origin: "ALA".to_string(),
            destination: "NQZ".to_string(),
            departure_time_utc: departure,
            departure_time_local: departure.naive_utc(),
            arrival_time_utc: departure + ChronoDuration::hours(2),
            arrival_time_local: (departure + ChronoDuration::hours(2)).naive_utc(),
            sales_start: Utc::now() - ChronoDuration::hours(1),
            sales_end: departure - ChronoDuration::days(1),
        };
        let group = FlightGroup::create(input, created_by).unwrap();
        FlightGroupRepository::create(store, &group).await.unwrap()
    }

    fn spec(total: i32, currency: &str) -> BucketSpec {
        BucketSpec {
            total_seats: total,
            base_fare: Decimal::new(15000, 2),
            tax_amount: Decimal::new(2500, 2),
            fee_amount: Decimal::ZERO,
            currency: currency.to_string(),
        }
    }

    #[tokio::test]
    async fn test_lock_wait_surfaces_as_lock_timeout() {
        let store = MemoryStore::new(Duration::from_millis(20));
        let _guard = store.state.lock().await;
        let err = store.get_hold(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout));
    }

    #[tokio::test]
    async fn test_reparent_rejects_cycles() {
        let store = MemoryStore::default();
        let root = agency(&store, "ROOT", None).await;
        let mid = agency(&store, "MID", Some(root.id)).await;
        let leaf = agency(&store, "LEAF", Some(mid.id)).await;

        let err = store.set_parent(root.id, Some(leaf.id)).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert!(store.set_parent(mid.id, Some(mid.id)).await.is_err());

        let moved = store.set_parent(leaf.id, Some(root.id)).await.unwrap();
        assert_eq!(moved.parent_agency_id, Some(root.id));
        assert_eq!(store.list_children(root.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_codes_and_usernames_conflict() {
        let store = MemoryStore::default();
        let first = agency(&store, "ALPHA", None).await;
        let dup = Agency::new("Other", "alpha", None).unwrap();
        assert!(matches!(
            AgencyRepository::create(&store, &dup).await,
            Err(CoreError::Conflict(_))
        ));

        user(&store, first.id, "ops").await;
        let again = User::new(first.id, "OPS", "x".to_string(), Role::SubAgent).unwrap();
        assert!(matches!(
            UserRepository::create(&store, &again).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_user_with_groups_cannot_be_deleted_but_agency_can() {
        let store = MemoryStore::default();
        let parent = agency(&store, "PARENT", None).await;
        let child = agency(&store, "CHILD", Some(parent.id)).await;
        let manager = user(&store, parent.id, "manager").await;
        let created = group(&store, parent.id, manager.id).await;

        let err = UserRepository::delete(&store, manager.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        AgencyRepository::delete(&store, parent.id).await.unwrap();
        assert!(UserRepository::get(&store, manager.id).await.unwrap().is_none());
        assert!(FlightGroupRepository::get(&store, created.id).await.unwrap().is_none());
        let orphan = AgencyRepository::get(&store, child.id).await.unwrap().unwrap();
        assert_eq!(orphan.parent_agency_id, None);
    }

    #[tokio::test]
    async fn test_bucket_upsert_rules() {
        let store = MemoryStore::default();
        let owner = agency(&store, "OWNER", None).await;
        let manager = user(&store, owner.id, "manager").await;
        let group = group(&store, owner.id, manager.id).await;

        let adult = store.upsert_bucket(group.id, PaxType::Adult, &spec(30, "KZT"), true).await.unwrap();
        let err = store
            .upsert_bucket(group.id, PaxType::Child, &spec(5, "USD"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        store.upsert_bucket(group.id, PaxType::Child, &spec(5, "USD"), false).await.unwrap();

        let edited = store.upsert_bucket(group.id, PaxType::Adult, &spec(40, "KZT"), true).await.unwrap();
        assert_eq!(edited.id, adult.id);
        assert_eq!(edited.total_seats, 40);

        store.transition_status(group.id, FlightGroupStatus::Cancelled, Utc::now()).await.unwrap();
        let err = store
            .upsert_bucket(group.id, PaxType::Adult, &spec(10, "KZT"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_only_draft_groups_are_deleted() {
        let store = MemoryStore::default();
        let owner = agency(&store, "OWNER", None).await;
        let manager = user(&store, owner.id, "manager").await;
        let draft = group(&store, owner.id, manager.id).await;
        let published = group(&store, owner.id, manager.id).await;
        store.upsert_bucket(published.id, PaxType::Adult, &spec(10, "KZT"), true).await.unwrap();
        store.transition_status(published.id, FlightGroupStatus::Published, Utc::now()).await.unwrap();

        FlightGroupRepository::delete(&store, draft.id).await.unwrap();
        assert!(matches!(
            FlightGroupRepository::delete(&store, published.id).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_reserve_leaves_stale_holds_alone() {
        let store = MemoryStore::default();
        let owner = agency(&store, "OWNER", None).await;
        let manager = user(&store, owner.id, "manager").await;
        let group = group(&store, owner.id, manager.id).await;
        store.upsert_bucket(group.id, PaxType::Adult, &spec(10, "KZT"), true).await.unwrap();
        store.transition_status(group.id, FlightGroupStatus::Published, Utc::now()).await.unwrap();

        let start = Utc::now();
        let request = |quantity: i32, now: DateTime<Utc>| HoldRequest {
            flight_group_id: group.id,
            pax_type: PaxType::Adult,
            quantity,
            agency_id: owner.id,
            requested_by: manager.id,
            ttl: ChronoDuration::minutes(1),
            now,
        };
        let stale = store.reserve(&request(6, start)).await.unwrap();

        let later = start + ChronoDuration::minutes(2);
        let err = store.reserve(&request(11, later)).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { requested: 11, available: 10 }));
        let untouched = store.get_hold(stale.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, HoldStatus::Held);
        let bucket = store.get_bucket(group.id, PaxType::Adult).await.unwrap().unwrap();
        assert_eq!(bucket.seats_on_hold, 6);

        store.reserve(&request(10, later)).await.unwrap();
        let expired = store.get_hold(stale.id).await.unwrap().unwrap();
        assert_eq!(expired.status, HoldStatus::Expired);
        let bucket = store.get_bucket(group.id, PaxType::Adult).await.unwrap().unwrap();
        assert_eq!(bucket.seats_on_hold, 10);
    }

    #[tokio::test]
    async fn test_job_queue_is_fifo_per_queue() {
        let queue = MemoryJobQueue::new();
        let first = Job::pnr_sync(Uuid::new_v4(), Uuid::new_v4(), "ADT", 3);
        let second = Job::pnr_sync(Uuid::new_v4(), Uuid::new_v4(), "CHD", 1);
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        assert_eq!(queue.len(QueueName::PnrSync).await, 2);
        assert!(queue.dequeue(QueueName::Email).await.unwrap().is_none());
        assert_eq!(queue.dequeue(QueueName::PnrSync).await.unwrap(), Some(first));
        assert_eq!(queue.dequeue(QueueName::PnrSync).await.unwrap(), Some(second));
        assert!(queue.dequeue(QueueName::PnrSync).await.unwrap().is_none());
    }
}
