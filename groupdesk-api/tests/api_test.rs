use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use groupdesk_api::{
    app,
    state::{bootstrap_admin, AppState, AuthConfig},
};
use groupdesk_core::{Agency, AgencyRepository, Role, User, UserRepository};
use groupdesk_inventory::{InventoryPolicy, InventoryService};
use groupdesk_shared::{Masked, QueueName};
use groupdesk_store::{app_config::BootstrapConfig, MemoryJobQueue, MemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "correct-horse";

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    jobs: Arc<MemoryJobQueue>,
    hq: Agency,
    owner: Agency,
    rival: Agency,
}

fn build_state(store: Arc<MemoryStore>, jobs: Arc<MemoryJobQueue>) -> AppState {
    let policy = InventoryPolicy {
        retry_backoff: std::time::Duration::from_millis(5),
        ..InventoryPolicy::default()
    };
    AppState {
        agencies: store.clone(),
        users: store.clone(),
        groups: store.clone(),
        inventory: InventoryService::new(store.clone(), store.clone(), jobs, policy),
        auth: AuthConfig {
            secret: "test-secret".to_string(),
            expiration: 3600,
            bcrypt_cost: 4,
        },
    }
}

async fn seed_user(store: &MemoryStore, agency: &Agency, username: &str, role: Role) -> User {
    let hash = bcrypt::hash(PASSWORD, 4).unwrap();
    let user = User::new(agency.id, username, hash, role).unwrap();
    UserRepository::create(store, &user).await.unwrap()
}

async fn seed_agency(store: &MemoryStore, name: &str, code: &str) -> Agency {
    let agency = Agency::new(name, code, None).unwrap();
    AgencyRepository::create(store, &agency).await.unwrap()
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let jobs = Arc::new(MemoryJobQueue::new());

    let hq = seed_agency(&store, "GroupDesk HQ", "HQ").await;
    let owner = seed_agency(&store, "Blue Sky Travel", "BLUESKY").await;
    let rival = seed_agency(&store, "Red Planet Tours", "REDPLANET").await;

    seed_user(&store, &hq, "root", Role::Admin).await;
    seed_user(&store, &owner, "manager", Role::Manager).await;
    seed_user(&store, &owner, "agent", Role::SubAgent).await;
    seed_user(&store, &rival, "outsider", Role::SubAgent).await;

    let state = build_state(store.clone(), jobs.clone());
    Harness {
        app: app(state),
        store,
        jobs,
        hq,
        owner,
        rival,
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(h: &Harness, agency_code: &str, username: &str) -> String {
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "agency_code": agency_code, "username": username, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

/// Creates a group for the owner agency with a 10-seat ADT bucket and publishes it.
async fn published_group(h: &Harness, token: &str) -> String {
    let now = Utc::now();
    let departure = now + Duration::days(30);
    let (status, group) = send(
        &h.app,
        Method::POST,
        "/groups",
        Some(token),
        Some(json!({
            "carrier_code": "gd",
            "flight_number": "451",
            "pnr_mode": "GROUP_PNR",
            "origin": "lhr",
            "destination": "JFK",
            "departure_time_utc": departure,
            "departure_time_local": departure.naive_utc(),
            "arrival_time_utc": departure + Duration::hours(8),
            "arrival_time_local": (departure + Duration::hours(3)).naive_utc(),
            "sales_start": now - Duration::hours(1),
            "sales_end": now + Duration::days(10),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", group);
    assert_eq!(group["status"], "DRAFT");
    assert_eq!(group["carrier_code"], "GD");
    let id = group["id"].as_str().unwrap().to_string();

    let (status, bucket) = send(
        &h.app,
        Method::PUT,
        &format!("/groups/{}/seat-buckets/ADT", id),
        Some(token),
        Some(json!({
            "total_seats": 10,
            "base_fare": "210.00",
            "tax_amount": "45.50",
            "fee_amount": "10.00",
            "currency": "usd",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", bucket);
    assert_eq!(bucket["currency"], "USD");

    let (status, change) = send(
        &h.app,
        Method::PATCH,
        &format!("/groups/{}/status", id),
        Some(token),
        Some(json!({ "status": "PUBLISHED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", change);
    assert_eq!(change["group"]["status"], "PUBLISHED");

    id
}

async fn hold(h: &Harness, token: &str, group_id: &str, quantity: i32) -> (StatusCode, Value) {
    send(
        &h.app,
        Method::POST,
        &format!("/groups/{}/seat-buckets/ADT/hold", group_id),
        Some(token),
        Some(json!({ "quantity": quantity })),
    )
    .await
}

async fn adt_bucket(h: &Harness, token: &str, group_id: &str) -> Value {
    let (status, buckets) = send(
        &h.app,
        Method::GET,
        &format!("/groups/{}/seat-buckets", group_id),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    buckets[0].clone()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let h = harness().await;
    let (status, body) = send(&h.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_require_valid_token() {
    let h = harness().await;

    let (status, body) = send(&h.app, Method::GET, "/groups", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = send(&h.app, Method::GET, "/groups", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_and_me() {
    let h = harness().await;

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "agency_code": "bluesky", "username": "manager", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "agency_code": "REDPLANET", "username": "manager", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Unknown usernames and agencies get the same answer as a wrong password
    let (status, wrong_password) = send(
        &h.app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "agency_code": "BLUESKY", "username": "manager", "password": "not-it" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    for (agency_code, username) in [("BLUESKY", "nobody"), ("NOWHERE", "manager")] {
        let (status, body) = send(
            &h.app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "agency_code": agency_code, "username": username, "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, wrong_password);
    }

    // Agency codes and usernames are case-insensitive
    let token = login(&h, "bluesky", "Manager").await;
    let (status, me) = send(&h.app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["username"], "manager");
    assert_eq!(me["user"]["role"], "MANAGER");
    assert_eq!(me["agency"]["code"], "BLUESKY");
    assert!(me["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_hold_confirm_walkthrough() {
    let h = harness().await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let agent = login(&h, "BLUESKY", "agent").await;
    let group_id = published_group(&h, &manager).await;

    let (status, first) = hold(&h, &agent, &group_id, 7).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["status"], "HELD");
    assert_eq!(first["holdId"], first["id"]);

    let (status, body) = hold(&h, &agent, &group_id, 4).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CapacityExceeded");

    let (status, _) = hold(&h, &agent, &group_id, 3).await;
    assert_eq!(status, StatusCode::CREATED);

    let hold_id = first["holdId"].as_str().unwrap();
    let (status, resolution) = send(
        &h.app,
        Method::POST,
        &format!("/holds/{}/confirm", hold_id),
        Some(&agent),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolution["changed"], true);
    assert_eq!(resolution["hold"]["status"], "CONFIRMED");

    let bucket = adt_bucket(&h, &agent, &group_id).await;
    assert_eq!(bucket["seats_on_hold"], 3);
    assert_eq!(bucket["seats_issued"], 7);
    assert_eq!(bucket["total_seats"], 10);

    // Confirmation queues a PNR sync; publishing queued an email
    assert_eq!(h.jobs.len(QueueName::PnrSync).await, 1);
    assert_eq!(h.jobs.len(QueueName::Email).await, 1);
}

#[tokio::test]
async fn test_release_is_idempotent_and_blocks_confirm() {
    let h = harness().await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let group_id = published_group(&h, &manager).await;

    let (_, held) = hold(&h, &manager, &group_id, 2).await;
    let hold_id = held["holdId"].as_str().unwrap();
    let release_uri = format!("/holds/{}/release", hold_id);

    let (status, first) = send(&h.app, Method::POST, &release_uri, Some(&manager), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["changed"], true);

    let (status, second) = send(&h.app, Method::POST, &release_uri, Some(&manager), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["changed"], false);
    assert_eq!(second["hold"]["status"], "RELEASED");

    let (status, body) = send(
        &h.app,
        Method::POST,
        &format!("/holds/{}/confirm", hold_id),
        Some(&manager),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "HoldNotFound");

    let bucket = adt_bucket(&h, &manager, &group_id).await;
    assert_eq!(bucket["seats_on_hold"], 0);
    assert_eq!(bucket["seats_issued"], 0);
}

#[tokio::test]
async fn test_other_agency_is_forbidden() {
    let h = harness().await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let outsider = login(&h, "REDPLANET", "outsider").await;
    let group_id = published_group(&h, &manager).await;

    let (_, held) = hold(&h, &manager, &group_id, 1).await;
    let hold_id = held["holdId"].as_str().unwrap();

    let (status, _) = send(&h.app, Method::GET, &format!("/groups/{}", group_id), Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = hold(&h, &outsider, &group_id, 1).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");

    let (status, _) = send(
        &h.app,
        Method::POST,
        &format!("/holds/{}/release", hold_id),
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, groups) = send(&h.app, Method::GET, "/groups", Some(&outsider), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_lifecycle_rules_over_http() {
    let h = harness().await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let group_id = published_group(&h, &manager).await;
    let status_uri = format!("/groups/{}/status", group_id);

    let (status, body) = send(
        &h.app,
        Method::PATCH,
        &status_uri,
        Some(&manager),
        Some(json!({ "status": "DRAFT" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InvalidTransition");

    // Published groups cannot be deleted
    let (status, _) = send(&h.app, Method::DELETE, &format!("/groups/{}", group_id), Some(&manager), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &h.app,
        Method::PATCH,
        &status_uri,
        Some(&manager),
        Some(json!({ "status": "CLOSED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = hold(&h, &manager, &group_id, 1).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "GroupNotOnSale");
}

#[tokio::test]
async fn test_cancel_releases_outstanding_holds() {
    let h = harness().await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let group_id = published_group(&h, &manager).await;

    hold(&h, &manager, &group_id, 4).await;
    hold(&h, &manager, &group_id, 2).await;

    let (status, change) = send(
        &h.app,
        Method::PATCH,
        &format!("/groups/{}/status", group_id),
        Some(&manager),
        Some(json!({ "status": "CANCELLED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["released_holds"], 2);

    let bucket = adt_bucket(&h, &manager, &group_id).await;
    assert_eq!(bucket["seats_on_hold"], 0);
}

#[tokio::test]
async fn test_quote_uses_bucket_pricing() {
    let h = harness().await;
    let agent = login(&h, "BLUESKY", "agent").await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let group_id = published_group(&h, &manager).await;

    let (status, quote) = send(
        &h.app,
        Method::GET,
        &format!("/groups/{}/seat-buckets/adt/quote?quantity=4", group_id),
        Some(&agent),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", quote);
    assert_eq!(quote["unit_total"], "265.50");
    assert_eq!(quote["total"], "1062.00");

    let (status, body) = send(
        &h.app,
        Method::GET,
        &format!("/groups/{}/seat-buckets/XYZ/quote?quantity=1", group_id),
        Some(&agent),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
}

#[tokio::test]
async fn test_expire_endpoint_is_admin_only() {
    let h = harness().await;
    let admin = login(&h, "HQ", "root").await;
    let manager = login(&h, "BLUESKY", "manager").await;

    let (status, _) = send(&h.app, Method::POST, "/admin/holds/expire", Some(&manager), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&h.app, Method::POST, "/admin/holds/expire", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 0);
}

#[tokio::test]
async fn test_user_management() {
    let h = harness().await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let users_uri = format!("/agencies/{}/users", h.owner.id);

    let (status, _) = send(
        &h.app,
        Method::POST,
        &users_uri,
        Some(&manager),
        Some(json!({ "username": "boss", "password": "long-enough", "role": "ADMIN" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &h.app,
        Method::POST,
        &users_uri,
        Some(&manager),
        Some(json!({ "username": "shorty", "password": "short", "role": "SUB_AGENT" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = send(
        &h.app,
        Method::POST,
        &users_uri,
        Some(&manager),
        Some(json!({ "username": "New.Agent", "password": "long-enough", "role": "SUB_AGENT" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["username"], "new.agent");
    assert!(created.get("password_hash").is_none());

    // Managers only administer their own agency
    let (status, _) = send(
        &h.app,
        Method::POST,
        &format!("/agencies/{}/users", h.rival.id),
        Some(&manager),
        Some(json!({ "username": "spy", "password": "long-enough", "role": "SUB_AGENT" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, users) = send(&h.app, Method::GET, &users_uri, Some(&manager), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_deactivated_user_loses_access() {
    let h = harness().await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let agent = login(&h, "BLUESKY", "agent").await;

    let agent_id = h
        .store
        .find_by_username(h.owner.id, "agent")
        .await
        .unwrap()
        .unwrap()
        .id;

    let (status, user) = send(
        &h.app,
        Method::PATCH,
        &format!("/users/{}/active", agent_id),
        Some(&manager),
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["is_active"], false);

    let (status, _) = send(&h.app, Method::GET, "/auth/me", Some(&agent), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_agency_administration() {
    let h = harness().await;
    let admin = login(&h, "HQ", "root").await;
    let manager = login(&h, "BLUESKY", "manager").await;
    let outsider = login(&h, "REDPLANET", "outsider").await;

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/agencies",
        Some(&manager),
        Some(json!({ "name": "Nope", "code": "NOPE" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, child) = send(
        &h.app,
        Method::POST,
        "/agencies",
        Some(&admin),
        Some(json!({ "name": "Blue Sky North", "code": "bluesky-n", "parent_agency_id": h.owner.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", child);
    assert_eq!(child["code"], "BLUESKY-N");

    let (status, children) = send(
        &h.app,
        Method::GET,
        &format!("/agencies/{}/children", h.owner.id),
        Some(&manager),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(children.as_array().unwrap().len(), 1);

    // Making the parent a child of its own child closes a cycle
    let (status, body) = send(
        &h.app,
        Method::PATCH,
        &format!("/agencies/{}/parent", h.owner.id),
        Some(&admin),
        Some(json!({ "parent_agency_id": child["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, _) = send(&h.app, Method::DELETE, &format!("/agencies/{}", h.hq.id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, suspended) = send(
        &h.app,
        Method::PATCH,
        &format!("/agencies/{}/status", h.rival.id),
        Some(&admin),
        Some(json!({ "status": "SUSPENDED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(suspended["status"], "SUSPENDED");

    // Suspended agencies cannot log in
    let (status, _) = send(
        &h.app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "agency_code": "REDPLANET", "username": "outsider", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // and tokens issued before the suspension stop working
    let (status, body) = send(&h.app, Method::GET, "/auth/me", Some(&outsider), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "agency is not active");
}

#[tokio::test]
async fn test_bootstrap_admin_runs_once() {
    let store = Arc::new(MemoryStore::default());
    let state = build_state(store.clone(), Arc::new(MemoryJobQueue::new()));
    let seed = BootstrapConfig {
        agency_code: "hq".to_string(),
        agency_name: "GroupDesk HQ".to_string(),
        admin_username: "root".to_string(),
        admin_password: Masked::new(PASSWORD.to_string()),
    };

    assert!(bootstrap_admin(&state, &seed).await.unwrap());
    assert!(!bootstrap_admin(&state, &seed).await.unwrap());

    let agencies = AgencyRepository::list(store.as_ref()).await.unwrap();
    assert_eq!(agencies.len(), 1);

    let token = {
        let (status, body) = send(
            &app(state),
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "agency_code": "HQ", "username": "root", "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    };
    assert!(!token.is_empty());
}
