//! Integration tests for the HTTP API.
//!
//! Requests go straight into the router with `tower::ServiceExt::oneshot`;
//! no socket is bound.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use trustchain::api::{build_router, AppState, MEMBER_HEADER, OPERATOR_HEADER};
use trustchain::persistence::{MockStateStore, StateStore};
use trustchain::{NetworkConfig, PollConfig, TrustNetwork};

// === Test Fixtures ===

fn network() -> Arc<TrustNetwork> {
    Arc::new(
        TrustNetwork::with_defaults(&NetworkConfig::default(), PollConfig::default().into_poll())
            .unwrap(),
    )
}

fn app() -> Router {
    build_router(AppState::new(network()))
}

const OPERATOR_TOKEN: &str = "operator-s3cret";

fn operator_app() -> Router {
    build_router(AppState::new(network()).with_operator_token(OPERATOR_TOKEN))
}

/// Network seeded into a mock store with every change written through.
async fn stored_app() -> (Router, Arc<TrustNetwork>, MockStateStore) {
    let store = MockStateStore::new();
    let network =
        TrustNetwork::with_defaults(&NetworkConfig::default(), PollConfig::default().into_poll())
            .unwrap();
    store.save(&network.snapshot().await).await.unwrap();
    let network = Arc::new(network.with_store(Arc::new(store.clone())));
    let state = AppState::new(Arc::clone(&network)).with_operator_token(OPERATOR_TOKEN);
    (build_router(state), network, store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn operator_post(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(OPERATOR_HEADER, token)
        .body(Body::empty())
        .unwrap()
}

async fn redeem(app: &Router, code: &str, name: &str) -> Value {
    let request = post("/invites/redeem", json!({"code": code, "name": name}));
    let (status, member) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    member
}

// === Tests ===

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["members"], 2);
}

#[tokio::test]
async fn test_redeem_then_list_members() {
    let app = app();

    let (status, member) = send(
        &app,
        post("/invites/redeem", json!({"code": "SEED-A1", "name": "Omar"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(member["id"], "user-3");
    assert_eq!(member["invited_by"], "seed-1");
    assert_eq!(member["role"], "citizen");

    let (status, members) = send(&app, get("/members")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(members.as_array().unwrap().len(), 3);

    let (_, lineage) = send(&app, get("/members/user-3/lineage")).await;
    assert_eq!(lineage, json!(["user-3", "seed-1"]));
}

#[tokio::test]
async fn test_redeem_errors() {
    let app = app();

    let (status, body) = send(
        &app,
        post("/invites/redeem", json!({"code": "SEED-A1", "name": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "EmptyName");

    send(
        &app,
        post("/invites/redeem", json!({"code": "SEED-A1", "name": "Omar"})),
    )
    .await;
    let (status, body) = send(
        &app,
        post("/invites/redeem", json!({"code": "SEED-A1", "name": "Again"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InvalidCode");
}

#[tokio::test]
async fn test_unknown_member_is_not_found() {
    let (status, body) = send(&app(), get("/members/user-99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "UnknownMember");
}

#[tokio::test]
async fn test_codes_visible_to_owner_only() {
    let app = app();

    let (status, body) = send(&app, get("/members/seed-1/codes")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let request = Request::builder()
        .uri("/members/seed-1/codes")
        .header(MEMBER_HEADER, "seed-2")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri("/members/seed-1/codes")
        .header(MEMBER_HEADER, "seed-1")
        .body(Body::empty())
        .unwrap();
    let (status, codes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(codes.as_array().unwrap().len(), 5);
    assert_eq!(codes[0]["code"], "SEED-A1");
}

#[tokio::test]
async fn test_vote_flow() {
    let app = app();
    send(
        &app,
        post("/invites/redeem", json!({"code": "SEED-A1", "name": "Omar"})),
    )
    .await;

    let (status, record) = send(
        &app,
        post("/votes", json!({"member_id": "user-3", "candidate_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["voter_fragment"], "3***");
    assert_eq!(record["action"], "voted");

    let (status, body) = send(
        &app,
        post("/votes", json!({"member_id": "user-3", "candidate_id": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyVoted");

    let (_, tally) = send(&app, get("/tally/1")).await;
    assert_eq!(tally, json!({"candidate_id": 1, "votes": 1}));

    let (_, results) = send(&app, get("/results")).await;
    assert_eq!(results[1]["votes"], 0);

    let (_, audit) = send(&app, get("/audit?limit=10")).await;
    assert_eq!(audit.as_array().unwrap().len(), 1);
    assert_eq!(audit[0]["voter_name"], "Omar");
}

#[tokio::test]
async fn test_vote_errors() {
    let app = app();
    send(
        &app,
        post("/invites/redeem", json!({"code": "SEED-A1", "name": "Omar"})),
    )
    .await;

    let (status, body) = send(
        &app,
        post("/votes", json!({"member_id": "user-3", "candidate_id": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "UnknownCandidate");

    let (status, _) = send(
        &app,
        post("/votes", json!({"member_id": "user-50", "candidate_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_poll() {
    let (status, poll) = send(&app(), get("/poll")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["status"], "open");
    assert_eq!(poll["candidates"][0]["name"], "Omar Al-Mukhtar");
}

#[tokio::test]
async fn test_name_carrying_member_id_is_bad_request() {
    let app = app();
    let (status, body) = send(
        &app,
        post("/invites/redeem", json!({"code": "SEED-A1", "name": "user-3"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidName");

    // The code is still unused.
    redeem(&app, "SEED-A1", "Omar").await;
}

#[tokio::test]
async fn test_invitees() {
    let app = app();
    redeem(&app, "SEED-A1", "Omar").await;
    redeem(&app, "SEED-B1", "Sara").await;

    let (status, invitees) = send(&app, get("/members/seed-1/invitees")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invitees.as_array().unwrap().len(), 1);
    assert_eq!(invitees[0]["id"], "user-3");

    let (status, invitees) = send(&app, get("/members/user-3/invitees")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invitees, json!([]));

    let (status, _) = send(&app, get("/members/user-99/invitees")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_operator_routes_require_token() {
    // No token configured: disabled.
    let (status, body) = send(&app(), operator_post("/poll/close", OPERATOR_TOKEN)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let app = operator_app();
    let (status, _) = send(&app, operator_post("/members/seed-2/suspend", "wrong")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("POST")
        .uri("/poll/close")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, poll) = send(&app, get("/poll")).await;
    assert_eq!(poll["status"], "open");
    let (_, seed) = send(&app, get("/members/seed-2")).await;
    assert_eq!(seed["status"], "active");
}

#[tokio::test]
async fn test_suspend_and_reinstate() {
    let app = operator_app();
    redeem(&app, "SEED-A1", "Omar").await;

    let (status, member) =
        send(&app, operator_post("/members/user-3/suspend", OPERATOR_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(member["status"], "suspended");

    let (status, body) = send(
        &app,
        post("/votes", json!({"member_id": "user-3", "candidate_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "MemberSuspended");

    let (status, member) =
        send(&app, operator_post("/members/user-3/reinstate", OPERATOR_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(member["status"], "active");

    let (status, _) = send(
        &app,
        post("/votes", json!({"member_id": "user-3", "candidate_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) =
        send(&app, operator_post("/members/user-99/suspend", OPERATOR_TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_close_poll() {
    let app = operator_app();
    redeem(&app, "SEED-A1", "Omar").await;

    let (status, poll) = send(&app, operator_post("/poll/close", OPERATOR_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["status"], "closed");

    let (status, body) = send(
        &app,
        post("/votes", json!({"member_id": "user-3", "candidate_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "PollClosed");

    // Tallies stay readable.
    let (status, results) = send(&app, get("/results")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_mutations_write_through() {
    let (app, network, store) = stored_app().await;

    redeem(&app, "SEED-A1", "Omar").await;
    send(
        &app,
        post("/votes", json!({"member_id": "user-3", "candidate_id": 2})),
    )
    .await;
    send(&app, operator_post("/members/seed-2/suspend", OPERATOR_TOKEN)).await;
    send(&app, operator_post("/members/seed-2/reinstate", OPERATOR_TOKEN)).await;
    send(&app, operator_post("/poll/close", OPERATOR_TOKEN)).await;
    // Refused mutations and reads write nothing.
    send(
        &app,
        post("/votes", json!({"member_id": "user-3", "candidate_id": 2})),
    )
    .await;
    send(&app, get("/members")).await;

    assert_eq!(store.changes().len(), 5);
    assert_eq!(store.stored(), Some(network.snapshot().await));
}

#[tokio::test]
async fn test_store_failure_changes_nothing() {
    let (app, network, store) = stored_app().await;
    let before = network.snapshot().await;

    store.fail_writes();
    let (status, body) = send(
        &app,
        post("/invites/redeem", json!({"code": "SEED-A1", "name": "Omar"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Storage");
    assert_eq!(body["message"], "internal error");
    assert_eq!(network.snapshot().await, before);

    // Retrying the same request succeeds once the store is back.
    store.resume_writes();
    let member = redeem(&app, "SEED-A1", "Omar").await;
    assert_eq!(member["id"], "user-3");
    assert_eq!(store.stored(), Some(network.snapshot().await));
}
