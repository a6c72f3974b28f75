// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway routes driven end to end through a mocked pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use palaver_core::{Actor, DeliveryStatus, Message, StorageAdapter, TenantId};
use palaver_gateway::{EMPTY_TWIML, GatewayState, build_router, drain_turns};
use palaver_test_utils::{FAST_MODEL, TestHarness, agent, classification, tenant};
use palaver_whatsapp::compute_signature;
use tower::ServiceExt;

const AUTH_TOKEN: &str = "twilio-test-token";
const PUBLIC_URL: &str = "https://hooks.example.com";
const ADMIN_TOKEN: &str = "admin-test-token";
const TENANT_NUMBER: &str = "15550001111";
const CUSTOMER: &str = "33600000001";

async fn setup() -> (TestHarness, Router) {
    let (harness, state) = setup_state().await;
    (harness, build_router(state))
}

async fn setup_state() -> (TestHarness, GatewayState) {
    let harness = TestHarness::builder()
        .configure(|c| {
            c.whatsapp.auth_token = Some(AUTH_TOKEN.into());
            c.server.public_url = Some(PUBLIC_URL.into());
            c.admin.bearer_token = Some(ADMIN_TOKEN.into());
        })
        .build()
        .await
        .unwrap();
    harness
        .seed_tenant(&tenant("t1", TENANT_NUMBER))
        .await
        .unwrap();
    let render: Arc<dyn Fn() -> String + Send + Sync> =
        Arc::new(|| "palaver_inbound_total 1\n".to_string());
    let state = GatewayState::from_config(&harness.config, harness.pipeline.clone(), Some(render));
    (harness, state)
}

fn form(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn inbound_form(sid: &str, body: &str) -> BTreeMap<String, String> {
    form(&[
        ("MessageSid", sid),
        ("From", "whatsapp:+33600000001"),
        ("To", "whatsapp:+15550001111"),
        ("Body", body),
        ("ProfileName", "Jane"),
        ("NumMedia", "0"),
    ])
}

fn signed_post(path: &str, params: &BTreeMap<String, String>) -> Request<Body> {
    let signature = compute_signature(AUTH_TOKEN, &format!("{PUBLIC_URL}{path}"), params);
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-twilio-signature", signature)
        .body(Body::from(serde_urlencoded::to_string(params).unwrap()))
        .unwrap()
}

fn admin_post(path: &str, json: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"));
    match json {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// The inbound handler runs the pipeline on a spawned task.
async fn wait_for_sends(harness: &TestHarness, count: usize) {
    for _ in 0..200 {
        if harness.transport.sent_count().await >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pipeline did not send {count} message(s) in time");
}

/// The stored outbound message carrying `sid`, once the pipeline recorded it.
async fn outbound_message(harness: &TestHarness, sid: &str) -> Message {
    let store = harness.store();
    let conversation = store
        .upsert_conversation(&TenantId::new("t1"), CUSTOMER, None, Actor::Pipeline)
        .await
        .unwrap();
    for _ in 0..200 {
        let messages = store.recent_messages(&conversation.id, 10).await.unwrap();
        if let Some(m) = messages
            .into_iter()
            .find(|m| m.provider_message_id.as_deref() == Some(sid))
        {
            return m;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no outbound message {sid} recorded");
}

#[tokio::test]
async fn signed_inbound_is_acknowledged_and_answered() {
    let (harness, router) = setup().await;
    harness
        .provider
        .add_response(FAST_MODEL, classification("GREETING", 0.95))
        .await;
    harness.provider.add_response(FAST_MODEL, "Hello Jane!").await;

    let response = router
        .oneshot(signed_post("/webhooks/whatsapp", &inbound_form("SM1", "Hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/xml");
    assert_eq!(body_string(response).await, EMPTY_TWIML);

    wait_for_sends(&harness, 1).await;
    assert_eq!(harness.transport.bodies_to(CUSTOMER).await, ["Hello Jane!"]);
}

#[tokio::test]
async fn draining_finishes_acknowledged_turns() {
    let (harness, state) = setup_state().await;
    let turns = state.turns.clone();
    let router = build_router(state);
    harness
        .provider
        .add_response(FAST_MODEL, classification("GREETING", 0.95))
        .await;
    harness.provider.add_response(FAST_MODEL, "Hello Jane!").await;

    let response = router
        .oneshot(signed_post("/webhooks/whatsapp", &inbound_form("SM1", "Hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(drain_turns(&turns, Duration::from_secs(5)).await);
    assert_eq!(harness.transport.bodies_to(CUSTOMER).await, ["Hello Jane!"]);
    outbound_message(&harness, "SMOUT1").await;
}

#[tokio::test]
async fn bad_signature_is_rejected_before_the_pipeline() {
    let (harness, router) = setup().await;
    let mut request = signed_post("/webhooks/whatsapp", &inbound_form("SM1", "Hi"));
    request
        .headers_mut()
        .insert("x-twilio-signature", "AAAA".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.transport.sent_count().await, 0);
    assert_eq!(harness.provider.call_count().await, 0);
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let (_harness, router) = setup().await;
    let signed = inbound_form("SM1", "Hi");
    let signature = compute_signature(AUTH_TOKEN, &format!("{PUBLIC_URL}/webhooks/whatsapp"), &signed);
    let tampered = inbound_form("SM1", "Hi, refund me");
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/whatsapp")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-twilio-signature", signature)
        .body(Body::from(serde_urlencoded::to_string(&tampered).unwrap()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_inbound_is_a_bad_request() {
    let (_harness, router) = setup().await;
    let params = form(&[("From", "whatsapp:+33600000001"), ("Body", "Hi")]);
    let response = router
        .oneshot(signed_post("/webhooks/whatsapp", &params))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delivery_status_updates_the_outbound_message() {
    let (harness, router) = setup().await;
    harness
        .provider
        .add_response(FAST_MODEL, classification("GREETING", 0.95))
        .await;
    harness.provider.add_response(FAST_MODEL, "Hello!").await;

    let response = router
        .clone()
        .oneshot(signed_post("/webhooks/whatsapp", &inbound_form("SM1", "Hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    wait_for_sends(&harness, 1).await;
    outbound_message(&harness, "SMOUT1").await;

    let status = form(&[("MessageSid", "SMOUT1"), ("MessageStatus", "delivered")]);
    let response = router
        .clone()
        .oneshot(signed_post("/webhooks/whatsapp/status", &status))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        outbound_message(&harness, "SMOUT1").await.status,
        DeliveryStatus::Delivered
    );

    // A late "sent" never regresses the status.
    let late = form(&[("MessageSid", "SMOUT1"), ("MessageStatus", "sent")]);
    router
        .oneshot(signed_post("/webhooks/whatsapp/status", &late))
        .await
        .unwrap();
    assert_eq!(
        outbound_message(&harness, "SMOUT1").await.status,
        DeliveryStatus::Delivered
    );
}

#[tokio::test]
async fn status_edge_cases() {
    let (_harness, router) = setup().await;

    let unknown = form(&[("MessageSid", "SMNOPE"), ("MessageStatus", "delivered")]);
    let response = router
        .clone()
        .oneshot(signed_post("/webhooks/whatsapp/status", &unknown))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let unmapped = form(&[("MessageSid", "SM1"), ("MessageStatus", "receiving")]);
    let response = router
        .clone()
        .oneshot(signed_post("/webhooks/whatsapp/status", &unmapped))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let missing = form(&[("MessageSid", "SM1")]);
    let response = router
        .oneshot(signed_post("/webhooks/whatsapp/status", &missing))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let (_harness, router) = setup().await;

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(health["status"], "ok");

    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("palaver_inbound_total"));
}

#[tokio::test]
async fn admin_routes_require_the_bearer_token() {
    let (_harness, router) = setup().await;
    let request = Request::builder()
        .method("POST")
        .uri("/admin/tenant-cache/clear")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_cache_invalidation() {
    let (harness, router) = setup().await;
    harness
        .pipeline
        .tenants()
        .resolve(TENANT_NUMBER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(harness.pipeline.tenants().len(), 1);

    let response = router
        .clone()
        .oneshot(admin_post("/admin/tenants/t1/invalidate", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.pipeline.tenants().is_empty());

    harness
        .pipeline
        .tenants()
        .resolve(TENANT_NUMBER)
        .await
        .unwrap();
    let response = router
        .oneshot(admin_post("/admin/tenant-cache/clear", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["cleared"], 1);
    assert!(harness.pipeline.tenants().is_empty());
}

#[tokio::test]
async fn admin_agent_availability() {
    let (harness, router) = setup().await;
    harness.seed_agent(&agent("a1", "t1", 5)).await.unwrap();

    let response = router
        .clone()
        .oneshot(admin_post(
            "/admin/agents/a1/availability",
            Some(serde_json::json!({ "tenant_id": "t1", "available": false })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["available"], false);
    assert_eq!(body["released"].as_array().unwrap().len(), 0);

    let response = router
        .oneshot(admin_post(
            "/admin/agents/ghost/availability",
            Some(serde_json::json!({ "tenant_id": "t1", "available": true })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
