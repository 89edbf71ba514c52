//! HTTP API tests
//!
//! Drives the full router (auth middleware, handlers, error rendering) over
//! the in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use ledger_server::{create_app, middleware::encode_token, store::MemoryLedgerStore, AppState, Config};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "api-test-secret";
const READ_WRITE: &[&str] = &["inventory:read", "inventory:write"];

struct TestApp {
    router: Router,
    tenant_id: Uuid,
    token: String,
}

impl TestApp {
    fn new() -> Self {
        Self::with_permissions(READ_WRITE)
    }

    fn with_permissions(permissions: &[&str]) -> Self {
        let config = Config::for_memory_store(SECRET);
        let state = AppState::new(Arc::new(MemoryLedgerStore::new()), config).unwrap();
        let tenant_id = Uuid::new_v4();
        let token = encode_token(Uuid::new_v4(), tenant_id, permissions, SECRET, 3600).unwrap();

        Self {
            router: create_app(state),
            tenant_id,
            token,
        }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_with_token(method, uri, body, Some(&self.token)).await
    }

    async fn send_with_token(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
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

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_item(&self, body: Value) -> Value {
        let (status, item) = self
            .send(Method::POST, "/api/v1/inventory/items", Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", item);
        item
    }
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app
        .send_with_token(Method::GET, "/api/v1/inventory/items", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_bad_token_is_unauthorized() {
    let app = TestApp::new();
    let (status, _) = app
        .send_with_token(Method::GET, "/api/v1/inventory/items", None, Some("garbage"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_read_only_user_cannot_write() {
    let app = TestApp::with_permissions(&["inventory:read"]);

    let (status, _) = app.send(Method::GET, "/api/v1/inventory/items", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/inventory/items",
            Some(json!({ "sku": "RO-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let (status, body) = app
        .send_with_token(Method::GET, "/health", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "connected");
}

// ============================================================================
// Items
// ============================================================================

#[tokio::test]
async fn test_item_lifecycle() {
    let app = TestApp::new();

    let item = app
        .create_item(json!({
            "sku": "LAMP-01",
            "name": "Desk lamp",
            "category": "lighting",
            "cost": "12.50",
            "price": "29.99",
            "attributes": { "color": "black", "watts": 40 }
        }))
        .await;
    assert_eq!(item["sku"], "LAMP-01");
    assert_eq!(item["on_hand_qty"], 0);
    assert_eq!(item["available_qty"], 0);
    assert_eq!(item["reorder_point"], 5);
    assert_eq!(item["attributes"]["watts"], 40);
    assert_eq!(item["tenant_id"], app.tenant_id.to_string());

    let id = item["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/inventory/items/{}", id);

    let (status, updated) = app
        .send(Method::PUT, &uri, Some(json!({ "name": "Desk lamp v2" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Desk lamp v2");

    let (status, listed) = app.send(Method::GET, "/api/v1/inventory/items", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["pagination"]["total_items"], 1);

    let (status, _) = app.send(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.send(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, history) = app
        .send(Method::GET, &format!("{}/history", uri), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(history["item"]["deleted_at"].is_string());
}

#[tokio::test]
async fn test_duplicate_sku_is_conflict() {
    let app = TestApp::new();
    app.create_item(json!({ "sku": "DUP-1" })).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/inventory/items",
            Some(json!({ "sku": "DUP-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_SKU");
    assert_eq!(body["error"]["field"], "sku");
}

#[tokio::test]
async fn test_validation_error_names_field() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/inventory/items",
            Some(json!({ "sku": "NEG", "cost": "-3" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "cost");
}

#[tokio::test]
async fn test_update_rejects_quantities() {
    let app = TestApp::new();
    let item = app.create_item(json!({ "sku": "Q-1" })).await;
    let uri = format!("/api/v1/inventory/items/{}", item["id"].as_str().unwrap());

    let (status, body) = app
        .send(Method::PUT, &uri, Some(json!({ "on_hand_qty": 99 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "on_hand_qty");
}

// ============================================================================
// Movements and alerts
// ============================================================================

#[tokio::test]
async fn test_movements_drive_balance_and_alerts() {
    let app = TestApp::new();
    let item = app.create_item(json!({ "sku": "CHAIR" })).await;
    let id = item["id"].as_str().unwrap().to_string();
    let movements_uri = format!("/api/v1/inventory/items/{}/movements", id);

    let (status, recorded) = app
        .send(
            Method::POST,
            &movements_uri,
            Some(json!({ "movement_type": "IN", "quantity": 20, "unit_cost": "4.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(recorded["item"]["on_hand_qty"], 20);
    assert_eq!(recorded["movement"]["movement_type"], "IN");

    let (_, recorded) = app
        .send(
            Method::POST,
            &movements_uri,
            Some(json!({
                "movement_type": "OUT",
                "quantity": 16,
                "reference_type": "order",
                "reference_id": "SO-77"
            })),
        )
        .await;
    assert_eq!(recorded["item"]["on_hand_qty"], 4);
    assert_eq!(recorded["movement"]["reference_id"], "SO-77");

    let (status, alerts) = app.send(Method::GET, "/api/v1/inventory/alerts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alerts[0]["alert_type"], "LOW_STOCK");
    assert_eq!(alerts[0]["priority"], "MEDIUM");

    let (_, recorded) = app
        .send(
            Method::POST,
            &movements_uri,
            Some(json!({ "movement_type": "OUT", "quantity": 10 })),
        )
        .await;
    assert_eq!(recorded["item"]["on_hand_qty"], 0);
    assert_eq!(recorded["movement"]["quantity"], 10);

    let (_, alerts) = app.send(Method::GET, "/api/v1/inventory/alerts", None).await;
    assert_eq!(alerts[0]["alert_type"], "OUT_OF_STOCK");
    let alert_id = alerts[0]["id"].as_str().unwrap().to_string();

    let (status, acked) = app
        .send(
            Method::POST,
            &format!("/api/v1/inventory/alerts/{}/acknowledge", alert_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked, alerts);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/inventory/alerts/{}/resolve", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, feed) = app
        .send(Method::GET, &format!("{}?limit=2", movements_uri), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed.as_array().unwrap().len(), 2);
    assert_eq!(feed[0]["quantity"], 10);

    let (status, global) = app
        .send(Method::GET, "/api/v1/inventory/movements?order=asc", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(global.as_array().unwrap().len(), 3);
    assert_eq!(global[0]["quantity"], 20);

    let (status, check) = app
        .send(Method::GET, &format!("/api/v1/inventory/items/{}/verify", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["stored_qty"], 0);
    assert_eq!(check["replayed_qty"], 0);

    let (status, report) = app
        .send(Method::POST, "/api/v1/inventory/reconcile", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["checked_items"], 1);
    assert_eq!(report["discrepancies"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_invalid_movement_is_rejected() {
    let app = TestApp::new();
    let item = app.create_item(json!({ "sku": "DESK" })).await;
    let uri = format!(
        "/api/v1/inventory/items/{}/movements",
        item["id"].as_str().unwrap()
    );

    let (status, body) = app
        .send(
            Method::POST,
            &uri,
            Some(json!({ "movement_type": "OUT", "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "quantity");

    let (_, feed) = app.send(Method::GET, &uri, None).await;
    assert_eq!(feed.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_reserve_and_release() {
    let app = TestApp::new();
    let item = app
        .create_item(json!({ "sku": "SOFA", "on_hand_qty": 6 }))
        .await;
    let base = format!("/api/v1/inventory/items/{}", item["id"].as_str().unwrap());

    let (status, reserved) = app
        .send(
            Method::POST,
            &format!("{}/reserve", base),
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reserved["allocated_qty"], 4);
    assert_eq!(reserved["available_qty"], 2);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("{}/reserve", base),
            Some(json!({ "quantity": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, released) = app
        .send(
            Method::POST,
            &format!("{}/release", base),
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["allocated_qty"], 0);
    assert_eq!(released["available_qty"], 6);
}
