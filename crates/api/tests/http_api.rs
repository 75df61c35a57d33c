//! End-to-end HTTP tests over the in-memory backend.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::util::ServiceExt;

async fn app() -> Router {
    eventhire_api::app::build_app("test-secret".to_string()).await
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
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
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Login with the seeded bootstrap administrator.
async fn admin_token(app: &Router) -> String {
    let (status, body) = request(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "changeme123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "admin login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

/// Projections are fed asynchronously; poll until the product stock settles.
async fn wait_for_stock(app: &Router, token: &str, product_id: &str, expected: i64) {
    for _ in 0..100 {
        let (status, body) =
            request(app, "GET", &format!("/products/{product_id}"), Some(token), None).await;
        if status == StatusCode::OK && body["stock"].as_i64() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("product {product_id} never reached stock {expected}");
}

#[tokio::test]
async fn health_is_public_and_everything_else_requires_a_token() {
    let app = app().await;

    let (status, _) = request(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(&app, "GET", "/whoami", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(&app, "GET", "/products", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bootstrap_admin_can_login_and_introspect() {
    let app = app().await;

    let (status, _) = request(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = admin_token(&app).await;
    let (status, body) = request(&app, "GET", "/whoami", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "admin");
    assert_eq!(body["group"], "elevated");
}

#[tokio::test]
async fn product_create_shows_up_in_the_catalog() {
    let app = app().await;
    let token = admin_token(&app).await;

    let (status, body) = request(
        &app,
        "POST",
        "/products",
        Some(&token),
        Some(json!({
            "name": "Round table",
            "category": "furniture",
            "unit_price": 1500,
            "initial_stock": 12,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let product_id = body["id"].as_str().unwrap().to_string();

    wait_for_stock(&app, &token, &product_id, 12).await;

    let (status, body) =
        request(&app, "GET", &format!("/products/{product_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Round table");
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn incident_lifecycle_moves_stock_through_the_api() {
    let app = app().await;
    let token = admin_token(&app).await;

    let (status, body) = request(
        &app,
        "POST",
        "/products",
        Some(&token),
        Some(json!({
            "name": "Folding chair",
            "category": "furniture",
            "unit_price": 300,
            "initial_stock": 10,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let product_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "POST",
        "/customers",
        Some(&token),
        Some(json!({
            "first_name": "Nadia",
            "last_name": "Haddad",
            "contact": { "email": "nadia@example.com" },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let customer_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "POST",
        "/rentals",
        Some(&token),
        Some(json!({ "customer_id": customer_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let order_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "POST",
        &format!("/rentals/{order_id}/lines"),
        Some(&token),
        Some(json!({ "product_id": product_id, "quantity": 4, "unit_price": 300 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let line_item_id = body["line_item_id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "POST",
        &format!("/rentals/{order_id}/confirm"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // Damage report: debits stock by the affected quantity.
    let (status, body) = request(
        &app,
        "POST",
        "/incidents",
        Some(&token),
        Some(json!({
            "order_id": order_id,
            "line_item_id": line_item_id,
            "damage_kind": "repairable",
            "affected_quantity": 3,
            "description": "chairs came back cracked",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "open");
    let incident_id = body["id"].as_str().unwrap().to_string();

    wait_for_stock(&app, &token, &product_id, 7).await;

    // The order cannot be closed or cancelled while the incident is open.
    let mut visible = false;
    for _ in 0..100 {
        let (status, _) = request(
            &app,
            "GET",
            &format!("/incidents/{incident_id}"),
            Some(&token),
            None,
        )
        .await;
        if status == StatusCode::OK {
            visible = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(visible, "incident never reached the read model");

    let (status, body) = request(
        &app,
        "POST",
        &format!("/rentals/{order_id}/close"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["error"], "open_incidents");

    let (status, body) = request(
        &app,
        "POST",
        &format!("/rentals/{order_id}/cancel"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["error"], "open_incidents");

    // Capacity is bounded by the line quantity (4), 3 already open.
    let (status, body) = request(
        &app,
        "POST",
        "/incidents",
        Some(&token),
        Some(json!({
            "order_id": order_id,
            "line_item_id": line_item_id,
            "damage_kind": "irreparable",
            "affected_quantity": 2,
            "description": "two never returned",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["error"], "capacity_exceeded");

    let (status, body) = request(
        &app,
        "POST",
        &format!("/incidents/{incident_id}/resolve"),
        Some(&token),
        Some(json!({ "outcome": "restocked" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "resolved");
    assert_eq!(body["outcome"], "restocked");

    wait_for_stock(&app, &token, &product_id, 10).await;

    // Resolution clears the guard; wait for the read model, then close.
    let mut resolved = false;
    for _ in 0..100 {
        let (status, body) = request(
            &app,
            "GET",
            &format!("/incidents/{incident_id}"),
            Some(&token),
            None,
        )
        .await;
        if status == StatusCode::OK && body["status"] == "resolved" {
            resolved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(resolved, "incident never resolved in the read model");

    let (status, body) = request(
        &app,
        "POST",
        &format!("/rentals/{order_id}/close"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn standard_staff_cannot_resolve_incidents() {
    let app = app().await;
    let admin = admin_token(&app).await;

    let (status, body) = request(
        &app,
        "POST",
        "/employees",
        Some(&admin),
        Some(json!({
            "username": "clerk1",
            "display_name": "Counter Clerk",
            "email": "clerk1@example.com",
            "role": "clerk",
            "password": "clerk-pass-123",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    // Wait for the staff projection to pick the new account up. Failed login
    // attempts count toward the lockout, so poll the read model instead.
    let mut seen = false;
    for _ in 0..100 {
        let (status, body) = request(&app, "GET", "/employees", Some(&admin), None).await;
        if status == StatusCode::OK
            && body["employees"]
                .as_array()
                .unwrap()
                .iter()
                .any(|e| e["username"] == "clerk1")
        {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(seen, "clerk1 never appeared in the staff read model");

    let (status, body) = request(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "clerk1", "password": "clerk-pass-123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = request(&app, "GET", "/whoami", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group"], "standard");

    // Guard fires before the engine is consulted.
    let incident_id = uuid::Uuid::now_v7();
    let (status, _) = request(
        &app,
        "POST",
        &format!("/incidents/{incident_id}/resolve"),
        Some(&token),
        Some(json!({ "outcome": "restocked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
