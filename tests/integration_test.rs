use axum::http::{header, Request, StatusCode};
use axum::body::Body;
use catalog::api::{self, AppState};
use catalog::db::repo::{MockCategoryStore, MockHealthCheck, MockProductStore};
use catalog::{ErrorKind, Product};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn product(id: &str, name: &str) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        category_id: 1,
        description: "Solid oak".to_string(),
        image_id: "img-1".to_string(),
        price: "120.00".to_string(),
        currency_id: 1,
        rating: "4.5".to_string(),
        specifications: "{}".to_string(),
        created_at: "2024-01-01 00:00:00+00".to_string(),
        updated_at: "2024-01-01 00:00:00+00".to_string(),
    }
}

fn setup_app(products: MockProductStore, health: MockHealthCheck) -> axum::Router {
    let categories = MockCategoryStore::new()
        .with_category(1, "Furniture")
        .with_category(2, "Lighting");
    let state = AppState::new(
        Arc::new(products),
        Arc::new(categories),
        Arc::new(health),
        Duration::from_secs(5),
    );
    api::create_router(state, &["http://localhost:3000".to_string()])
}

fn default_app() -> axum::Router {
    setup_app(
        MockProductStore::new()
            .with_categories(vec![1, 2])
            .with_product(product("p-1", "Desk")),
        MockHealthCheck::up(),
    )
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, body) = send(default_app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ready_endpoint() {
    let (status, body) = send(default_app(), get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_ready_when_database_down() {
    let app = setup_app(MockProductStore::new(), MockHealthCheck::down());
    let (status, body) = send(app, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("database not ready"));
}

#[tokio::test]
async fn test_heartbeat_endpoint() {
    let (status, _) = send(default_app(), get("/api/heartbeat")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_list_products_returns_summaries() {
    let (status, body) = send(default_app(), get("/v1/products")).await;
    assert_eq!(status, StatusCode::OK);

    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], "p-1");
    assert_eq!(list[0]["name"], "Desk");
    assert_eq!(list[0]["price"], "120.00");
    assert!(list[0].get("rating").is_none());
    assert!(list[0].get("category_id").is_none());
}

#[tokio::test]
async fn test_list_products_empty_is_empty_array() {
    let app = setup_app(MockProductStore::new(), MockHealthCheck::up());
    let (status, body) = send(app, get("/v1/products")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn test_get_product() {
    let (status, body) = send(default_app(), get("/v1/products/p-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rating"], "4.5");
    assert_eq!(body["category_id"], 1);
}

#[tokio::test]
async fn test_get_missing_product_is_404() {
    let (status, body) = send(default_app(), get("/v1/products/p-404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "product not found");
}

#[tokio::test]
async fn test_create_product() {
    let request = json_request(
        "POST",
        "/v1/products",
        serde_json::json!({
            "name": "Lamp",
            "category_id": 2,
            "description": "Brass",
            "image_id": "img-2",
            "price": "35.00",
            "currency_id": 1
        }),
    );
    let response = default_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("/v1/products/p-"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let created: Product = serde_json::from_slice(&body).unwrap();
    assert_eq!(created.name, "Lamp");
    assert_eq!(location, format!("/v1/products/{}", created.id));
}

#[tokio::test]
async fn test_create_duplicate_is_conflict() {
    let request = json_request(
        "POST",
        "/v1/products",
        serde_json::json!({
            "name": "Desk",
            "category_id": 1,
            "description": "Again",
            "image_id": "img-1",
            "price": "1.00",
            "currency_id": 1
        }),
    );
    let (status, _) = send(default_app(), request).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_with_unknown_category_is_unprocessable() {
    let request = json_request(
        "POST",
        "/v1/products",
        serde_json::json!({
            "name": "Chair",
            "category_id": 42,
            "description": "Pine",
            "image_id": "img-3",
            "price": "50.00",
            "currency_id": 1
        }),
    );
    let (status, body) = send(default_app(), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("missing record"));
}

#[tokio::test]
async fn test_create_with_empty_name_is_bad_request() {
    let request = json_request(
        "POST",
        "/v1/products",
        serde_json::json!({
            "name": " ",
            "category_id": 1,
            "description": "",
            "image_id": "",
            "price": "1.00",
            "currency_id": 1
        }),
    );
    let (status, _) = send(default_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_product() {
    let request = json_request(
        "PATCH",
        "/v1/products/p-1",
        serde_json::json!({ "price": "99.00" }),
    );
    let (status, body) = send(default_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], "99.00");
    assert_eq!(body["name"], "Desk");
    assert_eq!(body["created_at"], "2024-01-01 00:00:00+00");
    assert_ne!(body["updated_at"], "2024-01-01 00:00:00+00");
}

#[tokio::test]
async fn test_update_without_fields_is_bad_request() {
    let request = json_request("PATCH", "/v1/products/p-1", serde_json::json!({}));
    let (status, _) = send(default_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_product() {
    let app = default_app();
    let request = Request::builder()
        .method("DELETE")
        .uri("/v1/products/p-1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(app, get("/v1/products/p-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unclassified_failure_is_500_without_details() {
    let app = setup_app(
        MockProductStore::new().with_failure(ErrorKind::Unclassified),
        MockHealthCheck::up(),
    );
    let (status, body) = send(app, get("/v1/products")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "database error");
}

#[tokio::test]
async fn test_cancelled_query_is_gateway_timeout() {
    let app = setup_app(
        MockProductStore::new().with_cancellation(),
        MockHealthCheck::up(),
    );
    let (status, _) = send(app, get("/v1/products")).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_categories() {
    let (status, body) = send(default_app(), get("/v1/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(default_app(), get("/v1/categories/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Lighting");

    let (status, _) = send(default_app(), get("/v1/categories/9")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/products")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = default_app().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );
}
