//! HTTP route tests for the delivery write path.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use tinymart_core::{channel, CorrelationKey};
use tinymart_proto::DeliveryStatus;
use tinymart_server::{
    config::ServerConfig,
    create_router,
    mutation::{CreatePurchase, IdInput},
    state::AppState,
};

/// Purchases 1 through 9 exist after setup.
fn setup() -> (AppState, TestServer) {
    let state = AppState::new(ServerConfig::default());
    for n in 1..=9u64 {
        state
            .deliveries
            .record_purchase(CreatePurchase {
                listing_id: IdInput::from(n),
                price: 10.0,
                bank_tx_id: format!("tx-{}", n),
                delivery_address: "1 Main St".to_string(),
            })
            .unwrap();
    }
    let server = TestServer::new(create_router(state.clone())).unwrap();
    (state, server)
}

#[tokio::test]
async fn test_health() {
    let (_, server) = setup();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body = response.json::<Value>();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["subscriptions"]["subscribers"], 0);
    assert_eq!(body["deliveries"], 0);
}

#[tokio::test]
async fn test_create_delivery_publishes() {
    let (state, server) = setup();
    let (tx, mut rx) = channel(4);
    state.registry.register(CorrelationKey::from("7"), tx);

    let response = server
        .post("/deliveries")
        .json(&json!({ "purchaseId": "7", "status": "PACKED" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let body = response.json::<Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["delivery"]["id"], 1);
    assert_eq!(body["delivery"]["purchaseId"], 7);
    assert_eq!(body["delivery"]["status"], "PACKED");

    let event = rx.try_recv().expect("event published");
    assert_eq!(event.delivery_id, 1);
    assert_eq!(event.status, DeliveryStatus::Packed);
}

#[tokio::test]
async fn test_create_delivery_rejects_bad_status() {
    let (state, server) = setup();
    let (tx, mut rx) = channel(4);
    state.registry.register(CorrelationKey::wildcard(), tx);

    let response = server
        .post("/deliveries")
        .json(&json!({ "purchaseId": 7, "status": "LOST" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert!(rx.try_recv().is_none());
}

#[tokio::test]
async fn test_create_delivery_for_unknown_purchase() {
    let (state, server) = setup();
    let (tx, mut rx) = channel(4);
    state.registry.register(CorrelationKey::wildcard(), tx);

    let response = server
        .post("/deliveries")
        .json(&json!({ "purchaseId": "42", "status": "PACKED" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");
    assert!(rx.try_recv().is_none());
    assert_eq!(state.deliveries.count(), 0);
}

#[tokio::test]
async fn test_create_and_get_purchase() {
    let (_, server) = setup();

    let response = server
        .post("/purchases")
        .json(&json!({
            "listingId": "4",
            "price": 49.5,
            "bankTxId": "tx-new",
            "deliveryAddress": "5 Elm St"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body = response.json::<Value>();
    assert_eq!(body["purchase"]["id"], 10);
    assert_eq!(body["purchase"]["listingId"], 4);

    let fetched = server.get("/purchases/10").await;
    assert_eq!(fetched.status_code(), StatusCode::OK);
    assert_eq!(fetched.json::<Value>()["purchase"]["bankTxId"], "tx-new");

    let delivery = server
        .post("/deliveries")
        .json(&json!({ "purchaseId": 10, "status": "PACKED" }))
        .await;
    assert_eq!(delivery.status_code(), StatusCode::CREATED);

    assert_eq!(server.get("/purchases/99").await.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_purchase_rejects_bad_input() {
    let (_, server) = setup();

    let response = server
        .post("/purchases")
        .json(&json!({
            "listingId": 4,
            "price": 10.0,
            "bankTxId": "tx",
            "deliveryAddress": "   "
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_and_get_deliveries() {
    let (_, server) = setup();
    for (purchase, status) in [("7", "PACKED"), ("9", "PACKED"), ("7", "delivered")] {
        let response = server
            .post("/deliveries")
            .json(&json!({ "purchaseId": purchase, "status": status }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }

    let all = server.get("/deliveries").await.json::<Value>();
    assert_eq!(all["count"], 3);

    let for_seven = server
        .get("/deliveries")
        .add_query_param("purchaseId", "7")
        .await
        .json::<Value>();
    assert_eq!(for_seven["count"], 2);

    let delivered = server
        .get("/deliveries")
        .add_query_param("status", "DELIVERED")
        .await
        .json::<Value>();
    assert_eq!(delivered["count"], 1);
    assert_eq!(delivered["deliveries"][0]["id"], 3);

    let one = server.get("/deliveries/2").await;
    assert_eq!(one.status_code(), StatusCode::OK);
    assert_eq!(one.json::<Value>()["delivery"]["purchaseId"], 9);
}

#[tokio::test]
async fn test_get_missing_delivery() {
    let (_, server) = setup();

    let response = server.get("/deliveries/42").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_list_rejects_bad_filter() {
    let (_, server) = setup();

    let response = server
        .get("/deliveries")
        .add_query_param("purchaseId", "abc")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}
