//! End-to-end subscription tests over a real WebSocket connection.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tinymart_server::{
    config::ServerConfig,
    create_router,
    mutation::{CreateDelivery, CreatePurchase, IdInput},
    state::AppState,
    SUBSCRIPTION_PATH,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

async fn start_server() -> (AppState, String) {
    let config = ServerConfig::new("127.0.0.1:0").with_shutdown_grace(Duration::from_millis(500));
    let state = AppState::new(config);
    for n in 1..=9u64 {
        state
            .deliveries
            .record_purchase(CreatePurchase {
                listing_id: IdInput::from(n),
                price: 10.0,
                bank_tx_id: format!("tx-{}", n),
                delivery_address: format!("{} Main St", n),
            })
            .unwrap();
    }
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, format!("ws://{}{}", addr, SUBSCRIPTION_PATH))
}

async fn connect(url: &str) -> Client {
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", HeaderValue::from_static("graphql-ws"));
    let (client, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok()),
        Some("graphql-ws")
    );
    client
}

async fn send(client: &mut Client, message: Value) {
    client
        .send(Message::text(message.to_string()))
        .await
        .unwrap();
}

async fn recv(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("read error");
        if frame.is_text() {
            return serde_json::from_str(frame.to_text().unwrap()).unwrap();
        }
    }
}

async fn assert_quiet(client: &mut Client) {
    let frame = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(frame.is_err(), "unexpected frame: {:?}", frame);
}

async fn wait_for_subscribers(state: &AppState, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while state.registry.subscriber_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {} subscribers, found {}",
            expected,
            state.registry.subscriber_count()
        )
    });
}

fn start(id: &str, purchase_id: Option<&str>) -> Value {
    let mut payload = json!({
        "query": "subscription Deliveries($purchaseId: ID) { deliveryUpdated(purchaseId: $purchaseId) { id purchaseId status timestamp } }",
    });
    if let Some(purchase_id) = purchase_id {
        payload["variables"] = json!({ "purchaseId": purchase_id });
    }
    json!({ "type": "start", "id": id, "payload": payload })
}

async fn init(client: &mut Client) {
    send(client, json!({ "type": "connection_init", "payload": {} })).await;
    assert_eq!(recv(client).await, json!({ "type": "connection_ack" }));
}

fn record(state: &AppState, purchase_id: &str, status: &str) {
    state
        .deliveries
        .record_status(CreateDelivery::new(purchase_id, status))
        .unwrap();
}

#[tokio::test]
async fn test_keyed_and_wildcard_subscriptions() {
    let (state, url) = start_server().await;
    let mut client = connect(&url).await;
    init(&mut client).await;

    send(&mut client, start("s1", Some("7"))).await;
    wait_for_subscribers(&state, 1).await;

    record(&state, "7", "PACKED");
    let message = recv(&mut client).await;
    assert_eq!(message["type"], "data");
    assert_eq!(message["id"], "s1");
    let delivery = &message["payload"]["data"]["deliveryUpdated"];
    assert_eq!(delivery["id"], "1");
    assert_eq!(delivery["purchaseId"], "7");
    assert_eq!(delivery["status"], "PACKED");
    assert_eq!(delivery["purchase"]["id"], "7");
    assert_eq!(delivery["purchase"]["deliveryAddress"], "7 Main St");
    assert_quiet(&mut client).await;

    send(&mut client, start("s2", None)).await;
    wait_for_subscribers(&state, 2).await;

    record(&state, "9", "OUT_FOR_DELIVERY");
    let message = recv(&mut client).await;
    assert_eq!(message["type"], "data");
    assert_eq!(message["id"], "s2");
    assert_eq!(message["payload"]["data"]["deliveryUpdated"]["purchaseId"], "9");
    assert_quiet(&mut client).await;

    send(&mut client, json!({ "type": "stop", "id": "s1" })).await;
    assert_eq!(recv(&mut client).await, json!({ "type": "complete", "id": "s1" }));
    wait_for_subscribers(&state, 1).await;

    record(&state, "7", "DELIVERED");
    let message = recv(&mut client).await;
    assert_eq!(message["id"], "s2");
    assert_quiet(&mut client).await;
}

#[tokio::test]
async fn test_restarted_subscription_keeps_receiving() {
    let (state, url) = start_server().await;
    let mut client = connect(&url).await;
    init(&mut client).await;

    for round in 1..=20 {
        send(&mut client, start("s1", Some("07"))).await;
        send(&mut client, json!({ "type": "stop", "id": "s1" })).await;
        send(&mut client, start("s1", Some("7"))).await;
        assert_eq!(recv(&mut client).await, json!({ "type": "complete", "id": "s1" }));
        wait_for_subscribers(&state, 1).await;

        record(&state, "7", "PACKED");
        let message = recv(&mut client).await;
        assert_eq!(message["type"], "data", "round {}", round);
        assert_eq!(message["payload"]["data"]["deliveryUpdated"]["id"], round.to_string());

        send(&mut client, json!({ "type": "stop", "id": "s1" })).await;
        assert_eq!(recv(&mut client).await, json!({ "type": "complete", "id": "s1" }));
        wait_for_subscribers(&state, 0).await;
    }
}

#[tokio::test]
async fn test_events_arrive_in_write_order() {
    let (state, url) = start_server().await;
    let mut client = connect(&url).await;
    init(&mut client).await;

    send(&mut client, start("s1", Some("7"))).await;
    wait_for_subscribers(&state, 1).await;

    for status in ["PACKED", "OUT_FOR_DELIVERY", "DELIVERED"] {
        record(&state, "7", status);
    }
    let mut statuses = Vec::new();
    for _ in 0..3 {
        let message = recv(&mut client).await;
        statuses.push(message["payload"]["data"]["deliveryUpdated"]["status"].clone());
    }
    assert_eq!(
        statuses,
        vec![json!("PACKED"), json!("OUT_FOR_DELIVERY"), json!("DELIVERED")]
    );
}

#[tokio::test]
async fn test_protocol_errors_do_not_close_connection() {
    let (state, url) = start_server().await;
    let mut client = connect(&url).await;

    send(&mut client, start("early", Some("7"))).await;
    let message = recv(&mut client).await;
    assert_eq!(message["type"], "error");
    assert_eq!(message["id"], "early");
    assert_eq!(message["payload"]["message"], "connection not initialised");

    init(&mut client).await;

    client.send(Message::text("{not json")).await.unwrap();
    let message = recv(&mut client).await;
    assert_eq!(message["type"], "error");
    assert!(message.get("id").is_none());

    send(&mut client, json!({ "type": "start", "id": "s1", "payload": { "query": "" } })).await;
    let message = recv(&mut client).await;
    assert_eq!(message["type"], "error");
    assert_eq!(message["id"], "s1");

    send(&mut client, json!({ "type": "stop", "id": "never-started" })).await;
    send(&mut client, start("s2", Some("7"))).await;
    wait_for_subscribers(&state, 1).await;
    record(&state, "7", "PACKED");
    assert_eq!(recv(&mut client).await["id"], "s2");
}

#[tokio::test]
async fn test_disconnect_releases_every_subscription() {
    let (state, url) = start_server().await;
    let mut client = connect(&url).await;
    init(&mut client).await;

    send(&mut client, start("a", Some("1"))).await;
    send(&mut client, start("b", Some("2"))).await;
    send(&mut client, start("c", None)).await;
    wait_for_subscribers(&state, 3).await;

    drop(client);
    wait_for_subscribers(&state, 0).await;
    assert_eq!(state.registry.key_count(), 0);
}

#[tokio::test]
async fn test_terminate_closes_connection() {
    let (state, url) = start_server().await;
    let mut client = connect(&url).await;
    init(&mut client).await;

    send(&mut client, start("a", Some("1"))).await;
    wait_for_subscribers(&state, 1).await;

    send(&mut client, json!({ "type": "connection_terminate" })).await;
    wait_for_subscribers(&state, 0).await;

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                None | Some(Err(_)) => break,
                Some(Ok(frame)) if frame.is_close() => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server did not close the connection");
}
