use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use canvas_collab::collab::{service, CollabLimits, Coordinator, CoordinatorHandle};
use canvas_collab::config::Config;
use canvas_collab::routes::create_app;
use canvas_collab::services::auth_service::JwtVerifier;
use canvas_collab::state::AppState;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn token(sub: &str, name: &str, roles: &[&str]) -> String {
    let claims = json!({
        "sub": sub,
        "name": name,
        "type": "user",
        "roles": roles,
        "exp": Utc::now().timestamp() + 3600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn app_state(limits: CollabLimits) -> (AppState, CoordinatorHandle) {
    let config = Config {
        auth_jwt_secret: Some(SECRET.to_string()),
        max_members_per_room: limits.max_members_per_room,
        max_rooms_per_user: limits.max_rooms_per_user,
        ..Config::default()
    };
    let (handle, _task) = service::spawn(Coordinator::new(limits), config.sweep_interval(), 64);
    let state = AppState {
        config: Arc::new(config),
        coordinator: handle.clone(),
        verifier: Arc::new(JwtVerifier::new(Some(SECRET.to_string()))),
    };
    (state, handle)
}

async fn start_server(limits: CollabLimits) -> (SocketAddr, CoordinatorHandle) {
    let (state, handle) = app_state(limits);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_app(state)).await.unwrap();
    });
    (addr, handle)
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let url = format!("ws://{}/ws?token={}", addr, token(user, &user.to_uppercase(), &[]));
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Client, msg: Value) {
    ws.send(Message::text(msg.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    if let Ok(Some(Ok(frame))) = timeout(Duration::from_millis(200), ws.next()).await {
        panic!("Expected no message, got {frame:?}");
    }
}

async fn join(ws: &mut Client, room: &str) -> Value {
    send(ws, json!({"type": "join-room", "roomId": room})).await;
    let reply = recv(ws).await;
    assert_eq!(reply["type"], "room-members");
    reply
}

#[tokio::test]
async fn test_lock_relay_and_disconnect_flow() {
    let (addr, handle) = start_server(CollabLimits::default()).await;
    let mut a = connect(addr, "alice").await;
    let mut b = connect(addr, "bob").await;

    // A joins an empty room, then B joins
    let snapshot = join(&mut a, "page-1").await;
    assert_eq!(snapshot["members"], json!([]));

    let snapshot = join(&mut b, "page-1").await;
    assert_eq!(snapshot["members"], json!([{"userId": "alice", "displayName": "ALICE"}]));
    let joined = recv(&mut a).await;
    assert_eq!(joined["type"], "user-joined");
    assert_eq!(joined["userId"], "bob");

    // A locks, B is told and can't take it
    send(&mut a, json!({"type": "lock-element", "elementId": "el-42"})).await;
    let ack = recv(&mut a).await;
    assert_eq!(ack, json!({"type": "element-locked", "elementId": "el-42", "userId": "alice"}));
    let locked = recv(&mut b).await;
    assert_eq!(locked, json!({"type": "element-locked", "elementId": "el-42", "userId": "alice"}));

    send(&mut b, json!({"type": "lock-element", "elementId": "el-42"})).await;
    let denied = recv(&mut b).await;
    assert_eq!(denied, json!({"type": "element-lock-denied", "elementId": "el-42", "owner": "alice"}));
    assert_silent(&mut a).await;

    // Holder's update reaches B only
    send(
        &mut a,
        json!({"type": "element-update", "elementId": "el-42", "updates": {"x": 10}, "timestamp": 1000}),
    )
    .await;
    let updated = recv(&mut b).await;
    assert_eq!(updated["type"], "element-updated");
    assert_eq!(updated["userId"], "alice");
    assert_eq!(updated["updates"], json!({"x": 10}));
    assert_eq!(updated["timestamp"], 1000);
    assert_silent(&mut a).await;

    // Non-holder's update is refused without telling A
    send(&mut b, json!({"type": "element-update", "elementId": "el-42", "updates": {"x": 99}})).await;
    let denied = recv(&mut b).await;
    assert_eq!(denied["type"], "element-lock-denied");
    assert_eq!(denied["owner"], "alice");
    assert_silent(&mut a).await;

    // A goes away: B sees the departure, then the lock release
    a.close(None).await.unwrap();
    drop(a);
    let left = recv(&mut b).await;
    assert_eq!(left["type"], "user-left");
    assert_eq!(left["userId"], "alice");
    let unlocked = recv(&mut b).await;
    assert_eq!(unlocked, json!({"type": "element-unlocked", "elementId": "el-42", "userId": "alice"}));

    send(&mut b, json!({"type": "lock-element", "elementId": "el-42"})).await;
    let ack = recv(&mut b).await;
    assert_eq!(ack, json!({"type": "element-locked", "elementId": "el-42", "userId": "bob"}));

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.locks, 1);
}

#[tokio::test]
async fn test_presence_is_not_echoed_to_sender() {
    let (addr, _handle) = start_server(CollabLimits::default()).await;
    let mut a = connect(addr, "alice").await;
    let mut b = connect(addr, "bob").await;
    join(&mut a, "page-1").await;
    join(&mut b, "page-1").await;
    recv(&mut a).await; // user-joined

    send(&mut a, json!({"type": "cursor-move", "x": 1.5, "y": 2.0})).await;
    let moved = recv(&mut b).await;
    assert_eq!(moved["type"], "cursor-moved");
    assert_eq!(moved["userId"], "alice");
    assert_eq!(moved["displayName"], "ALICE");
    assert_eq!(moved["x"], 1.5);

    send(&mut a, json!({"type": "typing-start", "elementId": "el-1"})).await;
    assert_eq!(recv(&mut b).await, json!({"type": "user-typing", "elementId": "el-1", "userId": "alice"}));
    send(&mut a, json!({"type": "typing-stop"})).await;
    assert_eq!(recv(&mut b).await, json!({"type": "user-stopped-typing", "userId": "alice"}));

    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_full_room_rejects_join() {
    let limits = CollabLimits {
        max_members_per_room: 1,
        ..CollabLimits::default()
    };
    let (addr, _handle) = start_server(limits).await;
    let mut a = connect(addr, "alice").await;
    let mut b = connect(addr, "bob").await;
    join(&mut a, "page-1").await;

    send(&mut b, json!({"type": "join-room", "roomId": "page-1"})).await;
    assert_eq!(
        recv(&mut b).await,
        json!({"type": "join-rejected", "roomId": "page-1", "reason": "room-full", "limit": 1})
    );
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_bad_frames_get_an_error_reply() {
    let (addr, _handle) = start_server(CollabLimits::default()).await;
    let mut a = connect(addr, "alice").await;

    a.send(Message::text("not json")).await.unwrap();
    let reply = recv(&mut a).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "invalid-message");

    // The connection stays usable
    send(&mut a, json!({"type": "ping"})).await;
    assert_eq!(recv(&mut a).await["type"], "pong");
}

#[tokio::test]
async fn test_logout_closes_the_socket() {
    let (addr, handle) = start_server(CollabLimits::default()).await;
    let mut a = connect(addr, "alice").await;
    join(&mut a, "page-1").await;

    send(&mut a, json!({"type": "logout"})).await;
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match a.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_eq!(handle.stats().await.unwrap().connections, 0);
}

#[tokio::test]
async fn test_handshake_without_valid_token_is_rejected() {
    let (addr, handle) = start_server(CollabLimits::default()).await;

    for url in [
        format!("ws://{}/ws", addr),
        format!("ws://{}/ws?token=garbage", addr),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED)
            }
            Err(e) => panic!("Expected 401, got {e}"),
            Ok(_) => panic!("Expected 401, handshake succeeded"),
        }
    }
    assert_eq!(handle.stats().await.unwrap().connections, 0);
}

#[tokio::test]
async fn test_health_and_ready() {
    let (state, _handle) = app_state(CollabLimits::default());
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");

    let response = app
        .oneshot(Request::get("/api/v1/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ready_reports_stopped_coordinator() {
    let (state, handle) = app_state(CollabLimits::default());
    handle.shutdown().await;
    while handle.is_running() {
        tokio::task::yield_now().await;
    }

    let response = create_app(state)
        .oneshot(Request::get("/api/v1/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_diagnostics_requires_admin() {
    let (state, _handle) = app_state(CollabLimits::default());
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(Request::get("/api/v1/diagnostics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/diagnostics")
                .header(header::AUTHORIZATION, format!("Bearer {}", token("bob", "Bob", &[])))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::get("/api/v1/diagnostics")
                .header(header::COOKIE, format!("auth_token={}", token("root", "Root", &["admin"])))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["n_conn"], 0);
    assert_eq!(body["n_rooms"], 0);
}
