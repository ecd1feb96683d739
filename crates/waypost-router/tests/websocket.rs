//! WebSocket dispatch through `Router::handle` over in-memory streams.

mod common;
use common::*;

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use waypost_router::{Endpoint, Request, UpgradeError, WebSocketConfig, WsConnection};

async fn echo(_req: Request, conn: WsConnection, _payload: Arc<()>) {
    let Ok(mut socket) = conn.into_socket() else {
        return;
    };
    while let Some(Ok(msg)) = socket.next().await {
        if (msg.is_text() || msg.is_binary()) && socket.send(msg).await.is_err() {
            break;
        }
    }
}

#[tokio::test]
async fn test_echo_round_trip() {
    let router = router(vec![Endpoint::new("/ws").websocket(WebSocketConfig::new(), echo)]);
    let (server, client) = tokio::io::duplex(4096);

    let res = router.handle(ws_request("/ws", server)).await;
    assert_eq!(res.status, 101);
    assert_eq!(res.get_header("Upgrade"), Some("websocket"));

    let mut client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
    client.send(Message::text("ping")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "ping");
}

#[tokio::test]
async fn test_upgrade_to_plain_route_is_not_found() {
    let router = router(vec![Endpoint::new("/plain").handler(describe)]);
    let (server, _client) = tokio::io::duplex(64);
    let res = router.handle(ws_request("/plain", server)).await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn test_plain_request_to_websocket_only_route_is_not_found() {
    let router = router(vec![Endpoint::new("/ws").websocket(WebSocketConfig::new(), echo)]);
    let res = router.handle(Request::get("/ws")).await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn test_plain_post_to_websocket_only_route_is_not_allowed() {
    let router = router(vec![Endpoint::new("/ws").websocket(WebSocketConfig::new(), echo)]);
    let res = router.handle(Request::post("/ws")).await;
    assert_eq!(res.status, 405);
}

#[tokio::test]
async fn test_upgrade_skips_method_check() {
    let router = router(vec![Endpoint::new("/ws")
        .methods([waypost_router::Method::Post])
        .websocket(WebSocketConfig::new(), echo)]);
    let (server, _client) = tokio::io::duplex(64);
    let res = router.handle(ws_request("/ws", server)).await;
    assert_eq!(res.status, 101);
}

#[tokio::test]
async fn test_params_reach_websocket_handler() {
    let (tx, rx) = oneshot::channel::<String>();
    let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
    let router = router(vec![Endpoint::new("/rooms/:room:").websocket(
        WebSocketConfig::new(),
        move |req: Request, _conn: WsConnection, _: Arc<()>| {
            let tx = Arc::clone(&tx);
            async move {
                let room = req.params.get("room").unwrap_or_default().to_string();
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(room);
                }
            }
        },
    )]);
    let (server, _client) = tokio::io::duplex(64);
    let res = router.handle(ws_request("/rooms/lobby", server)).await;
    assert_eq!(res.status, 101);
    assert_eq!(rx.await.unwrap(), "lobby");
}

#[tokio::test]
async fn test_rejected_origin_reaches_handler_as_error() {
    let (tx, rx) = oneshot::channel::<bool>();
    let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
    let config = WebSocketConfig::new().allowed_origins(&["https://app.example"]);
    let router = router(vec![Endpoint::new("/ws").websocket(
        config,
        move |_req: Request, conn: WsConnection, _: Arc<()>| {
            let tx = Arc::clone(&tx);
            async move {
                let refused = matches!(conn.error(), Some(UpgradeError::Origin(_)));
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(refused);
                }
            }
        },
    )]);
    let (server, _client) = tokio::io::duplex(64);
    let req = ws_request("/ws", server).header("Origin", "https://evil.example");
    let res = router.handle(req).await;
    assert_eq!(res.status, 403);
    assert!(rx.await.unwrap());
}
