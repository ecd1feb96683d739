//! Serves a router on a real socket and talks to it over TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use waypost_router::{Endpoint, Method, Request, Response, RouteTable, Router, WebSocketConfig, WsConnection};
use waypost_server::ServerConfig;

async fn start(router: Router, max_body_bytes: usize) -> SocketAddr {
    let listener = waypost_server::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig::default().addr(addr).max_body_bytes(max_body_bytes);
    tokio::spawn(waypost_server::serve(listener, router, config));
    addr
}

async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    // The server may close without reading an oversized body; keep what arrived.
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).into_owned()
}

fn demo_router() -> Router {
    let table = RouteTable::build(
        vec![
            Endpoint::new("/users/:id:/posts").handler(|req: Request, _: Arc<()>| async move {
                let id = req.params.get("id").unwrap_or_default().to_string();
                let ip = req.client_ip(&[]).map(|ip| ip.to_string()).unwrap_or_default();
                Response::text(format!("{id} from {ip}"))
            }),
            Endpoint::new("/tags/:tag:").handler(|req: Request, _: Arc<()>| async move {
                Response::text(req.params.get("tag").unwrap_or_default().to_string())
            }),
            Endpoint::new("/upload")
                .methods([Method::Post])
                .handler(|req: Request, _: Arc<()>| async move {
                    Response::text(format!("{} bytes", req.body.len()))
                }),
            Endpoint::new("/ws").websocket(
                WebSocketConfig::new(),
                |_req: Request, conn: WsConnection, _: Arc<()>| async move {
                    let Ok(mut socket) = conn.into_socket() else {
                        return;
                    };
                    while let Some(Ok(msg)) = socket.next().await {
                        if msg.is_text() && socket.send(msg).await.is_err() {
                            break;
                        }
                    }
                },
            ),
        ],
        "",
        2,
    );
    Router::new(table)
}

#[tokio::test]
async fn test_http_round_trip() {
    let addr = start(demo_router(), 1024).await;
    let response = raw_request(
        addr,
        "GET /users/42/posts?x=1 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("42 from 127.0.0.1"), "{response}");
}

#[tokio::test]
async fn test_percent_encoded_path_resolves() {
    let addr = start(demo_router(), 1024).await;
    let response = raw_request(
        addr,
        "GET /tags/caf%C3%A9 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("café"), "{response}");
}

#[tokio::test]
async fn test_unknown_method_is_not_implemented() {
    let addr = start(demo_router(), 1024).await;
    let response = raw_request(
        addr,
        "BREW /nope HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 501"), "{response}");
}

#[tokio::test]
async fn test_not_found_and_method_not_allowed() {
    let addr = start(demo_router(), 1024).await;
    let response = raw_request(addr, "GET /nope HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    let response = raw_request(addr, "GET /upload HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 405"), "{response}");
}

#[tokio::test]
async fn test_body_limit() {
    let addr = start(demo_router(), 8).await;
    let response = raw_request(
        addr,
        "POST /upload HTTP/1.1\r\nHost: test\r\nContent-Length: 4\r\nConnection: close\r\n\r\nabcd",
    )
    .await;
    assert!(response.ends_with("4 bytes"), "{response}");

    let response = raw_request(
        addr,
        "POST /upload HTTP/1.1\r\nHost: test\r\nContent-Length: 16\r\nConnection: close\r\n\r\n0123456789abcdef",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 413"), "{response}");
}

#[tokio::test]
async fn test_websocket_echo() {
    let addr = start(demo_router(), 1024).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut socket, response) = tokio_tungstenite::client_async(format!("ws://{addr}/ws"), stream)
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 101);

    socket.send(Message::text("hello")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "hello");
}
