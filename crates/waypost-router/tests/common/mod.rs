#![allow(dead_code)]

use std::sync::Arc;

use waypost_router::websocket::Io;
use waypost_router::{Endpoint, OnUpgrade, Request, Response, RouteTable, Router};

/// Handler that echoes the resolved route and parameters as JSON.
pub async fn describe(req: Request, _payload: Arc<()>) -> Response {
    let params: serde_json::Map<String, serde_json::Value> = req
        .params
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
        .collect();
    Response::json(&serde_json::json!({
        "route": req.route.map(|r| r.full_name),
        "params": params,
    }))
}

pub fn table(endpoints: Vec<Endpoint>) -> RouteTable<()> {
    RouteTable::build(endpoints, "", 4)
}

pub fn router(endpoints: Vec<Endpoint>) -> Router {
    Router::new(table(endpoints))
}

pub async fn body_json(router: &Router, req: Request) -> serde_json::Value {
    let res = router.handle(req).await;
    assert_eq!(res.status, 200, "unexpected status for request");
    serde_json::from_slice(&res.body)
        .unwrap_or_else(|e| panic!("Response is not JSON: {e}"))
}

/// A handshake request whose upgrade resolves to `server`.
pub fn ws_request<S: Io>(path: &str, server: S) -> Request {
    Request::get(path)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .with_upgrade(OnUpgrade::new(async move { Ok(Box::new(server) as Box<dyn Io>) }))
}
