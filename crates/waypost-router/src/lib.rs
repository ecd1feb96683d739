//! # waypost-router
//!
//! Nested endpoint declarations compiled into a read-only route table.
//!
//! This crate provides:
//! - Static paths, required (`:name:`) and optional (`::name::`) parameters
//! - A table built once: exact-match statics plus regex buckets keyed by
//!   literal prefix, each bucket sharded for parallel search
//! - Per-route method sets, payloads and WebSocket upgrades
//! - Middleware that sees the resolved route
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use waypost_router::{Endpoint, Request, Response, RouteTable, Router};
//!
//! async fn hello(_req: Request, _: Arc<()>) -> Response {
//!     Response::text("Hello, World!")
//! }
//!
//! async fn user(req: Request, _: Arc<()>) -> Response {
//!     let id = req.params.get("id").unwrap_or("unknown");
//!     Response::json(&serde_json::json!({ "id": id }))
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let table = RouteTable::build(
//!     vec![
//!         Endpoint::new("/").handler(hello),
//!         Endpoint::new("/users").include(Endpoint::new(":id:").handler(user)),
//!     ],
//!     "",
//!     4,
//! );
//! let router = Router::new(table);
//!
//! let response = router.handle(Request::get("/users/123")).await;
//! assert_eq!(response.body_string().as_deref(), Some(r#"{"id":"123"}"#));
//! # }
//! ```
//!
//! ## Path Parameters
//!
//! A parameter token fills a whole segment. Optional parameters may only
//! be followed by other optional parameters:
//!
//! ```ignore
//! Endpoint::new("/files/::name::")
//! Endpoint::new("/api/:org:/repos/:repo:")
//! ```
//!
//! ## Precedence
//!
//! A static path always beats a pattern. Among patterns, the bucket with
//! the longest literal prefix is searched first, and inside a bucket the
//! first declared match wins however the bucket is sharded.

mod config;
mod endpoint;
mod error;
pub mod matcher;
mod middleware;
mod param;
mod path;
mod request;
mod response;
mod router;
mod table;
pub mod websocket;

pub use config::{RouterConfig, DEFAULT_MAX_JSON_BYTES};
pub use endpoint::{Endpoint, Handler, Route, WebSocketRoute, WsHandler};
pub use error::{Result, RouterError};
pub use futures::future::BoxFuture;
pub use middleware::{FnMiddleware, LoggingMiddleware, Middleware, MiddlewareResult};
pub use param::{ParamSyntax, Segment, PARAM_CLASS};
pub use path::{normalize, ParamIndexMap, PathPattern};
pub use request::{Method, PathParams, Request, RouteInfo, TrustedProxy};
pub use response::{Cookie, Response, SameSite};
pub use router::{Fallback, Router};
pub use table::{Resolved, RouteTable, RouteTableBuilder};
pub use websocket::{OnUpgrade, UpgradeError, WebSocket, WebSocketConfig, WsConnection};
