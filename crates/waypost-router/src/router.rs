//! Request dispatch.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::endpoint::Route;
use crate::middleware::{Middleware, MiddlewareResult};
use crate::request::Request;
use crate::response::Response;
use crate::table::{Resolved, RouteTable};
use crate::websocket;

/// Handler for requests that end without reaching a route handler. The
/// payload is present for method-not-allowed and absent for not-found.
pub type Fallback<P> =
    Arc<dyn Fn(Request, Option<Arc<P>>) -> BoxFuture<'static, Response> + Send + Sync>;

fn fallback<P, F, Fut>(f: F) -> Fallback<P>
where
    F: Fn(Request, Option<Arc<P>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req, payload| Box::pin(f(req, payload)))
}

/// Dispatches requests against a [`RouteTable`].
pub struct Router<P = ()> {
    table: Arc<RouteTable<P>>,
    middleware: Vec<Arc<dyn Middleware>>,
    not_found: Fallback<P>,
    method_not_allowed: Fallback<P>,
    max_json_bytes: Option<usize>,
}

impl<P: Send + Sync + 'static> Router<P> {
    /// Creates a router over `table` with default 404 and 405 responses.
    pub fn new(table: RouteTable<P>) -> Self {
        Self {
            table: Arc::new(table),
            middleware: Vec::new(),
            not_found: fallback(|_, _| async { Response::not_found() }),
            method_not_allowed: fallback(|_, _| async { Response::method_not_allowed() }),
            max_json_bytes: None,
        }
    }

    /// Creates a router that applies the limits in `config`.
    pub fn with_config(table: RouteTable<P>, config: &RouterConfig) -> Self {
        Self {
            max_json_bytes: Some(config.max_json_bytes),
            ..Self::new(table)
        }
    }

    /// Adds middleware. Middleware runs in registration order.
    #[must_use]
    pub fn middleware(mut self, mw: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(mw));
        self
    }

    /// Replaces the not-found handler.
    #[must_use]
    pub fn not_found<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Option<Arc<P>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.not_found = fallback(f);
        self
    }

    /// Replaces the method-not-allowed handler.
    #[must_use]
    pub fn method_not_allowed<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Option<Arc<P>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.method_not_allowed = fallback(f);
        self
    }

    /// The route table.
    pub fn table(&self) -> &RouteTable<P> {
        &self.table
    }

    /// Handles an incoming request.
    pub async fn handle(&self, mut request: Request) -> Response {
        request.json_limit = self.max_json_bytes;
        let route = self.resolve(&mut request).await;

        let mut early = Response::ok();
        for (i, mw) in self.middleware.iter().enumerate() {
            if mw.before(&mut request, &mut early).await == MiddlewareResult::Halt {
                debug!(path = %request.path, "Request halted by middleware");
                return finish(&self.middleware[..=i], early).await;
            }
        }

        let response = match route {
            None => {
                debug!(method = %request.method, path = %request.path, "No route matched");
                (self.not_found)(request, None).await
            }
            Some(route) if request.is_websocket() => self.upgrade(request, &route),
            Some(route) if !route.is_method_allowed(request.method) => {
                debug!(
                    method = %request.method,
                    route = %route.full_name(),
                    "Method not allowed"
                );
                (self.method_not_allowed)(request, Some(Arc::clone(route.payload()))).await
            }
            Some(route) => match route.handler() {
                Some(handler) => handler(request, Arc::clone(route.payload())).await,
                None => {
                    debug!(route = %route.full_name(), "Route has no HTTP handler");
                    (self.not_found)(request, None).await
                }
            },
        };

        finish(&self.middleware, merge_headers(early, response)).await
    }

    /// Looks the path up and records the route on the request. An upgrade
    /// request to a route without WebSocket settings counts as no route.
    async fn resolve(&self, request: &mut Request) -> Option<Arc<Route<P>>> {
        let Resolved { route, params } = self.table.resolve(&request.path).await?;
        if request.is_websocket() && route.websocket().is_none() {
            debug!(
                path = %request.path,
                route = %route.full_name(),
                "Route does not accept upgrades"
            );
            return None;
        }
        request.params = params;
        request.route = Some(route.info().clone());
        Some(route)
    }

    /// Answers the handshake and runs the WebSocket handler on its own task.
    fn upgrade(&self, mut request: Request, route: &Arc<Route<P>>) -> Response {
        let Some(ws) = route.websocket().cloned() else {
            warn!(route = %route.full_name(), "Upgrade dispatched to a route without WebSocket");
            return Response::not_found();
        };
        let upgrade = websocket::upgrade(&mut request, &ws.config);
        let payload = Arc::clone(route.payload());
        let connection = upgrade.connection;
        tokio::spawn(async move {
            let conn = connection.await;
            (ws.handler)(request, conn, payload).await;
        });
        upgrade.response
    }
}

/// Runs `after` hooks in reverse order over the middleware whose `before`
/// ran.
async fn finish(middleware: &[Arc<dyn Middleware>], mut response: Response) -> Response {
    for mw in middleware.iter().rev() {
        response = mw.after(response).await;
    }
    response
}

/// Carries headers set by middleware over to the final response, unless
/// the handler set the same header itself.
fn merge_headers(early: Response, mut response: Response) -> Response {
    for (key, value) in early.headers {
        if response.get_header(&key).is_none() {
            response.headers.push((key, value));
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::endpoint::Endpoint;
    use crate::middleware::FnMiddleware;
    use crate::request::Method;
    use crate::websocket::WebSocketConfig;

    async fn hello_handler(_req: Request, _payload: Arc<()>) -> Response {
        Response::text("Hello, World!")
    }

    async fn user_handler(req: Request, _payload: Arc<()>) -> Response {
        let id = req.params.get("id").unwrap_or("unknown");
        Response::text(format!("User: {id}"))
    }

    fn router() -> Router {
        Router::new(RouteTable::build(
            vec![
                Endpoint::new("/").handler(hello_handler),
                Endpoint::new("/users")
                    .handler(hello_handler)
                    .include(Endpoint::new(":id:").handler(user_handler)),
            ],
            "",
            2,
        ))
    }

    #[tokio::test]
    async fn test_basic_routing() {
        let res = router().handle(Request::get("/")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body_string(), Some("Hello, World!".to_string()));
    }

    #[tokio::test]
    async fn test_path_params() {
        let res = router().handle(Request::get("/users/123")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body_string(), Some("User: 123".to_string()));
    }

    #[tokio::test]
    async fn test_not_found() {
        let res = router().handle(Request::get("/nonexistent")).await;
        assert_eq!(res.status, 404);
        assert!(res.body.is_empty());
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let res = router().handle(Request::post("/users/9")).await;
        assert_eq!(res.status, 405);
    }

    #[tokio::test]
    async fn test_route_without_handler_is_not_found() {
        let router = Router::new(RouteTable::build(vec![Endpoint::<()>::new("/bare")], "", 1));
        let res = router.handle(Request::get("/bare")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_handlerless_route_checks_method_first() {
        let router = Router::new(RouteTable::build(
            vec![
                Endpoint::new("/ws").websocket(WebSocketConfig::new(), |_, _, _: Arc<()>| async {}),
                Endpoint::new("/users").include(Endpoint::new(":id:").handler(user_handler)),
            ],
            "",
            1,
        ));

        let res = router.handle(Request::post("/ws")).await;
        assert_eq!(res.status, 405);
        let res = router.handle(Request::new(Method::Delete, "/users")).await;
        assert_eq!(res.status, 405);
        let res = router.handle(Request::get("/users")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_custom_fallbacks() {
        let router = router()
            .not_found(|req, payload| async move {
                assert!(payload.is_none());
                Response::text(format!("nothing at {}", req.path)).status(404)
            })
            .method_not_allowed(|req, payload| async move {
                assert!(payload.is_some());
                Response::text(format!("{} refused", req.method)).status(405)
            });

        let res = router.handle(Request::get("/missing")).await;
        assert_eq!(res.body_string(), Some("nothing at /missing".to_string()));

        let res = router.handle(Request::new(Method::Delete, "/")).await;
        assert_eq!(res.body_string(), Some("DELETE refused".to_string()));
    }

    #[tokio::test]
    async fn test_middleware_sees_resolved_route() {
        let router = router().middleware(FnMiddleware::new(|req: &mut Request, res: &mut Response| {
            let route = req.route.as_ref().map(|r| r.full_name.clone());
            res.set_header("X-Route", route.unwrap_or_default());
            MiddlewareResult::Continue
        }));
        let res = router.handle(Request::get("/users/5")).await;
        assert_eq!(res.get_header("X-Route"), Some("/users/:id:/"));
        assert_eq!(res.body_string(), Some("User: 5".to_string()));
    }

    #[tokio::test]
    async fn test_middleware_halt_skips_handler() {
        let router = router().middleware(FnMiddleware::new(|_req: &mut Request, res: &mut Response| {
            res.status = 401;
            MiddlewareResult::Halt
        }));
        let res = router.handle(Request::get("/")).await;
        assert_eq!(res.status, 401);
        assert!(res.body.is_empty());
    }

    struct Flagged {
        before: Arc<AtomicBool>,
        after: Arc<AtomicBool>,
        halt: bool,
    }

    impl Middleware for Flagged {
        fn before<'a>(
            &'a self,
            _req: &'a mut Request,
            res: &'a mut Response,
        ) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(async move {
                self.before.store(true, Ordering::SeqCst);
                if self.halt {
                    res.status = 401;
                    MiddlewareResult::Halt
                } else {
                    MiddlewareResult::Continue
                }
            })
        }

        fn after<'a>(&'a self, res: Response) -> BoxFuture<'a, Response> {
            self.after.store(true, Ordering::SeqCst);
            Box::pin(async move { res })
        }
    }

    #[tokio::test]
    async fn test_halt_stops_later_middleware() {
        let flags: Vec<_> = (0..4).map(|_| Arc::new(AtomicBool::new(false))).collect();
        let router = router()
            .middleware(Flagged {
                before: Arc::clone(&flags[0]),
                after: Arc::clone(&flags[1]),
                halt: true,
            })
            .middleware(Flagged {
                before: Arc::clone(&flags[2]),
                after: Arc::clone(&flags[3]),
                halt: false,
            });

        let res = router.handle(Request::get("/")).await;
        assert_eq!(res.status, 401);
        assert!(flags[0].load(Ordering::SeqCst));
        assert!(flags[1].load(Ordering::SeqCst));
        assert!(!flags[2].load(Ordering::SeqCst));
        assert!(!flags[3].load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_json_limit_from_config() {
        let table = RouteTable::build(
            vec![Endpoint::new("/echo")
                .methods([Method::Post])
                .handler(|req: Request, _: Arc<()>| async move {
                    match req.json::<serde_json::Value>() {
                        Ok(value) => Response::json(&value),
                        Err(_) => Response::new(400),
                    }
                })],
            "",
            1,
        );
        let router = Router::with_config(table, &RouterConfig::default().max_json_bytes(8));

        let res = router.handle(Request::post("/echo").body(r#"{"a":1}"#)).await;
        assert_eq!(res.status, 200);
        let res = router.handle(Request::post("/echo").body(r#"{"a":"long"}"#)).await;
        assert_eq!(res.status, 400);
    }
}
