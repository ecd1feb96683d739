//! Middleware run between route resolution and the handler.

use futures::future::BoxFuture;
use tracing::info;

use crate::request::Request;
use crate::response::Response;

/// Result of middleware processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareResult {
    /// Continue to the next middleware or the handler.
    Continue,
    /// Stop processing; the response written so far is sent.
    Halt,
}

/// Trait for middleware that processes requests and responses.
///
/// `before` sees the request after resolution, so `req.route` and
/// `req.params` are already filled in (`req.route` is `None` for unmatched
/// paths). Middleware runs before the not-found and method checks.
///
/// # Example
///
/// ```
/// use waypost_router::{BoxFuture, Middleware, MiddlewareResult, Request, Response};
///
/// struct RequireToken;
///
/// impl Middleware for RequireToken {
///     fn before<'a>(
///         &'a self,
///         req: &'a mut Request,
///         res: &'a mut Response,
///     ) -> BoxFuture<'a, MiddlewareResult> {
///         Box::pin(async move {
///             if req.get_header("Authorization").is_some() {
///                 MiddlewareResult::Continue
///             } else {
///                 res.status = 401;
///                 MiddlewareResult::Halt
///             }
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Called before the handler. Returning [`MiddlewareResult::Halt`]
    /// sends `res` as it stands.
    fn before<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, MiddlewareResult>;

    /// Called with the final response, in reverse registration order. After
    /// a halt, only middleware whose `before` ran are called.
    fn after<'a>(&'a self, res: Response) -> BoxFuture<'a, Response> {
        Box::pin(async move { res })
    }
}

/// Middleware built from a synchronous closure.
pub struct FnMiddleware<F>(F);

impl<F> FnMiddleware<F>
where
    F: Fn(&mut Request, &mut Response) -> MiddlewareResult + Send + Sync,
{
    /// Wraps `f`.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Request, &mut Response) -> MiddlewareResult + Send + Sync,
{
    fn before<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, MiddlewareResult> {
        let result = (self.0)(req, res);
        Box::pin(async move { result })
    }
}

/// Middleware that logs requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before<'a>(
        &'a self,
        req: &'a mut Request,
        _res: &'a mut Response,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let route = req.route.as_ref().map_or("-", |r| r.full_name.as_str());
            info!(
                method = %req.method,
                path = %req.path,
                route = %route,
                websocket = req.is_websocket(),
                "--> request"
            );
            MiddlewareResult::Continue
        })
    }

    fn after<'a>(&'a self, res: Response) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            info!(status = res.status, body_len = res.body.len(), "<-- response");
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_middleware_halts() {
        let mw = FnMiddleware::new(|req: &mut Request, res: &mut Response| {
            if req.path.starts_with("/private") {
                res.status = 403;
                MiddlewareResult::Halt
            } else {
                MiddlewareResult::Continue
            }
        });

        let mut req = Request::get("/private/x");
        let mut res = Response::ok();
        assert_eq!(mw.before(&mut req, &mut res).await, MiddlewareResult::Halt);
        assert_eq!(res.status, 403);

        let mut req = Request::get("/public");
        let mut res = Response::ok();
        assert_eq!(mw.before(&mut req, &mut res).await, MiddlewareResult::Continue);
    }

    #[tokio::test]
    async fn test_default_after_passes_through() {
        let mw = LoggingMiddleware;
        let res = mw.after(Response::text("hi")).await;
        assert_eq!(res.body_string(), Some("hi".to_string()));
    }
}
