//! Endpoint declarations.
//!
//! An [`Endpoint`] describes one route and, through [`Endpoint::include`],
//! the routes nested below it. The table builder flattens the tree into
//! [`Route`]s.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::request::{Method, Request, RouteInfo};
use crate::response::Response;
use crate::websocket::{WebSocketConfig, WsConnection};

/// A boxed async HTTP handler. Receives the resolved request and the
/// route's payload.
pub type Handler<P> = Arc<dyn Fn(Request, Arc<P>) -> BoxFuture<'static, Response> + Send + Sync>;

/// A boxed async WebSocket handler.
pub type WsHandler<P> =
    Arc<dyn Fn(Request, WsConnection, Arc<P>) -> BoxFuture<'static, ()> + Send + Sync>;

/// WebSocket settings together with the handler that serves upgraded
/// connections.
pub struct WebSocketRoute<P> {
    pub config: WebSocketConfig,
    pub handler: WsHandler<P>,
}

impl<P> Clone for WebSocketRoute<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// A declared endpoint, possibly with nested children.
pub struct Endpoint<P = ()> {
    name: String,
    include: Vec<Endpoint<P>>,
    methods: BTreeSet<Method>,
    handler: Option<Handler<P>>,
    websocket: Option<WebSocketRoute<P>>,
    payload: P,
}

impl<P: Default> Endpoint<P> {
    /// Declares an endpoint with a default payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_payload(name, P::default())
    }
}

impl<P> Endpoint<P> {
    /// Declares an endpoint carrying `payload`.
    pub fn with_payload(name: impl Into<String>, payload: P) -> Self {
        Self {
            name: name.into(),
            include: Vec::new(),
            methods: BTreeSet::new(),
            handler: None,
            websocket: None,
            payload,
        }
    }

    /// Adds allowed methods. An endpoint that never sets any allows GET.
    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }

    /// Sets the HTTP handler.
    #[must_use]
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Request, Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |req, payload| Box::pin(handler(req, payload))));
        self
    }

    /// Accepts WebSocket upgrades on this endpoint.
    #[must_use]
    pub fn websocket<F, Fut>(mut self, config: WebSocketConfig, handler: F) -> Self
    where
        F: Fn(Request, WsConnection, Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.websocket = Some(WebSocketRoute {
            config,
            handler: Arc::new(move |req, conn, payload| Box::pin(handler(req, conn, payload))),
        });
        self
    }

    /// Nests a child endpoint below this one.
    #[must_use]
    pub fn include(mut self, child: Endpoint<P>) -> Self {
        self.include.push(child);
        self
    }

    /// Nests several child endpoints, keeping their order.
    #[must_use]
    pub fn includes(mut self, children: impl IntoIterator<Item = Endpoint<P>>) -> Self {
        self.include.extend(children);
        self
    }

    /// Returns the declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Detaches the children so the builder can walk them after the parent
    /// has been turned into a [`Route`].
    pub(crate) fn into_parts(self, full_name: String) -> (Route<P>, Vec<Endpoint<P>>) {
        let methods = if self.methods.is_empty() {
            BTreeSet::from([Method::Get])
        } else {
            self.methods
        };
        let route = Route {
            info: RouteInfo {
                name: self.name,
                full_name,
            },
            methods,
            handler: self.handler,
            websocket: self.websocket,
            payload: Arc::new(self.payload),
        };
        (route, self.include)
    }
}

/// A flattened endpoint as stored in the route table.
pub struct Route<P> {
    info: RouteInfo,
    methods: BTreeSet<Method>,
    handler: Option<Handler<P>>,
    websocket: Option<WebSocketRoute<P>>,
    payload: Arc<P>,
}

impl<P> Route<P> {
    /// Declared name and normalized full path.
    pub fn info(&self) -> &RouteInfo {
        &self.info
    }

    /// Normalized full path.
    pub fn full_name(&self) -> &str {
        &self.info.full_name
    }

    /// Allowed methods, never empty.
    pub fn methods(&self) -> &BTreeSet<Method> {
        &self.methods
    }

    /// Returns true if `method` is allowed.
    pub fn is_method_allowed(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }

    /// The HTTP handler, if any.
    pub fn handler(&self) -> Option<&Handler<P>> {
        self.handler.as_ref()
    }

    /// WebSocket settings, if the route accepts upgrades.
    pub fn websocket(&self) -> Option<&WebSocketRoute<P>> {
        self.websocket.as_ref()
    }

    /// The route's payload.
    pub fn payload(&self) -> &Arc<P> {
        &self.payload
    }
}

impl<P> fmt::Debug for Route<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("full_name", &self.info.full_name)
            .field("methods", &self.methods)
            .field("handler", &self.handler.is_some())
            .field("websocket", &self.websocket.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_methods_default_to_get() {
        let (route, children) = Endpoint::<()>::new("/users")
            .include(Endpoint::new(":id:"))
            .into_parts("/users/".to_string());
        assert_eq!(route.methods().iter().copied().collect::<Vec<_>>(), vec![Method::Get]);
        assert!(route.is_method_allowed(Method::Get));
        assert!(!route.is_method_allowed(Method::Post));
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name(), ":id:");
    }

    #[test]
    fn test_explicit_methods_replace_default() {
        let (route, _) = Endpoint::<()>::new("/items")
            .methods([Method::Post, Method::Put])
            .into_parts("/items/".to_string());
        assert!(!route.is_method_allowed(Method::Get));
        assert!(route.is_method_allowed(Method::Put));
    }

    #[test]
    fn test_payload_is_carried() {
        let (route, _) = Endpoint::with_payload("/admin", "staff-only").into_parts("/admin/".into());
        assert_eq!(**route.payload(), "staff-only");
        assert_eq!(route.info().name, "/admin");
    }
}
