//! WebSocket upgrade handling.
//!
//! The transport hands the router an [`OnUpgrade`]: a future that resolves
//! to the raw byte stream once the `101 Switching Protocols` response has
//! been written. The router validates the handshake, builds that response,
//! and gives the route's WebSocket handler a [`WsConnection`] carrying
//! either the negotiated [`WebSocket`] or the [`UpgradeError`].

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig as ProtocolConfig};
use tokio_tungstenite::WebSocketStream;

use crate::request::Request;
use crate::response::Response;

/// A bidirectional byte stream produced by an upgraded connection.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// The negotiated WebSocket stream.
pub type WebSocket = WebSocketStream<Box<dyn Io>>;

/// A pending upgrade supplied by the transport.
pub struct OnUpgrade(BoxFuture<'static, io::Result<Box<dyn Io>>>);

impl OnUpgrade {
    /// Wraps the transport's upgrade future.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = io::Result<Box<dyn Io>>> + Send + 'static,
    {
        Self(Box::pin(future))
    }
}

impl Future for OnUpgrade {
    type Output = io::Result<Box<dyn Io>>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

impl fmt::Debug for OnUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OnUpgrade")
    }
}

/// Why a WebSocket upgrade did not produce a connection.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// A required handshake header is missing or has the wrong value.
    #[error("bad websocket handshake: {0}")]
    Handshake(&'static str),

    /// The origin check rejected the request.
    #[error("origin not allowed: {0}")]
    Origin(String),

    /// The transport did not provide an upgradable connection.
    #[error("connection is not upgradable")]
    NotUpgradable,

    /// The transport failed while switching protocols.
    #[error("upgrade failed: {0}")]
    Io(#[from] io::Error),
}

impl UpgradeError {
    /// Status code written back when the handshake is refused.
    pub fn status(&self) -> u16 {
        match self {
            Self::Origin(_) => 403,
            Self::Handshake(_) => 400,
            Self::NotUpgradable | Self::Io(_) => 500,
        }
    }
}

/// Origin predicate: receives the request's `Origin` header value, if any.
pub type OriginCheck = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Per-route WebSocket settings.
#[derive(Clone, Default)]
pub struct WebSocketConfig {
    /// Largest message accepted, in bytes. `None` keeps the protocol default.
    pub max_message_size: Option<usize>,
    /// Largest single frame accepted, in bytes.
    pub max_frame_size: Option<usize>,
    /// Subprotocols the server speaks, in preference order.
    pub subprotocols: Vec<String>,
    /// Origin predicate. Every origin is allowed when unset.
    pub check_origin: Option<OriginCheck>,
}

impl fmt::Debug for WebSocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConfig")
            .field("max_message_size", &self.max_message_size)
            .field("max_frame_size", &self.max_frame_size)
            .field("subprotocols", &self.subprotocols)
            .field("check_origin", &self.check_origin.is_some())
            .finish()
    }
}

impl WebSocketConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum message size.
    #[must_use]
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = Some(bytes);
        self
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = Some(bytes);
        self
    }

    /// Adds a supported subprotocol.
    #[must_use]
    pub fn subprotocol(mut self, name: impl Into<String>) -> Self {
        self.subprotocols.push(name.into());
        self
    }

    /// Only accepts requests whose `Origin` header is one of `origins`.
    #[must_use]
    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        let origins: Vec<String> = origins.iter().map(|s| (*s).to_string()).collect();
        self.check_origin = Some(Arc::new(move |origin| {
            origin.is_some_and(|o| origins.iter().any(|allowed| allowed.eq_ignore_ascii_case(o)))
        }));
        self
    }

    fn protocol_config(&self) -> ProtocolConfig {
        let mut config = ProtocolConfig::default();
        if self.max_message_size.is_some() {
            config.max_message_size = self.max_message_size;
        }
        if self.max_frame_size.is_some() {
            config.max_frame_size = self.max_frame_size;
        }
        config
    }
}

/// What a WebSocket handler receives: the negotiated stream, or the reason
/// the upgrade failed.
pub struct WsConnection {
    /// Subprotocol agreed with the client, if any.
    pub protocol: Option<String>,
    result: Result<WebSocket, UpgradeError>,
}

impl fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConnection")
            .field("protocol", &self.protocol)
            .field("error", &self.error())
            .finish()
    }
}

impl WsConnection {
    /// Returns the upgrade error, if any.
    pub fn error(&self) -> Option<&UpgradeError> {
        self.result.as_ref().err()
    }

    /// Returns true if the connection was negotiated.
    pub fn is_open(&self) -> bool {
        self.result.is_ok()
    }

    /// Takes the stream out, or the error that prevented it.
    ///
    /// # Errors
    ///
    /// Returns the [`UpgradeError`] recorded during the upgrade.
    pub fn into_socket(self) -> Result<WebSocket, UpgradeError> {
        self.result
    }

    fn failed(error: UpgradeError) -> Self {
        Self {
            protocol: None,
            result: Err(error),
        }
    }
}

/// The outcome of a handshake: the response to write now, and the
/// connection the handler will receive once the transport switches.
pub struct Upgrade {
    /// `101 Switching Protocols` on success, an error status otherwise.
    pub response: Response,
    /// Resolves after the response has been written.
    pub connection: BoxFuture<'static, WsConnection>,
}

/// Validates the handshake on `request` and prepares the upgrade.
///
/// Never fails outright: a refused handshake yields an error response and a
/// connection that resolves immediately to the error.
pub fn upgrade(request: &mut Request, config: &WebSocketConfig) -> Upgrade {
    match accept(request, config) {
        Ok((response, protocol, on_upgrade)) => {
            let protocol_config = config.protocol_config();
            let connection = Box::pin(async move {
                match on_upgrade.await {
                    Ok(io) => {
                        let socket =
                            WebSocketStream::from_raw_socket(io, Role::Server, Some(protocol_config))
                                .await;
                        WsConnection {
                            protocol,
                            result: Ok(socket),
                        }
                    }
                    Err(err) => WsConnection::failed(UpgradeError::Io(err)),
                }
            });
            Upgrade {
                response,
                connection,
            }
        }
        Err(error) => {
            tracing::debug!(path = %request.path, error = %error, "WebSocket handshake refused");
            let response = Response::new(error.status());
            Upgrade {
                response,
                connection: Box::pin(async move { WsConnection::failed(error) }),
            }
        }
    }
}

fn accept(
    request: &mut Request,
    config: &WebSocketConfig,
) -> Result<(Response, Option<String>, OnUpgrade), UpgradeError> {
    if !request.is_websocket() {
        return Err(UpgradeError::Handshake("missing `Upgrade: websocket`"));
    }
    let connection_upgrade = request.get_header("Connection").is_some_and(|v| {
        v.split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    });
    if !connection_upgrade {
        return Err(UpgradeError::Handshake("missing `Connection: upgrade`"));
    }
    if request.get_header("Sec-WebSocket-Version").map(str::trim) != Some("13") {
        return Err(UpgradeError::Handshake("unsupported `Sec-WebSocket-Version`"));
    }
    let key = request
        .get_header("Sec-WebSocket-Key")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(UpgradeError::Handshake("missing `Sec-WebSocket-Key`"))?;
    if let Some(check) = &config.check_origin {
        let origin = request.get_header("Origin");
        if !check(origin) {
            return Err(UpgradeError::Origin(origin.unwrap_or_default().to_string()));
        }
    }

    let protocol = request.get_header("Sec-WebSocket-Protocol").and_then(|offered| {
        config
            .subprotocols
            .iter()
            .find(|ours| offered.split(',').any(|p| p.trim() == ours.as_str()))
            .cloned()
    });

    let mut response = Response::new(101)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Accept", derive_accept_key(key.as_bytes()));
    if let Some(protocol) = &protocol {
        response = response.header("Sec-WebSocket-Protocol", protocol.clone());
    }

    let on_upgrade = request.upgrade.take().ok_or(UpgradeError::NotUpgradable)?;
    Ok((response, protocol, on_upgrade))
}
