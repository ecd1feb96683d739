//! # waypost-server
//!
//! Serves a [`waypost_router::Router`] over HTTP/1.1 with hyper, including
//! WebSocket upgrades.
//!
//! ```ignore
//! let listener = waypost_server::bind(config.addr).await?;
//! waypost_server::serve(listener, router, config).await?;
//! ```

mod config;
mod error;

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request as HyperRequest, Response as HyperResponse, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use waypost_router::websocket::Io;
use waypost_router::{Method, OnUpgrade, Request, Response, Router};

pub use config::{ServerConfig, DEFAULT_MAX_BODY_BYTES};
pub use error::{Result, ServerError};

/// Binds a listener on `addr`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is unavailable.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serves `router` on `listener` until accepting fails.
///
/// # Errors
///
/// Returns [`ServerError::Accept`] when the listener fails.
pub async fn serve<P>(listener: TcpListener, router: Router<P>, config: ServerConfig) -> Result<()>
where
    P: Send + Sync + 'static,
{
    serve_with_shutdown(listener, router, config, std::future::pending()).await
}

/// Serves `router` on `listener` until `shutdown` resolves. Connections
/// already accepted run to completion on their own tasks.
///
/// # Errors
///
/// Returns [`ServerError::Accept`] when the listener fails.
pub async fn serve_with_shutdown<P, S>(
    listener: TcpListener,
    router: Router<P>,
    config: ServerConfig,
    shutdown: S,
) -> Result<()>
where
    P: Send + Sync + 'static,
    S: Future<Output = ()> + Send,
{
    let router = Arc::new(router);
    let max_body_bytes = config.max_body_bytes;
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, max_body_bytes, "Listening");
    }

    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted.map_err(ServerError::Accept)?,
            () = &mut shutdown => {
                info!("Shutting down listener");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let router = Arc::clone(&router);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let router = Arc::clone(&router);
                handle_request(req, router, peer, max_body_bytes)
            });

            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                debug!(%peer, error = %err, "Error serving connection");
            }
        });
    }
}

async fn handle_request<P>(
    mut req: HyperRequest<Incoming>,
    router: Arc<Router<P>>,
    peer: SocketAddr,
    max_body_bytes: usize,
) -> std::result::Result<HyperResponse<Full<Bytes>>, Infallible>
where
    P: Send + Sync + 'static,
{
    let Some(method) = Method::parse(req.method().as_str()) else {
        debug!(method = %req.method(), "Unsupported method");
        return Ok(into_hyper_response(Response::new(501)));
    };

    let on_upgrade = req.headers().contains_key(hyper::header::UPGRADE).then(|| {
        let pending = hyper::upgrade::on(&mut req);
        OnUpgrade::new(async move {
            let upgraded = pending.await.map_err(io::Error::other)?;
            Ok(Box::new(TokioIo::new(upgraded)) as Box<dyn Io>)
        })
    });

    let target = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), ToString::to_string);
    let mut request = Request::new(method, target).remote_addr(peer);
    for name in req.headers().keys() {
        let values: Vec<&str> = req
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            continue;
        }
        let separator = if name == hyper::header::COOKIE { "; " } else { ", " };
        request
            .headers
            .insert(name.as_str().to_string(), values.join(separator));
    }
    if let Some(on_upgrade) = on_upgrade {
        request = request.with_upgrade(on_upgrade);
    }

    match Limited::new(req.into_body(), max_body_bytes).collect().await {
        Ok(body) => request.body = body.to_bytes().to_vec(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            debug!(path = %request.path, limit = max_body_bytes, "Request body too large");
            return Ok(into_hyper_response(Response::payload_too_large()));
        }
        Err(err) => {
            warn!(path = %request.path, error = %err, "Failed to read request body");
            return Ok(into_hyper_response(Response::new(400)));
        }
    }

    let response = router.handle(request).await;
    Ok(into_hyper_response(response))
}

fn into_hyper_response(response: Response) -> HyperResponse<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HyperResponse::builder().status(status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|err| {
            error!(error = %err, "Invalid response from handler");
            let mut fallback = HyperResponse::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_hyper_response_keeps_repeated_headers() {
        let res = Response::text("hi")
            .append_header("Set-Cookie", "a=1")
            .append_header("Set-Cookie", "b=2")
            .status(201);
        let hyper_res = into_hyper_response(res);
        assert_eq!(hyper_res.status(), StatusCode::CREATED);
        let cookies: Vec<_> = hyper_res
            .headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_invalid_header_falls_back_to_500() {
        let res = Response::ok().header("Bad Header", "x");
        assert_eq!(
            into_hyper_response(res).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
