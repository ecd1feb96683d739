//! waypost demo server
//!
//! Serves a handful of routes showing static paths, required and optional
//! parameters, and a WebSocket echo endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use waypost_router::{
    Endpoint, LoggingMiddleware, Method, Request, Response, RouteTableBuilder, Router,
    RouterConfig, WebSocketConfig, WsConnection,
};
use waypost_server::{ServerConfig, DEFAULT_MAX_BODY_BYTES};

/// Route table demo server.
#[derive(Parser)]
#[command(name = "waypost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, env = "WAYPOST_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Shards per regex bucket (defaults to the number of CPUs).
    #[arg(short, long, env = "WAYPOST_PARALLEL_SEARCH")]
    parallel_search: Option<usize>,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "WAYPOST_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn router_config(&self) -> RouterConfig {
        let config = RouterConfig::default();
        match self.parallel_search {
            Some(shards) => config.parallel_search(shards),
            None => config,
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig::default()
            .addr(self.addr)
            .max_body_bytes(self.max_body_bytes)
    }
}

async fn index(_req: Request, _: Arc<()>) -> Response {
    Response::html("<h1>waypost</h1><p>Try <code>/users/42/posts</code> or <code>/files/</code>.</p>")
}

async fn user_posts(req: Request, _: Arc<()>) -> Response {
    let id = req.params.get("id").unwrap_or_default();
    Response::json(&serde_json::json!({ "user": id, "posts": [] }))
}

async fn files(req: Request, _: Arc<()>) -> Response {
    match req.params.get("name") {
        Some(name) => Response::text(format!("file {name}")),
        None => Response::text("file listing"),
    }
}

async fn echo(req: Request, conn: WsConnection, _: Arc<()>) {
    let mut socket = match conn.into_socket() {
        Ok(socket) => socket,
        Err(err) => {
            debug!(path = %req.path, error = %err, "WebSocket upgrade failed");
            return;
        }
    };
    while let Some(Ok(msg)) = socket.next().await {
        if (msg.is_text() || msg.is_binary()) && socket.send(msg).await.is_err() {
            break;
        }
    }
    debug!(path = %req.path, "WebSocket closed");
}

fn build_router(config: &RouterConfig) -> Router {
    let table = RouteTableBuilder::from_config(config)
        .endpoint(Endpoint::new("/").handler(index))
        .endpoint(
            Endpoint::new("/users").include(
                Endpoint::new(":id:").include(
                    Endpoint::new("posts")
                        .methods([Method::Get, Method::Head])
                        .handler(user_posts),
                ),
            ),
        )
        .endpoint(Endpoint::new("/files/::name::").handler(files))
        .endpoint(Endpoint::new("/ws").websocket(WebSocketConfig::new().max_message_size(64 * 1024), echo))
        .build();

    Router::with_config(table, config).middleware(LoggingMiddleware)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let router_config = cli.router_config();
    let server_config = cli.server_config();
    let router = build_router(&router_config);
    for route in router.table().routes() {
        info!(path = %route.full_name(), methods = ?route.methods(), "Route");
    }

    let listener = waypost_server::bind(server_config.addr).await?;
    waypost_server::serve_with_shutdown(listener, router, server_config, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C; shutting down");
        }
    })
    .await?;
    Ok(())
}
