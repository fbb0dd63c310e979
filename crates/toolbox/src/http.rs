use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::configuration::Settings;
use crate::registry::ToolRegistry;
use crate::server::ToolServer;

/// How long in-flight connections get to finish once shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// MCP streamable HTTP endpoint mounted at `path`.
pub fn router(registry: Arc<ToolRegistry>, name: &str, path: &str) -> axum::Router {
    router_with_sessions(registry, name, path, Arc::new(LocalSessionManager::default()))
}

/// Same as [`router`], with a caller-owned session table.
pub fn router_with_sessions(
    registry: Arc<ToolRegistry>,
    name: &str,
    path: &str,
    sessions: Arc<LocalSessionManager>,
) -> axum::Router {
    let name = name.to_string();
    let service = StreamableHttpService::new(
        move || Ok(ToolServer::new(registry.clone(), name.clone())),
        sessions,
        StreamableHttpServerConfig::default(),
    );
    axum::Router::new()
        .nest_service(path, service)
        .layer(TraceLayer::new_for_http())
}

// Graceful shutdown signal
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        _ => {
            warn!("failed to install signal handlers, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Binds `settings.socket_addr()` and serves until `shutdown` resolves.
pub async fn serve<F>(settings: &Settings, registry: Arc<ToolRegistry>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = settings
        .socket_addr()
        .with_context(|| format!("invalid bind address {}:{}", settings.host, settings.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not listen on {addr}"))?;
    info!(
        name = %settings.name,
        "MCP server listening on {}{}",
        listener.local_addr()?,
        settings.path
    );

    serve_listener(
        listener,
        router(registry, &settings.name, &settings.path),
        shutdown,
    )
    .await
}

/// Serves `app` on an already bound listener.
///
/// Once `shutdown` resolves, open connections (including SSE streams) get
/// [`SHUTDOWN_GRACE`] to drain before the server is dropped.
pub async fn serve_listener<F>(listener: TcpListener, app: axum::Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let graceful = {
        let token = token.clone();
        async move { token.cancelled().await }
    };
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();

    let deadline = async {
        shutdown.await;
        info!("Shutting down server...");
        token.cancel();
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };

    tokio::select! {
        res = server => res.context("server error")?,
        _ = deadline => warn!("Server shutdown timeout exceeded, forcing shutdown"),
    }

    info!("server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, ToolClient};
    use crate::error::ErrorKind;
    use crate::tools::default_registry;
    use rmcp::object;

    #[tokio::test]
    async fn stops_when_shutdown_resolves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let app = router(Arc::new(default_registry()), "test", "/mcp");
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(serve_listener(listener, app, async move {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        let res = tokio::time::timeout(SHUTDOWN_GRACE * 2, handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn serve_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = Settings {
            host: "127.0.0.1".to_string(),
            port: taken.local_addr().unwrap().port(),
            ..Settings::default()
        };
        let err = serve(&settings, Arc::new(default_registry()), async {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not listen"));
    }

    #[tokio::test]
    async fn client_operations_release_server_sessions() {
        let sessions = Arc::new(LocalSessionManager::default());
        let app = router_with_sessions(
            Arc::new(default_registry()),
            "test",
            "/mcp",
            sessions.clone(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/mcp", listener.local_addr().unwrap());
        let server = tokio::spawn(serve_listener(listener, app, std::future::pending()));

        let client = ToolClient::new(ClientConfig::new(url));
        let err = client
            .call_tool("divide", object!({"a": 1, "b": 2}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(client.ping().await.unwrap().ok);

        let released = async {
            while !sessions.sessions.read().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), released)
            .await
            .expect("server still holds client sessions");

        server.abort();
    }
}
