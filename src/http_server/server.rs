//! # HTTP Server
//!
//! Combines the relay's routers into one axum app and runs it until a
//! shutdown signal, then cancels every live session and waits for them
//! to close.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::analytics_routes::analytics_routes;
use super::config::HttpServerConfig;
use super::live_trend_routes::live_trend_routes;
use super::observability_routes::health_routes;
use super::stats_routes::stats_routes;
use crate::relay::Relay;

/// HTTP server for the telemetry relay
pub struct HttpServer {
    config: HttpServerConfig,
    relay: Arc<Relay>,
    router: Router,
}

impl HttpServer {
    /// Create a server with default configuration
    pub fn new(relay: Arc<Relay>) -> Self {
        Self::with_config(HttpServerConfig::default(), relay, None)
    }

    /// Create a server; `/stats` and the aggregate routes are mounted only
    /// when a database pool is given
    pub fn with_config(config: HttpServerConfig, relay: Arc<Relay>, database: Option<PgPool>) -> Self {
        let router = Self::build_router(&config, relay.clone(), database);
        Self {
            config,
            relay,
            router,
        }
    }

    fn build_router(config: &HttpServerConfig, relay: Arc<Relay>, database: Option<PgPool>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let mut router = Router::new()
            .merge(health_routes())
            .merge(live_trend_routes(relay));

        if let Some(pool) = database {
            router = router
                .merge(stats_routes(pool.clone()))
                .merge(analytics_routes(pool));
        }

        router.layer(TraceLayer::new_for_http()).layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind the configured address and serve until Ctrl-C or SIGTERM
    pub async fn start(self) -> io::Result<()> {
        let addr: SocketAddr = self
            .config
            .socket_addr()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "telemetry relay listening");
        info!("  - /live-trend - WebSocket stream");
        info!("  - /relay/stats - relay counters");
        info!("  - /health - health check");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on a bound listener until `signal` resolves.
    ///
    /// On the signal the relay is shut down first, so every session closes
    /// with "going away" instead of being cut off.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let relay = self.relay.clone();
        let grace = self.config.shutdown_grace();

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                signal.await;
                relay.shutdown();
            })
            .await?;

        self.relay.drain(grace).await;
        info!("http server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
