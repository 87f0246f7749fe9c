//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared upstream client and the forwarding router
//! - Accept connections and serve each one on its own task
//! - Drive HTTP/1.1 with upgrades enabled so CONNECT can take over the socket
//! - Stop accepting on shutdown and drain live connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, Router};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::TokioIo;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::attribution::ProcessAttributor;
use crate::config::ProxyConfig;
use crate::http::dispatch::ProxyDispatcher;
use crate::http::forward::{build_client, forward_handler};
use crate::net::{ConnectionTracker, Listener};

/// State shared by the forwarding handlers.
#[derive(Clone)]
pub struct AppState {
    /// Upstream client; immutable after startup and shared by every request.
    pub client: reqwest::Client,
}

/// Error type for server construction and startup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the forward proxy.
pub struct HttpServer {
    dispatcher: ProxyDispatcher,
    config: ProxyConfig,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let client = build_client(&config.timeouts)?;
        let forwarder = Self::build_router(AppState { client });

        let attributor = config
            .attribution
            .enabled
            .then(|| ProcessAttributor::from_config(&config.attribution));

        let tracker = ConnectionTracker::new();
        let dispatcher = ProxyDispatcher::new(
            attributor,
            forwarder,
            config.timeouts.connect(),
            tracker.clone(),
        );

        Ok(Self {
            dispatcher,
            config,
            tracker,
        })
    }

    /// Router for non-CONNECT requests: everything falls through to the forwarder.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(forward_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then drain live connections.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy server starting");

        let dispatcher = Arc::new(self.dispatcher);

        loop {
            let (stream, peer, permit) = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };

            let guard = self.tracker.track();
            let span = tracing::debug_span!("connection", id = %guard.id(), peer = %peer);
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(
                async move {
                    let _permit = permit;
                    let _guard = guard;
                    serve_connection(stream, peer, dispatcher).await;
                }
                .instrument(span),
            );
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Stopped accepting, draining connections"
        );
        if !self.tracker.wait_for_drain(self.config.timeouts.shutdown()).await {
            tracing::warn!(
                active_connections = self.tracker.active_count(),
                "Shutdown deadline reached with connections still open"
            );
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<ProxyDispatcher>,
) {
    let service = service_fn(move |request: Request<Incoming>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.dispatch(peer, request.map(Body::new)).await }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
    {
        tracing::debug!(error = %e, "Connection closed with error");
    }
}
