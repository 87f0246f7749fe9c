//! Per-request dispatch.
//!
//! Every request is first attributed to its originating local process (for
//! the log line only), then handed to the tunnel for `CONNECT` or to the
//! forwarding router for everything else.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use tower::ServiceExt;

use crate::attribution::{Attribution, ProcessAttributor};
use crate::http::request::{canonical_peer, display_target, RequestContext};
use crate::http::tunnel::{self, TunnelError};
use crate::net::ConnectionTracker;
use crate::observability::metrics;

/// Routes each inbound request to the tunnel or the forwarder.
///
/// Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct ProxyDispatcher {
    attributor: Option<ProcessAttributor>,
    forwarder: Router,
    connect_timeout: Duration,
    tracker: ConnectionTracker,
}

impl ProxyDispatcher {
    pub fn new(
        attributor: Option<ProcessAttributor>,
        forwarder: Router,
        connect_timeout: Duration,
        tracker: ConnectionTracker,
    ) -> Self {
        Self {
            attributor,
            forwarder,
            connect_timeout,
            tracker,
        }
    }

    /// Attribute `peer` to a local process. Never fails.
    pub async fn attribute(&self, peer: SocketAddr) -> Attribution {
        let Some(attributor) = &self.attributor else {
            return Attribution::NoData;
        };
        let peer = canonical_peer(peer);
        let attribution = attributor.attribute_async(peer.to_string()).await;
        metrics::record_attribution(attribution.outcome());
        attribution
    }

    /// Handle one request from `peer`.
    ///
    /// An `Err` means the connection should be dropped without a response.
    pub async fn dispatch(
        &self,
        peer: SocketAddr,
        mut request: Request<Body>,
    ) -> Result<Response, TunnelError> {
        let peer = canonical_peer(peer);
        let context = RequestContext::new(peer, self.attribute(peer).await);

        tracing::info!(
            request_id = %context.id,
            peer = %peer,
            process = %context.process,
            method = %request.method(),
            target = %display_target(request.uri()),
            "Proxying request"
        );
        request.extensions_mut().insert(context);

        if request.method() == Method::CONNECT {
            tunnel::serve_connect(request, self.connect_timeout, self.tracker.track()).await
        } else {
            let response = self
                .forwarder
                .clone()
                .oneshot(request)
                .await
                .unwrap_or_else(|never| match never {});
            Ok(response)
        }
    }
}
