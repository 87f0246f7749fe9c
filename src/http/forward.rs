//! Forwarding of plain (non-CONNECT) proxy requests.
//!
//! # Responsibilities
//! - Rebuild the inbound absolute-form request as an outbound request
//! - Execute it through the shared upstream client
//! - Stream the upstream status, headers and body back unchanged
//!
//! # Design Decisions
//! - The shared client ignores `HTTP_PROXY`/`HTTPS_PROXY` so the proxy never
//!   routes through itself or another proxy
//! - Redirects are not followed; the client sees the upstream status as is
//! - Transport failure before a response is a 500 carrying the error text
//! - A body failure after the head was sent can only truncate the response

use std::error::Error as StdError;
use std::time::Instant;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;

use crate::config::TimeoutConfig;
use crate::http::request::RequestContextExt;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Build the client shared by every forwarded request.
pub fn build_client(timeouts: &TimeoutConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(timeouts.connect())
        .timeout(timeouts.request())
        .pool_idle_timeout(timeouts.idle())
        .build()
}

/// Router fallback: forwards every request that reaches it.
pub async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    forward(&state.client, request).await
}

/// Forward `request` upstream and stream the response back.
pub async fn forward(client: &reqwest::Client, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request
        .context()
        .map(|c| c.id.to_string())
        .unwrap_or_default();

    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let host = parts.uri.host().unwrap_or_default().to_string();

    let mut outbound = client
        .request(parts.method, parts.uri.to_string())
        .headers(parts.headers);
    if !body.is_end_stream() {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = match outbound.send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            let text = error_text(&e);
            tracing::info!(request_id = %request_id, host = %host, error = %text, "Failed http request");
            metrics::record_request(&method, StatusCode::INTERNAL_SERVER_ERROR.as_u16(), start);
            return (StatusCode::INTERNAL_SERVER_ERROR, text).into_response();
        }
    };

    let status = upstream.status();
    metrics::record_request(&method, status.as_u16(), start);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in upstream.headers() {
        headers.append(name.clone(), value.clone());
    }

    let body = upstream.bytes_stream().inspect_err(move |e| {
        tracing::warn!(
            request_id = %request_id,
            host = %host,
            error = %e,
            "Failed to copy upstream response body"
        );
    });
    *response.body_mut() = Body::from_stream(body);
    response
}

/// Render an error with its whole source chain, e.g.
/// `error sending request: client error (Connect): tcp connect error: Connection refused`.
fn error_text(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
