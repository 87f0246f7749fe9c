//! CONNECT tunneling.
//!
//! # Connection States
//! ```text
//! Connecting ──dial ok──▶ 200 sent ──upgrade──▶ Tunneling ──both copies done──▶ Closed
//!      │                                             │
//!      └──dial failed──▶ Closed (connection dropped, no response)
//! ```
//!
//! # Design Decisions
//! - The upstream is dialed before anything is written, since a 200 commits the tunnel
//! - Each direction runs as its own task; the tunnel closes only after both finish
//! - A direction that reaches EOF half-closes its destination so the other
//!   side learns the peer is done
//! - Copy errors (reset, broken pipe) are normal peer behaviour and only traced

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::request::RequestContextExt;
use crate::net::ConnectionGuard;
use crate::observability::metrics;

/// Errors that end a CONNECT before the tunnel is committed.
///
/// Returned to the HTTP driver, which closes the client connection without a response.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("CONNECT target {0} has no host:port")]
    MissingAuthority(Uri),

    #[error("error connecting to {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {target} after {timeout:?}")]
    DialTimeout { target: String, timeout: Duration },
}

/// Bytes moved by a finished tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// The two live endpoints of one CONNECT session.
pub struct TunnelPair<C> {
    client: C,
    upstream: TcpStream,
}

impl<C> TunnelPair<C>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(client: C, upstream: TcpStream) -> Self {
        Self { client, upstream }
    }

    /// Relay bytes in both directions until both directions are finished.
    ///
    /// Both endpoints are closed when this returns.
    pub async fn relay(self) -> TunnelStats {
        metrics::tunnel_opened();

        let (client_read, client_write) = tokio::io::split(self.client);
        let (upstream_read, upstream_write) = self.upstream.into_split();

        let to_upstream = tokio::spawn(copy_then_close(client_read, upstream_write, "upstream"));
        let to_client = tokio::spawn(copy_then_close(upstream_read, client_write, "downstream"));
        let (up, down) = tokio::join!(to_upstream, to_client);

        let stats = TunnelStats {
            client_to_upstream: up.unwrap_or_default(),
            upstream_to_client: down.unwrap_or_default(),
        };
        metrics::tunnel_closed(stats.client_to_upstream, stats.upstream_to_client);
        stats
    }
}

const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Copy until EOF or error, then half-close `writer`.
///
/// Returns the bytes written, including those written before an error.
async fn copy_then_close<R, W>(mut reader: R, mut writer: W, direction: &'static str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::trace!(direction, copied, error = %e, "Tunnel read ended");
                break;
            }
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            tracing::trace!(direction, copied, error = %e, "Tunnel write ended");
            break;
        }
        copied += n as u64;
    }
    let _ = writer.shutdown().await;
    copied
}

/// Dial `target`, bounded by `timeout`.
pub async fn dial(target: &str, timeout: Duration) -> Result<TcpStream, TunnelError> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(TunnelError::Dial {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(TunnelError::DialTimeout {
            target: target.to_string(),
            timeout,
        }),
    }
}

/// Handle a CONNECT request.
///
/// On success the 200 response is returned immediately and the relay runs on
/// its own task once hyper hands over the raw connection. `guard` keeps the
/// tunnel counted as a live connection until the relay finishes.
pub async fn serve_connect(
    mut request: Request<Body>,
    connect_timeout: Duration,
    guard: ConnectionGuard,
) -> Result<Response, TunnelError> {
    let request_id = request
        .context()
        .map(|c| c.id.to_string())
        .unwrap_or_default();
    let target = request
        .uri()
        .authority()
        .map(|a| a.to_string())
        .ok_or_else(|| TunnelError::MissingAuthority(request.uri().clone()))?;

    let upstream = dial(&target, connect_timeout).await.inspect_err(|e| {
        metrics::record_connect_failure();
        tracing::info!(request_id = %request_id, error = %e, "CONNECT dial failed");
    })?;

    let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
        tracing::info!(
            request_id = %request_id,
            target = %target,
            "Connection does not support upgrades for CONNECT"
        );
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            "webserver doesn't support hijacking",
        )
            .into_response());
    };

    tokio::spawn(async move {
        let _guard = guard;
        match on_upgrade.await {
            Ok(upgraded) => {
                let stats = TunnelPair::new(TokioIo::new(upgraded), upstream).relay().await;
                tracing::debug!(
                    request_id = %request_id,
                    target = %target,
                    sent = stats.client_to_upstream,
                    received = stats.upstream_to_client,
                    "Tunnel closed"
                );
            }
            Err(e) => {
                tracing::info!(
                    request_id = %request_id,
                    target = %target,
                    error = %e,
                    "Cannot take over CONNECT connection"
                );
            }
        }
    });

    Ok(StatusCode::OK.into_response())
}
