//! Per-request context.
//!
//! # Responsibilities
//! - Generate a unique request ID for log correlation
//! - Carry the canonical peer address and its attribution label
//! - Render the request target the way it is logged
//!
//! # Design Decisions
//! - The context travels as a request extension, never as a header, so
//!   forwarded requests reach upstream exactly as the client sent them

use std::net::SocketAddr;

use axum::http::{Request, Uri};
use uuid::Uuid;

use crate::attribution::Attribution;

/// Everything the proxy learned about a request before handling it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub process: Attribution,
}

impl RequestContext {
    pub fn new(peer: SocketAddr, process: Attribution) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            process,
        }
    }
}

/// Access to the [`RequestContext`] stored on a request.
pub trait RequestContextExt {
    fn context(&self) -> Option<&RequestContext>;
}

impl<B> RequestContextExt for Request<B> {
    fn context(&self) -> Option<&RequestContext> {
        self.extensions().get::<RequestContext>()
    }
}

/// Normalise a peer so IPv4 clients of a dual-stack listener look like IPv4.
pub fn canonical_peer(peer: SocketAddr) -> SocketAddr {
    SocketAddr::new(peer.ip().to_canonical(), peer.port())
}

/// `scheme://host/path` for absolute-form targets, the authority for CONNECT.
pub fn display_target(uri: &Uri) -> String {
    match uri.scheme_str() {
        Some(scheme) => format!(
            "{}://{}{}",
            scheme,
            uri.authority().map(|a| a.as_str()).unwrap_or_default(),
            uri.path()
        ),
        None => match uri.authority() {
            Some(authority) => authority.to_string(),
            None => uri.path().to_string(),
        },
    }
}
