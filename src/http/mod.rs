//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1.1 driver with upgrades)
//!     → dispatch.rs (attribute peer, log, branch on method)
//!         → CONNECT: tunnel.rs (dial, 200, take over socket, relay)
//!         → other:   forward.rs via axum Router (rebuild, send, stream back)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod forward;
pub mod request;
pub mod server;
pub mod tunnel;

pub use dispatch::ProxyDispatcher;
pub use request::{RequestContext, RequestContextExt};
pub use server::{AppState, HttpServer, ServerError};
pub use tunnel::{TunnelError, TunnelPair, TunnelStats};
