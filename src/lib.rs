//! Forward HTTP/HTTPS proxy that attributes each connection to the local
//! process that opened it.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::listener ──▶ http::server ──▶ http::dispatch ──▶ attribution
//!                                                      │            (tcp table → inode → name@pid)
//!                                         ┌────────────┴────────────┐
//!                                         ▼                         ▼
//!                                  http::tunnel               http::forward
//!                                  (CONNECT relay)            (shared client)
//!                                         │                         │
//!                                         └──────────▶ upstream ◀───┘
//! ```

pub mod attribution;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use attribution::{Attribution, ProcessAttributor};
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
