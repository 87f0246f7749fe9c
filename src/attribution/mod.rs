//! Process attribution subsystem.
//!
//! # Data Flow
//! ```text
//! peer "host:port"
//!     → PeerAddress::parse (split on last ':')
//!     → loopback? no  → Attribution::Remote
//!     → table.rs (connection table scan → inode)
//!     → process.rs (process table / fd scan → name@pid)
//!     → Attribution::Process | Attribution::NoData
//! ```
//!
//! # Design Decisions
//! - Nothing is cached: sockets and pids are reused too quickly for a cache
//!   to stay correct, so every lookup reads the kernel tables afresh
//! - Only loopback peers are resolved; remote hosts are never inspected
//! - Every failure degrades to `NoData`; attribution never fails a request
//! - Lookups are blocking filesystem scans, run off the async executor

pub mod process;
pub mod table;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::AttributionConfig;

pub use process::{InodeResolver, ProcessDescriptor};
pub use table::{ConnectionRow, ConnectionTable, TableError, LOOPBACK_V4_HEX, LOOPBACK_V6_HEX};

/// IPv4 loopback literal as it appears in a peer address.
const LOOPBACK_V4: &str = "127.0.0.1";

/// IPv6 loopback literal as it appears in a peer address (bracketed).
const LOOPBACK_V6: &str = "[::1]";

/// Result of attributing a peer to a local process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// The local process owning the peer socket.
    Process(ProcessDescriptor),
    /// The peer is not on this host.
    Remote,
    /// The peer is local (or unparseable) but no owner could be found.
    NoData,
}

impl Attribution {
    /// Short label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Attribution::Process(_) => "process",
            Attribution::Remote => "remote",
            Attribution::NoData => "no_data",
        }
    }
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribution::Process(p) => write!(f, "{}", p),
            Attribution::Remote => f.write_str("remote"),
            Attribution::NoData => f.write_str("no_data"),
        }
    }
}

/// A peer endpoint split into host and port.
///
/// IPv6 hosts keep their brackets, e.g. `[::1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub ip: String,
    pub port: String,
}

impl PeerAddress {
    /// Split `host:port` on the last colon.
    pub fn parse(addr: &str) -> Option<Self> {
        let (ip, port) = addr.rsplit_once(':')?;
        Some(Self {
            ip: ip.to_string(),
            port: port.to_string(),
        })
    }
}

/// Maps a peer address to the local process that opened the connection.
#[derive(Debug, Clone)]
pub struct ProcessAttributor {
    tcp: ConnectionTable,
    tcp6: ConnectionTable,
    resolver: InodeResolver,
}

impl ProcessAttributor {
    /// Build an attributor reading from the given proc filesystem root.
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = proc_root.into();
        Self {
            tcp: ConnectionTable::new(root.join("net").join("tcp")),
            tcp6: ConnectionTable::new(root.join("net").join("tcp6")),
            resolver: InodeResolver::new(root),
        }
    }

    pub fn from_config(config: &AttributionConfig) -> Self {
        Self::new(Path::new(&config.proc_root))
    }

    /// Attribute `remote_addr` (`host:port`) to a local process.
    pub fn attribute(&self, remote_addr: &str) -> Attribution {
        let Some(peer) = PeerAddress::parse(remote_addr) else {
            tracing::debug!(remote_addr, "Peer address is not of the form host:port");
            return Attribution::NoData;
        };

        let (table, loopback_hex) = match peer.ip.as_str() {
            LOOPBACK_V6 => (&self.tcp6, LOOPBACK_V6_HEX),
            LOOPBACK_V4 => (&self.tcp, LOOPBACK_V4_HEX),
            _ => return Attribution::Remote,
        };

        let inode = match table.find_inode(loopback_hex, &peer.port) {
            Ok(inode) => inode,
            Err(e) => {
                tracing::debug!(error = %e, "Connection table lookup failed");
                return Attribution::NoData;
            }
        };

        match self.resolver.resolve(inode) {
            Some(process) => Attribution::Process(process),
            None => {
                tracing::debug!(
                    inode,
                    port = %peer.port,
                    "Socket found but no process holds its inode"
                );
                Attribution::NoData
            }
        }
    }

    /// Run [`attribute`](Self::attribute) on the blocking pool.
    pub async fn attribute_async(&self, remote_addr: String) -> Attribution {
        let attributor = self.clone();
        tokio::task::spawn_blocking(move || attributor.attribute(&remote_addr))
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Attribution task failed");
                Attribution::NoData
            })
    }
}

impl Default for ProcessAttributor {
    fn default() -> Self {
        Self::new("/proc")
    }
}
