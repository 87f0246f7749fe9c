//! Kernel TCP connection table reader.
//!
//! # Responsibilities
//! - Parse `/proc/net/tcp` and `/proc/net/tcp6` line by line
//! - Decode the hex local port of each row
//! - Return the inode of the first row whose local endpoint matches
//!
//! # Design Decisions
//! - A malformed row aborts the whole scan instead of being skipped
//! - The inode is only parsed for the matching row
//! - Every failure is reported as a `TableError`; callers collapse it to "no data"
//!
//! Row format (see `Documentation/networking/proc_net_tcp.txt`):
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
//!    0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 41522 ...
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Kernel encoding of `127.0.0.1` in the IPv4 table.
pub const LOOPBACK_V4_HEX: &str = "0100007F";

/// Kernel encoding of `[::1]` in the IPv6 table.
pub const LOOPBACK_V6_HEX: &str = "00000000000000000000000001000000";

/// Minimum number of whitespace-separated fields in a data row.
const MIN_FIELDS: usize = 10;

/// Errors that stop a table scan.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("too few fields in {path}: got {found}")]
    TooFewFields { path: PathBuf, found: usize },

    #[error("cannot split local endpoint {endpoint:?} in {path}")]
    BadEndpoint { path: PathBuf, endpoint: String },

    #[error("cannot parse hex port {port:?} in {path}")]
    BadPort { path: PathBuf, port: String },

    #[error("cannot parse inode {inode:?} in {path}")]
    BadInode { path: PathBuf, inode: String },

    #[error("no socket bound to local port {port} in {path}")]
    NotFound { path: PathBuf, port: String },
}

/// One data row of a connection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRow {
    /// Local address exactly as the kernel prints it (hex).
    pub local_address_hex: String,
    /// Local port decoded to decimal, as a string for comparison with peer ports.
    pub local_port: String,
    /// Inode column, unparsed.
    pub inode_field: String,
}

impl ConnectionRow {
    /// Parse one line of the table.
    ///
    /// Returns `Ok(None)` for the header line.
    pub fn parse(line: &str, path: &Path) -> Result<Option<Self>, TableError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < MIN_FIELDS {
            return Err(TableError::TooFewFields {
                path: path.to_path_buf(),
                found: fields.len(),
            });
        }
        if fields[0] == "sl" {
            return Ok(None);
        }

        let endpoint = fields[1];
        let parts: Vec<&str> = endpoint.split(':').collect();
        let [address, port_hex] = parts.as_slice() else {
            return Err(TableError::BadEndpoint {
                path: path.to_path_buf(),
                endpoint: endpoint.to_string(),
            });
        };

        let port = i64::from_str_radix(port_hex, 16).map_err(|_| TableError::BadPort {
            path: path.to_path_buf(),
            port: port_hex.to_string(),
        })?;

        Ok(Some(Self {
            local_address_hex: address.to_string(),
            local_port: port.to_string(),
            inode_field: fields[9].to_string(),
        }))
    }

    /// Decode the inode column.
    pub fn inode(&self, path: &Path) -> Result<u64, TableError> {
        self.inode_field
            .parse::<u64>()
            .map_err(|_| TableError::BadInode {
                path: path.to_path_buf(),
                inode: self.inode_field.clone(),
            })
    }

    /// Whether this row's local endpoint is `address_hex` with decimal `port`.
    pub fn matches(&self, address_hex: &str, port: &str) -> bool {
        self.local_address_hex == address_hex && self.local_port == port
    }
}

/// Reader for a single connection table file.
#[derive(Debug, Clone)]
pub struct ConnectionTable {
    path: PathBuf,
}

impl ConnectionTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Scan the table for the socket whose local endpoint is
    /// `address_hex:port` and return its inode.
    ///
    /// The first matching row wins. Rows are re-read on every call.
    pub fn find_inode(&self, address_hex: &str, port: &str) -> Result<u64, TableError> {
        let file = File::open(&self.path).map_err(|source| TableError::Io {
            path: self.path.clone(),
            source,
        })?;

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| TableError::Io {
                path: self.path.clone(),
                source,
            })?;
            if let Some(row) = ConnectionRow::parse(&line, &self.path)? {
                if row.matches(address_hex, port) {
                    return row.inode(&self.path);
                }
            }
        }

        Err(TableError::NotFound {
            path: self.path.clone(),
            port: port.to_string(),
        })
    }
}
