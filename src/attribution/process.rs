//! Inode to process resolution.
//!
//! Walks `<proc_root>/<pid>/fd/*` for every numeric entry of the process root
//! and stats each descriptor until one points at the requested inode.
//!
//! Only processes visible to the current user can be inspected. Directories
//! that cannot be opened are skipped without error; running as root widens
//! the search.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A process holding a socket, rendered as `name@pid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    pub command_name: String,
    pub pid: String,
}

impl fmt::Display for ProcessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.command_name, self.pid)
    }
}

/// Scans a process root directory for the owner of an inode.
#[derive(Debug, Clone)]
pub struct InodeResolver {
    proc_root: PathBuf,
}

impl InodeResolver {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Find the first process with an open descriptor on `inode`.
    pub fn resolve(&self, inode: u64) -> Option<ProcessDescriptor> {
        let entries = match fs::read_dir(&self.proc_root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(root = %self.proc_root.display(), error = %e, "Cannot list process root");
                return None;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str().filter(|n| n.parse::<u64>().is_ok()) else {
                continue;
            };
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }

            let process_dir = entry.path();
            if !holds_inode(&process_dir, inode) {
                continue;
            }

            match read_command_name(&process_dir) {
                Some(command_name) => {
                    return Some(ProcessDescriptor {
                        command_name,
                        pid: pid.to_string(),
                    });
                }
                None => continue,
            }
        }

        None
    }
}

/// Whether any descriptor under `<process_dir>/fd` resolves to `inode`.
fn holds_inode(process_dir: &Path, inode: u64) -> bool {
    let fd_dir = process_dir.join("fd");
    let descriptors = match fs::read_dir(&fd_dir) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            tracing::trace!(dir = %fd_dir.display(), error = %e, "Skipping process");
            return false;
        }
    };

    descriptors
        .flatten()
        // fs::metadata follows the fd symlink to the socket itself.
        .filter_map(|fd| fs::metadata(fd.path()).ok())
        .any(|meta| inode_of(&meta) == Some(inode))
}

#[cfg(unix)]
fn inode_of(meta: &fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode_of(_meta: &fs::Metadata) -> Option<u64> {
    None
}

/// Read `<process_dir>/comm`, dropping a single trailing newline.
fn read_command_name(process_dir: &Path) -> Option<String> {
    let path = process_dir.join("comm");
    match fs::read_to_string(&path) {
        Ok(mut comm) => {
            if comm.ends_with('\n') {
                comm.pop();
            }
            Some(comm)
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot read command name");
            None
        }
    }
}
