//! Process resource limits.
//!
//! Every client connection holds one descriptor and every tunnel holds two,
//! so the usual soft limit of 1024 is reached long before
//! `listener.max_connections`. The soft limit is raised to the hard limit at
//! startup; failure is logged and startup continues.

use nix::sys::resource::{getrlimit, rlim_t, setrlimit, Resource};

/// Open-file limits before and after [`raise_open_file_limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFileLimit {
    pub previous: rlim_t,
    pub current: rlim_t,
}

/// Raise the `RLIMIT_NOFILE` soft limit to the hard limit.
pub fn raise_open_file_limit() -> nix::Result<OpenFileLimit> {
    let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE)?;
    if soft < hard {
        setrlimit(Resource::RLIMIT_NOFILE, hard, hard)?;
    }
    Ok(OpenFileLimit {
        previous: soft,
        current: soft.max(hard),
    })
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn soft_limit_reaches_hard_limit() {
        let limit = raise_open_file_limit().unwrap();
        let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE).unwrap();
        assert_eq!(soft, hard);
        assert_eq!(limit.current, hard);
        assert!(limit.previous <= limit.current);

        // Already at the hard limit: nothing left to raise.
        let again = raise_open_file_limit().unwrap();
        assert_eq!(again.previous, again.current);
    }
}
