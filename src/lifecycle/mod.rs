//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Limits (limits.rs):
//!     Startup → Raise open-file soft limit to the hard limit
//! ```
//!
//! # Design Decisions
//! - Shutdown has timeout: in-flight tunnels are abandoned after the deadline

#[cfg(unix)]
pub mod limits;
pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
