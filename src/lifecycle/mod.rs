//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → listeners stop accepting → in-flight requests drain
//!             → config watcher dropped → store observers cleared
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
