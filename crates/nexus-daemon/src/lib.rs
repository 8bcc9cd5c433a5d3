//! The Daemon and Batch Controller (spec §4.11): the stdin/stdout request
//! loop, command dispatch table, per-request watchdog, and graceful
//! shutdown on `quit`/SIGINT/SIGTERM.

pub mod batch;
pub mod daemon;
pub mod stdio;

pub use daemon::Daemon;
pub use stdio::run_stdio;
