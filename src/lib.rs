//! Spawn a child process on a newly allocated pseudo-terminal and drive it
//! through a [`PtyProcess`] handle: read the child's terminal output, write
//! input as if typed by a user, control echo and window size, deliver
//! control characters and signals, and await termination.
//!
//! ```no_run
//! use std::process::Command;
//! use std::time::Duration;
//! use ptyspawn::{ExitReason, PtyProcess};
//!
//! # fn main() -> Result<(), ptyspawn::Error> {
//! let mut cat = PtyProcess::spawn(Command::new("cat"))?;
//!
//! cat.write(b"ping\n")?;
//! let echoed = cat.read(1024, Some(Duration::from_secs(1)))?;
//! assert!(!echoed.is_empty());
//!
//! cat.sendeof()?;
//! assert_eq!(cat.wait()?, ExitReason::Code(0));
//! # Ok(())
//! # }
//! ```
//!
//! A handle exclusively owns its pty leader descriptor and child PID, and
//! is meant to be driven from a single thread; concurrent calls on one
//! handle must be serialized by the caller. Reads are bounded by a caller
//! timeout, [`PtyProcess::wait`] blocks until the child exits, and
//! [`PtyProcess::isalive`] never blocks.

pub(crate) mod cutils;
mod error;
pub(crate) mod log;
mod process;
pub(crate) mod system;
mod unicode;

pub use error::Error;
pub use process::{ExitReason, PtyProcess, SpawnOptions, TerminatePolicy};
pub use system::signal::SignalNumber;
pub use system::term::TermSize;
pub use system::ProcessId;
pub use unicode::UnicodePtyProcess;
