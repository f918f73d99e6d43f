use std::{fmt, io, path::PathBuf};

use crate::system::signal::{signal_fmt, SignalNumber};

#[derive(Debug)]
pub enum Error {
    /// The operating system could not allocate a new pseudo-terminal pair.
    PtyAllocation(io::Error),
    /// The command was not found on the search path.
    CommandNotFound(PathBuf),
    /// The command exists but is not an executable regular file.
    InvalidCommand(PathBuf),
    /// Creating the child process failed before `exec`.
    Spawn(io::Error),
    /// An I/O error against the pty leader that is not an end-of-stream
    /// indication.
    Io(io::Error),
    /// The child side of the pty has no more writers. A signal, not a
    /// failure; sticky once observed.
    EndOfStream,
    /// The bounded wait for data elapsed with nothing to read. Retryable.
    Timeout,
    /// A terminal-attribute operation was refused or silently ignored by
    /// this platform.
    TerminalAttrs(&'static str),
    /// The handle was closed; its descriptor may not be used anymore.
    Closed,
    /// The child was reaped behind our back by a foreign `waitpid`.
    Reaped,
    /// The child was stopped by a signal; job control by a third party is
    /// not supported.
    Stopped(SignalNumber),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PtyAllocation(e) => write!(f, "cannot allocate a pseudo-terminal: {e}"),
            Error::CommandNotFound(p) => write!(f, "'{}': command not found", p.display()),
            Error::InvalidCommand(p) => write!(f, "'{}': invalid command", p.display()),
            Error::Spawn(e) => write!(f, "cannot spawn child process: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::EndOfStream => f.write_str("end of stream"),
            Error::Timeout => f.write_str("timed out waiting for data"),
            Error::TerminalAttrs(what) => write!(f, "terminal attributes: {what}"),
            Error::Closed => f.write_str("the process handle is closed"),
            Error::Reaped => {
                f.write_str("no child process; it was already waited for elsewhere")
            }
            Error::Stopped(signal) => {
                write!(f, "child process was stopped by {}", signal_fmt(*signal))
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PtyAllocation(e) | Error::Spawn(e) | Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl Error {
    /// Returns `true` if the error is [`EndOfStream`].
    ///
    /// [`EndOfStream`]: Error::EndOfStream
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    /// Returns `true` if the error is [`Timeout`].
    ///
    /// [`Timeout`]: Error::Timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Error;

    #[test]
    fn display() {
        assert_eq!(
            Error::CommandNotFound("/usr/bin/frobnicate".into()).to_string(),
            "'/usr/bin/frobnicate': command not found"
        );
        assert_eq!(Error::EndOfStream.to_string(), "end of stream");
        assert_eq!(
            Error::Stopped(libc::SIGSTOP).to_string(),
            "child process was stopped by SIGSTOP"
        );
    }

    #[test]
    fn classification() {
        assert!(Error::EndOfStream.is_eof());
        assert!(!Error::EndOfStream.is_timeout());
        assert!(Error::Timeout.is_timeout());
        assert!(!Error::Closed.is_eof());
    }
}
