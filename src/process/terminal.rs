use std::{
    thread,
    time::{Duration, Instant},
};

use crate::{
    error::Error,
    system::term::{is_unsupported_attr_error, isatty, TermSize, Terminal},
};

use super::PtyProcess;

impl PtyProcess {
    /// Whether the pty currently echoes input, read from the live terminal
    /// attributes. Programs that prompt for a password typically turn echo
    /// off; see [`PtyProcess::waitnoecho`].
    pub fn getecho(&self) -> Result<bool, Error> {
        self.leader_ref()?
            .get_echo()
            .map_err(attr_error("getecho() is not supported on this platform"))
    }

    /// Turn terminal echo on or off and confirm that the change took
    /// effect. Some platforms silently ignore the change depending on the
    /// terminal state, so the flag is read back before returning; a change
    /// that did not stick is reported as [`Error::TerminalAttrs`].
    ///
    /// Anything the child echoed before the change still sits in the output
    /// queue and will be read as-is.
    pub fn setecho(&mut self, enable: bool) -> Result<(), Error> {
        let leader = self.leader_ref()?;

        leader
            .set_echo(enable)
            .map_err(attr_error("setecho() is not supported on this platform"))?;

        let applied = leader
            .get_echo()
            .map_err(attr_error("setecho() is not supported on this platform"))?;
        if applied != enable {
            return Err(Error::TerminalAttrs(
                "the echo mode change was ignored by the terminal",
            ));
        }

        Ok(())
    }

    /// Poll until the terminal stops echoing, e.g. to detect that a child
    /// is ready for a password. Returns whether echo went off before
    /// `timeout` elapsed; `None` polls indefinitely. The poll interval is
    /// the handle's [`TerminatePolicy`](super::TerminatePolicy) interval.
    pub fn waitnoecho(&mut self, timeout: Option<Duration>) -> Result<bool, Error> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            if !self.getecho()? {
                return Ok(true);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(false);
                }
            }
            thread::sleep(self.terminate_policy.interval);
        }
    }

    /// The terminal size as `(rows, cols)`, read from the kernel.
    pub fn getwinsize(&self) -> Result<(u16, u16), Error> {
        let size = self
            .leader_ref()?
            .get_size()
            .map_err(attr_error("getwinsize() is not supported on this platform"))?;
        Ok((size.rows(), size.cols()))
    }

    /// Set the size reported to tty-aware programs; the kernel notifies the
    /// child's foreground process group with SIGWINCH. The physical window
    /// is unaffected.
    pub fn setwinsize(&mut self, rows: u16, cols: u16) -> Result<(), Error> {
        self.leader_ref()?
            .set_size(TermSize::new(rows, cols))
            .map_err(attr_error("setwinsize() is not supported on this platform"))
    }

    /// Whether the handle is open and its descriptor still behaves as a
    /// terminal device.
    pub fn isatty(&self) -> bool {
        match self.leader_ref() {
            Ok(leader) => isatty(leader),
            Err(_) => false,
        }
    }
}

fn attr_error(what: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |err| {
        if is_unsupported_attr_error(&err) {
            Error::TerminalAttrs(what)
        } else {
            Error::Io(err)
        }
    }
}
