use std::{fmt, thread};

use signal_hook::consts::*;

use crate::{
    cutils::was_interrupted,
    error::Error,
    log::{dev_error, dev_info, dev_warn},
    system::{
        kill, killpg,
        signal::{signal_fmt, SignalNumber},
        wait::{Wait, WaitError, WaitOptions, WaitStatus},
    },
};

use super::{PtyProcess, TerminatePolicy};

/// Why the child is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The child called `exit` with this code.
    Code(i32),
    /// The child was terminated by this signal.
    Signal(SignalNumber),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Code(code) => write!(f, "exit code {code}"),
            ExitReason::Signal(signal) => write!(f, "terminated by {}", signal_fmt(*signal)),
        }
    }
}

impl PtyProcess {
    /// Whether the child is still running. Never blocks.
    ///
    /// If the child has terminated, this reaps it, records the exit status
    /// for [`PtyProcess::wait`] and [`PtyProcess::exit_status`], and
    /// returns `false` from then on.
    pub fn isalive(&mut self) -> Result<bool, Error> {
        if self.status.is_some() {
            return Ok(false);
        }

        loop {
            match self.pid.wait(WaitOptions::new().no_hang()) {
                Err(WaitError::NotReady) => return Ok(true),
                Err(WaitError::Io(err)) if was_interrupted(&err) => {}
                Err(WaitError::Io(err)) if err.raw_os_error() == Some(libc::ECHILD) => {
                    return Err(Error::Reaped)
                }
                Err(WaitError::Io(err)) => return Err(err.into()),
                Ok((_, status)) => {
                    self.record(status)?;
                    return Ok(false);
                }
            }
        }
    }

    /// Block until the child terminates and return how it went. Idempotent:
    /// once a terminal state is recorded, it is returned without another
    /// reap (a process can be reaped only once).
    ///
    /// This does not read from the pty; a child that fills the terminal
    /// buffer and blocks on writing will keep `wait` blocked too.
    pub fn wait(&mut self) -> Result<ExitReason, Error> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        loop {
            match self.pid.wait(WaitOptions::new()) {
                Err(WaitError::NotReady) => continue,
                Err(WaitError::Io(err)) if was_interrupted(&err) => {}
                Err(WaitError::Io(err)) if err.raw_os_error() == Some(libc::ECHILD) => {
                    return Err(Error::Reaped)
                }
                Err(WaitError::Io(err)) => return Err(err.into()),
                Ok((_, status)) => return self.record(status),
            }
        }
    }

    /// Send `signal` to the child's process group.
    ///
    /// The child was made a session leader at spawn, so its process group
    /// ID equals its PID and the signal also reaches grandchildren it put
    /// in the background. A child that is already gone is tolerated.
    pub fn kill(&mut self, signal: SignalNumber) -> Result<(), Error> {
        if self.status.is_some() {
            return Ok(());
        }

        match killpg(self.pid, signal) {
            Ok(()) => {
                dev_info!("sent {} to process group {}", signal_fmt(signal), self.pid);
                Ok(())
            }
            Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {
                // Either the child is gone, or it has not finished setsid
                // yet and its process group does not exist. Target the
                // process directly to cover the second case.
                match kill(self.pid, signal) {
                    Err(err) if err.raw_os_error() != Some(libc::ESRCH) => Err(err.into()),
                    _ => Ok(()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Kill the child with increasing urgency. SIGTERM first; if the child
    /// is still alive after the bounded poll given by
    /// [`TerminatePolicy`](super::TerminatePolicy) and `force` is set,
    /// escalate to SIGKILL and poll once more. Returns whether the child is
    /// confirmed dead.
    pub fn terminate(&mut self, force: bool) -> Result<bool, Error> {
        if !self.isalive()? {
            return Ok(true);
        }

        self.kill(SIGTERM)?;
        if self.poll_dead()? {
            return Ok(true);
        }

        if force {
            dev_warn!("{} survived SIGTERM, escalating to SIGKILL", self.pid);
            self.kill(SIGKILL)?;
            if self.poll_dead()? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn poll_dead(&mut self) -> Result<bool, Error> {
        let TerminatePolicy { attempts, interval } = self.terminate_policy;

        for _ in 0..attempts {
            if !self.isalive()? {
                return Ok(true);
            }
            thread::sleep(interval);
        }

        Ok(false)
    }

    fn record(&mut self, status: WaitStatus) -> Result<ExitReason, Error> {
        let reason = if let Some(code) = status.exit_status() {
            ExitReason::Code(code)
        } else if let Some(signal) = status.term_signal() {
            ExitReason::Signal(signal)
        } else if let Some(signal) = status.stop_signal() {
            // Should not happen without WUNTRACED; only a third party doing
            // job control on our child could trigger it.
            return Err(Error::Stopped(signal));
        } else {
            dev_error!("unexpected wait status for {}", self.pid);
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "unexpected wait status",
            )));
        };

        dev_info!("{} ({}): {reason}", self.pid, self.command_line);
        self.status = Some(reason);
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use std::{process::Command, time::Duration};

    use pretty_assertions::assert_eq;

    use super::super::{tests::make_cat, ExitReason, PtyProcess, TerminatePolicy};

    #[test]
    fn alive_after_spawn_then_reaped() {
        let mut child = PtyProcess::spawn(make_cat()).unwrap();
        assert!(child.isalive().unwrap());
        assert_eq!(child.exit_status(), None);

        child.kill(libc::SIGKILL).unwrap();

        // isalive flips to false as soon as the kernel has the status.
        let mut attempts = 0;
        while child.isalive().unwrap() {
            attempts += 1;
            assert!(attempts < 100, "child never died");
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(child.exit_status(), Some(ExitReason::Signal(libc::SIGKILL)));
        // The cached state keeps answering without another reap.
        assert!(!child.isalive().unwrap());
        assert_eq!(child.wait().unwrap(), ExitReason::Signal(libc::SIGKILL));
    }

    #[test]
    fn wait_reports_exit_code() {
        let mut command = Command::new("sh");
        command.args(["-c", "exit 7"]);
        let mut child = PtyProcess::spawn(command).unwrap();

        assert_eq!(child.wait().unwrap(), ExitReason::Code(7));
        // Idempotent after the reap.
        assert_eq!(child.wait().unwrap(), ExitReason::Code(7));
        assert!(!child.isalive().unwrap());
    }

    #[test]
    fn kill_after_exit_is_tolerated() {
        let mut child = PtyProcess::spawn(Command::new("true")).unwrap();
        child.wait().unwrap();

        child.kill(libc::SIGTERM).unwrap();
        child.kill(libc::SIGKILL).unwrap();
    }

    #[test]
    fn terminate_escalates_on_a_term_ignoring_child() {
        let mut command = Command::new("sh");
        command.args(["-c", "trap '' TERM; while :; do sleep 0.1; done"]);
        let mut child = PtyProcess::spawn(command).unwrap();

        child.set_terminate_policy(TerminatePolicy {
            attempts: 5,
            interval: Duration::from_millis(50),
        });

        // Graceful-only gives up within the bounded retry budget.
        assert!(!child.terminate(false).unwrap());
        assert!(child.isalive().unwrap());

        // Forced escalation succeeds.
        assert!(child.terminate(true).unwrap());
        assert!(!child.isalive().unwrap());
        assert_eq!(child.exit_status(), Some(ExitReason::Signal(libc::SIGKILL)));
    }

    #[test]
    fn terminate_on_a_cooperative_child() {
        let mut child = PtyProcess::spawn(make_cat()).unwrap();
        assert!(child.terminate(false).unwrap());
        assert_eq!(child.exit_status(), Some(ExitReason::Signal(libc::SIGTERM)));
    }
}
