use std::{fmt, path::Path, process::Command, time::Duration};

use std::os::unix::process::CommandExt;

use crate::{
    error::Error,
    log::{dev_info, dev_warn},
    system::{
        _exit, close_all_beyond_stdio, dup2, fork, resolve_program, setsid,
        term::{is_unsupported_attr_error, Pty, PtyFollower, PtyLeader, TermSize, Terminal},
        ForkResult, ProcessId,
    },
};

mod io;
mod lifecycle;
mod terminal;

pub use lifecycle::ExitReason;

/// Exit status used when the child cannot set up its terminal or `exec` the
/// command; the shell convention for "command not found", so the failure is
/// observable as a process exit rather than a hang.
const EXEC_FAILURE_STATUS: libc::c_int = 127;

/// Settings applied to the pty before the command runs.
#[derive(Debug, Clone, Copy)]
pub struct SpawnOptions {
    /// Whether the terminal echoes input (the ECHO local mode flag).
    pub echo: bool,
    /// Initial terminal size.
    pub window_size: TermSize,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            echo: true,
            window_size: TermSize::new(24, 80),
        }
    }
}

/// Bounded-retry policy for [`PtyProcess::terminate`] and
/// [`PtyProcess::waitnoecho`]: how many liveness checks to perform and how
/// long to sleep between them.
///
/// There is no single correct value for these; the defaults are short
/// enough for interactive use and can be replaced per handle.
#[derive(Debug, Clone, Copy)]
pub struct TerminatePolicy {
    /// Number of checks before giving up.
    pub attempts: u32,
    /// Sleep between consecutive checks.
    pub interval: Duration,
}

impl Default for TerminatePolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(100),
        }
    }
}

/// A process running on its own pseudo-terminal.
///
/// The handle exclusively owns the pty leader descriptor and the child's
/// PID. It is not synchronized: drive one handle from one thread at a time.
pub struct PtyProcess {
    pid: ProcessId,
    /// `None` once the handle has been closed.
    leader: Option<PtyLeader>,
    /// Bytes read from the pty but not yet handed to the caller.
    buffer: Vec<u8>,
    /// Sticky end-of-stream flag; never resets once set.
    eof: bool,
    /// Terminal state of the child, recorded by the reap that observed it.
    status: Option<ExitReason>,
    terminate_policy: TerminatePolicy,
    command_line: String,
}

impl PtyProcess {
    /// Start `command` in a child process on a freshly allocated
    /// pseudo-terminal, with echo enabled and a 24x80 window.
    ///
    /// Working directory and environment overrides are taken from the
    /// [`Command`] builder itself.
    pub fn spawn(command: Command) -> Result<PtyProcess, Error> {
        Self::spawn_with_options(command, SpawnOptions::default())
    }

    /// Like [`PtyProcess::spawn`], with explicit terminal settings.
    pub fn spawn_with_options(
        command: Command,
        options: SpawnOptions,
    ) -> Result<PtyProcess, Error> {
        let program = resolve_program(&command)?;
        let pty = Pty::open().map_err(Error::PtyAllocation)?;

        let command_line = render_command_line(&program, &command);

        let ForkResult::Parent(pid) = fork().map_err(Error::Spawn)? else {
            // From here on we are the child and must not return into the
            // caller's code under any circumstances.
            let err = exec_on_follower(command, pty.follower, &options);
            dev_warn!("cannot execute {command_line}: {err}");
            _exit(EXEC_FAILURE_STATUS);
        };

        // The parent must not keep the follower open, or it would read its
        // own child's terminal by accident.
        drop(pty.follower);

        // A command that exits immediately can tear down the follower before
        // we get here, leaving the leader unwilling to take attribute calls.
        if let Err(err) = pty.leader.set_size(options.window_size) {
            if !is_unsupported_attr_error(&err) {
                return Err(err.into());
            }
        }

        dev_info!("spawned {command_line} with pid {pid}");

        Ok(Self {
            pid,
            leader: Some(pty.leader),
            buffer: Vec::new(),
            eof: false,
            status: None,
            terminate_policy: TerminatePolicy::default(),
            command_line,
        })
    }

    /// The process ID of the child.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Whether end-of-stream has been observed on the pty.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// The child's exit status, if a reap has recorded one already.
    pub fn exit_status(&self) -> Option<ExitReason> {
        self.status
    }

    pub fn terminate_policy(&self) -> TerminatePolicy {
        self.terminate_policy
    }

    pub fn set_terminate_policy(&mut self, policy: TerminatePolicy) {
        self.terminate_policy = policy;
    }

    /// Release the pty leader descriptor.
    ///
    /// After closing, I/O and terminal-attribute calls fail with
    /// [`Error::Closed`]. Closing an already-closed handle, or one whose
    /// child has long exited, is a no-op.
    pub fn close(&mut self) {
        if self.leader.take().is_some() {
            dev_info!("closed pty leader for {}", self.pid);
        }
    }

    fn leader_ref(&self) -> Result<&PtyLeader, Error> {
        self.leader.as_ref().ok_or(Error::Closed)
    }

    fn leader_mut(&mut self) -> Result<&mut PtyLeader, Error> {
        self.leader.as_mut().ok_or(Error::Closed)
    }
}

impl fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtyProcess")
            .field("pid", &self.pid)
            .field("command", &self.command_line)
            .field("closed", &self.leader.is_none())
            .field("eof", &self.eof)
            .field("status", &self.status)
            .finish()
    }
}

fn render_command_line(program: &Path, command: &Command) -> String {
    let mut line = program.display().to_string();
    for arg in command.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Child-side branch of spawn: turn the follower into the controlling
/// terminal and the stdio streams, then replace ourselves with the command.
/// Only returns if something went wrong.
fn exec_on_follower(
    mut command: Command,
    follower: PtyFollower,
    options: &SpawnOptions,
) -> std::io::Error {
    if let Err(err) = follower_setup(&follower, options) {
        return err;
    }

    command.exec()
}

fn follower_setup(follower: &PtyFollower, options: &SpawnOptions) -> std::io::Result<()> {
    // Start a new terminal session with the child as the leader.
    setsid()?;

    // Set the follower side of the pty as the controlling terminal for the
    // session.
    follower.make_controlling_terminal()?;

    // Window size and echo may be refused if the follower has lost its
    // terminal nature; that is not fatal.
    if let Err(err) = follower.set_size(options.window_size) {
        if !is_unsupported_attr_error(&err) {
            return Err(err);
        }
    }
    if !options.echo {
        if let Err(err) = follower.set_echo(false) {
            if !is_unsupported_attr_error(&err) {
                return Err(err);
            }
        }
    }

    dup2(follower, libc::STDIN_FILENO)?;
    dup2(follower, libc::STDOUT_FILENO)?;
    dup2(follower, libc::STDERR_FILENO)?;

    // The child must not inherit any other descriptor, the leader included.
    close_all_beyond_stdio()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{os::unix::fs::PermissionsExt, process::Command, time::Duration};

    use pretty_assertions::assert_eq;

    use super::{ExitReason, PtyProcess, SpawnOptions, TerminatePolicy};
    use crate::{error::Error, system::tests::tempfile_path};

    #[test]
    fn spawn_missing_command_fails_before_forking() {
        let err = PtyProcess::spawn(Command::new("ptyspawn-no-such-command")).unwrap_err();
        assert!(matches!(err, Error::CommandNotFound(_)));
    }

    #[test]
    fn exec_failure_is_observable_as_exit_status() {
        // Executable permission but an interpreter that cannot exist, so
        // resolution succeeds and exec itself fails in the child.
        let path = tempfile_path("badinterp");
        std::fs::write(&path, "#!/ptyspawn-no-such-interpreter\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut child = PtyProcess::spawn(Command::new(&path)).unwrap();
        assert_eq!(child.wait().unwrap(), ExitReason::Code(127));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let mut child = PtyProcess::spawn(Command::new("true")).unwrap();
        child.wait().unwrap();

        child.close();
        child.close();

        assert!(matches!(
            child.read(16, Some(Duration::from_millis(10))),
            Err(Error::Closed)
        ));
        assert!(matches!(child.write(b"x"), Err(Error::Closed)));
        assert!(matches!(child.getecho(), Err(Error::Closed)));
    }

    #[test]
    fn spawn_applies_window_size_hint() {
        let options = SpawnOptions {
            window_size: crate::system::term::TermSize::new(40, 100),
            ..Default::default()
        };
        let mut child = PtyProcess::spawn_with_options(make_cat(), options).unwrap();

        assert_eq!(child.getwinsize().unwrap(), (40, 100));

        child.terminate(true).unwrap();
    }

    #[test]
    fn debug_output_names_the_command() {
        let mut child = PtyProcess::spawn(Command::new("true")).unwrap();
        let rendered = format!("{child:?}");
        assert!(rendered.contains("true"), "{rendered}");
        child.wait().unwrap();
    }

    #[test]
    fn terminate_policy_is_configurable() {
        let mut child = PtyProcess::spawn(make_cat()).unwrap();
        child.set_terminate_policy(TerminatePolicy {
            attempts: 3,
            interval: Duration::from_millis(20),
        });
        assert_eq!(child.terminate_policy().attempts, 3);

        assert!(child.terminate(true).unwrap());
    }

    pub(super) fn make_cat() -> Command {
        Command::new("cat")
    }
}
