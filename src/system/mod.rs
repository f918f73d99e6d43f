use std::{
    fmt, fs, io,
    os::fd::AsRawFd,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    process::Command,
};

use crate::{cutils::cerr, error::Error};

use self::signal::SignalNumber;

pub(crate) mod poll;
pub mod signal;
pub mod term;
pub(crate) mod wait;

/// An operating-system process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(libc::pid_t);

impl ProcessId {
    pub fn new(id: libc::pid_t) -> Self {
        Self(id)
    }

    pub fn get(&self) -> libc::pid_t {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) enum ForkResult {
    // Parent process branch with the child process' PID.
    Parent(ProcessId),
    // Child process branch.
    Child,
}

/// Create a new process.
pub(crate) fn fork() -> io::Result<ForkResult> {
    // SAFETY: handles are driven from a single thread (see the concurrency
    // contract on `PtyProcess`), and the child branch only runs
    // exec-preparation code before replacing itself.
    let pid = cerr(unsafe { libc::fork() })?;
    if pid == 0 {
        Ok(ForkResult::Child)
    } else {
        Ok(ForkResult::Parent(ProcessId::new(pid)))
    }
}

/// Start a new session with the calling process as its leader.
pub(crate) fn setsid() -> io::Result<ProcessId> {
    // SAFETY: setsid takes no arguments and cannot cause UB.
    cerr(unsafe { libc::setsid() }).map(ProcessId::new)
}

/// Send a signal to a process with the specified ID.
pub(crate) fn kill(pid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: this function cannot cause UB even if `pid` is not a valid
    // process ID or if `signal` is not a valid signal code.
    cerr(unsafe { libc::kill(pid.get(), signal) }).map(|_| ())
}

/// Send a signal to a process group with the specified ID.
pub(crate) fn killpg(pgid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: this function cannot cause UB even if `pgid` is not a valid
    // process group ID or if `signal` is not a valid signal code.
    cerr(unsafe { libc::killpg(pgid.get(), signal) }).map(|_| ())
}

/// Duplicate `src` onto the descriptor number `dst`, replacing it.
pub(crate) fn dup2<F: AsRawFd>(src: &F, dst: libc::c_int) -> io::Result<()> {
    // SAFETY: dup2 validates both descriptors and reports EBADF itself.
    cerr(unsafe { libc::dup2(src.as_raw_fd(), dst) }).map(|_| ())
}

pub(crate) fn _exit(status: libc::c_int) -> ! {
    // SAFETY: _exit does not return.
    unsafe { libc::_exit(status) }
}

/// Close every file descriptor beyond the stdio streams, so the child does
/// not inherit descriptors open in the parent.
#[cfg(target_os = "linux")]
pub(crate) fn close_all_beyond_stdio() -> io::Result<()> {
    use std::ffi::c_uint;

    let first = libc::STDERR_FILENO as c_uint + 1;
    // SAFETY: close_range cannot cause UB for any descriptor range.
    match cerr(unsafe { libc::syscall(libc::SYS_close_range, first, c_uint::MAX, 0 as c_uint) }) {
        // close_range needs a kernel >= 5.9.
        Err(err) if err.raw_os_error() == Some(libc::ENOSYS) => sweep_fds_beyond_stdio(),
        result => result.map(|_| ()),
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn close_all_beyond_stdio() -> io::Result<()> {
    sweep_fds_beyond_stdio()
}

fn sweep_fds_beyond_stdio() -> io::Result<()> {
    let open_max = crate::cutils::sysconf(libc::_SC_OPEN_MAX).unwrap_or(1024);
    for fd in (libc::STDERR_FILENO + 1)..open_max as libc::c_int {
        // SAFETY: closing an unused descriptor number reports EBADF, which
        // is exactly what we want to ignore here.
        unsafe { libc::close(fd) };
    }
    Ok(())
}

// Checks whether the path actually describes a qualified path (i.e. contains
// "/") or just names a file, in which case it is resolved via PATH.
fn is_qualified(path: impl AsRef<Path>) -> bool {
    path.as_ref().parent() != Some(Path::new(""))
}

fn is_valid_executable(path: &PathBuf) -> bool {
    if path.is_file() {
        match fs::metadata(path) {
            Ok(meta) => meta.mode() & 0o111 != 0,
            _ => false,
        }
    } else {
        false
    }
}

fn resolve_path(command: &Path, path: &str) -> Option<PathBuf> {
    path.split(':')
        .map(Path::new)
        // ignore all relative paths ("", "." or "./")
        .filter(|path| path.is_absolute())
        .map(|path| path.join(command))
        .find(is_valid_executable)
}

/// Resolve the program of a [`Command`] the way `exec` will, so that a
/// missing or non-executable command is reported at spawn time instead of
/// as a child that dies immediately.
pub(crate) fn resolve_program(command: &Command) -> Result<PathBuf, Error> {
    let program = PathBuf::from(command.get_program());

    if is_qualified(&program) {
        if is_valid_executable(&program) {
            Ok(program)
        } else if program.exists() {
            Err(Error::InvalidCommand(program))
        } else {
            Err(Error::CommandNotFound(program))
        }
    } else {
        let path = std::env::var("PATH").unwrap_or_default();
        resolve_path(&program, &path).ok_or(Error::CommandNotFound(program))
    }
}
