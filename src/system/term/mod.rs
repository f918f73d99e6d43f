use std::{
    fmt,
    fs::File,
    io::{self, Read, Write},
    mem::MaybeUninit,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    ptr::null_mut,
};

use crate::cutils::cerr;

pub(crate) struct Pty {
    /// The leader side of the pty.
    pub(crate) leader: PtyLeader,
    /// The follower side of the pty.
    pub(crate) follower: PtyFollower,
}

impl Pty {
    pub(crate) fn open() -> io::Result<Self> {
        // Create two integers to hold the file descriptors for each side of
        // the pty.
        let (mut leader, mut follower) = (0, 0);

        // SAFETY: openpty only writes to the provided out-pointers; passing
        // null for the name, termios and winsize arguments is documented.
        cerr(unsafe {
            libc::openpty(
                &mut leader,
                &mut follower,
                null_mut(),
                null_mut::<libc::termios>(),
                null_mut::<libc::winsize>(),
            )
        })?;

        Ok(Self {
            leader: PtyLeader {
                // SAFETY: openpty succeeded, so `leader` is an open descriptor
                // owned by no one else.
                file: unsafe { OwnedFd::from_raw_fd(leader) }.into(),
            },
            follower: PtyFollower {
                // SAFETY: same as above for `follower`.
                file: unsafe { OwnedFd::from_raw_fd(follower) }.into(),
            },
        })
    }
}

pub(crate) struct PtyLeader {
    file: File,
}

impl io::Read for PtyLeader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl io::Write for PtyLeader {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl AsRawFd for PtyLeader {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

pub(crate) struct PtyFollower {
    file: File,
}

impl AsRawFd for PtyFollower {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// The size of a terminal in character cells.
#[derive(Clone, Copy)]
pub struct TermSize {
    raw: libc::winsize,
}

impl TermSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            raw: libc::winsize {
                ws_row: rows,
                ws_col: cols,
                // The pixel fields are unused by the line discipline.
                ws_xpixel: 0,
                ws_ypixel: 0,
            },
        }
    }

    pub fn rows(&self) -> u16 {
        self.raw.ws_row
    }

    pub fn cols(&self) -> u16 {
        self.raw.ws_col
    }
}

impl fmt::Debug for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermSize")
            .field("rows", &self.rows())
            .field("cols", &self.cols())
            .finish()
    }
}

impl PartialEq for TermSize {
    fn eq(&self, other: &Self) -> bool {
        self.rows() == other.rows() && self.cols() == other.cols()
    }
}

impl Eq for TermSize {}

mod sealed {
    use std::os::fd::AsRawFd;

    pub(crate) trait Sealed {}

    impl<F: AsRawFd> Sealed for F {}
}

pub(crate) trait Terminal: sealed::Sealed {
    fn make_controlling_terminal(&self) -> io::Result<()>;
    fn get_echo(&self) -> io::Result<bool>;
    fn set_echo(&self, enable: bool) -> io::Result<()>;
    fn control_char(&self, index: usize) -> io::Result<u8>;
    fn get_size(&self) -> io::Result<TermSize>;
    fn set_size(&self, size: TermSize) -> io::Result<()>;
}

impl<F: AsRawFd> Terminal for F {
    /// Make the given terminal the controlling terminal of the calling process.
    fn make_controlling_terminal(&self) -> io::Result<()> {
        // SAFETY: TIOCSCTTY takes an integer argument.
        cerr(unsafe { libc::ioctl(self.as_raw_fd(), libc::TIOCSCTTY, 0) })?;
        Ok(())
    }

    /// Whether the ECHO flag is set in the terminal's local modes.
    fn get_echo(&self) -> io::Result<bool> {
        let attr = tcgetattr(self.as_raw_fd())?;
        Ok(attr.c_lflag & libc::ECHO != 0)
    }

    /// Set or clear the ECHO flag in the terminal's local modes.
    fn set_echo(&self, enable: bool) -> io::Result<()> {
        let mut attr = tcgetattr(self.as_raw_fd())?;

        if enable {
            attr.c_lflag |= libc::ECHO;
        } else {
            attr.c_lflag &= !libc::ECHO;
        }

        // TCSANOW: the drain/flush variants have been observed to block or
        // to be ignored on some platforms.
        // SAFETY: the termios value was fully initialized by tcgetattr.
        cerr(unsafe { libc::tcsetattr(self.as_raw_fd(), libc::TCSANOW, &attr) }).map(|_| ())
    }

    /// Look up one of the terminal's special characters (`VINTR`, `VEOF`, ...)
    /// in its current control-character table.
    fn control_char(&self, index: usize) -> io::Result<u8> {
        let attr = tcgetattr(self.as_raw_fd())?;
        Ok(attr.c_cc[index])
    }

    /// The terminal size as reported by the kernel.
    fn get_size(&self) -> io::Result<TermSize> {
        let mut size = MaybeUninit::<libc::winsize>::uninit();

        // SAFETY: TIOCGWINSZ writes a winsize through the provided pointer.
        cerr(unsafe { libc::ioctl(self.as_raw_fd(), libc::TIOCGWINSZ, size.as_mut_ptr()) })?;

        Ok(TermSize {
            // SAFETY: the ioctl succeeded, so `size` was written.
            raw: unsafe { size.assume_init() },
        })
    }

    /// Set the terminal size. The kernel notifies the foreground process
    /// group with SIGWINCH.
    fn set_size(&self, size: TermSize) -> io::Result<()> {
        // SAFETY: TIOCSWINSZ reads a winsize through the provided pointer.
        cerr(unsafe { libc::ioctl(self.as_raw_fd(), libc::TIOCSWINSZ, &size.raw) }).map(|_| ())
    }
}

fn tcgetattr(fd: RawFd) -> io::Result<libc::termios> {
    let mut attr = MaybeUninit::<libc::termios>::uninit();

    // SAFETY: tcgetattr writes a termios through the provided pointer.
    cerr(unsafe { libc::tcgetattr(fd, attr.as_mut_ptr()) })?;

    // SAFETY: the call succeeded, so `attr` was written.
    Ok(unsafe { attr.assume_init() })
}

/// Whether the descriptor refers to a terminal device.
pub(crate) fn isatty<F: AsRawFd>(fd: &F) -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(fd.as_raw_fd()) == 1 }
}

/// Whether an error means "this descriptor does not support terminal
/// attribute operations" rather than a genuine failure.
pub(crate) fn is_unsupported_attr_error(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINVAL) | Some(libc::ENOTTY)
    )
}

pub(crate) trait PtyRead: sealed::Sealed {
    /// Read from the pty leader, normalizing the platform's end-of-stream
    /// indication to a zero-length read.
    fn read_pty(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

// Linux-family kernels fail the read with EIO once the follower side has
// been fully closed and the line discipline drained.
#[cfg(any(target_os = "linux", target_os = "android"))]
impl PtyRead for PtyLeader {
    fn read_pty(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.read(buf) {
            Err(err) if err.raw_os_error() == Some(libc::EIO) => Ok(0),
            result => result,
        }
    }
}

// BSD-family kernels report the same condition as a clean zero-length read.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl PtyRead for PtyLeader {
    fn read_pty(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}
