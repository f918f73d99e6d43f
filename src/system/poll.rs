use std::{
    io,
    os::fd::AsRawFd,
    time::{Duration, Instant},
};

use libc::{pollfd, POLLERR, POLLHUP, POLLIN};

use crate::cutils::{cerr, was_interrupted};

/// Wait until `fd` is ready to be read, bounded by `timeout` (`None` blocks
/// indefinitely). Returns `false` if the timeout elapsed first.
///
/// A hangup or error condition counts as readable: the subsequent read is
/// what observes the platform's end-of-stream indication.
pub(crate) fn wait_readable<F: AsRawFd>(fd: &F, timeout: Option<Duration>) -> io::Result<bool> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    loop {
        let wait_ms: libc::c_int = match deadline {
            None => -1,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                remaining.as_millis().min(libc::c_int::MAX as u128) as libc::c_int
            }
        };

        let mut fds = [pollfd {
            fd: fd.as_raw_fd(),
            events: POLLIN,
            revents: 0,
        }];

        // SAFETY: the pollfd array outlives the call and its length matches.
        match cerr(unsafe { libc::poll(fds.as_mut_ptr(), 1, wait_ms) }) {
            Err(err) if was_interrupted(&err) => continue,
            Err(err) => return Err(err),
            Ok(0) => return Ok(false),
            Ok(_) => return Ok(fds[0].revents & (POLLIN | POLLHUP | POLLERR) != 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, os::unix::net::UnixStream, time::Duration};

    use super::wait_readable;

    #[test]
    fn reports_timeout_then_readiness() {
        let (rx, mut tx) = UnixStream::pair().unwrap();

        assert!(!wait_readable(&rx, Some(Duration::from_millis(50))).unwrap());

        tx.write_all(&[42]).unwrap();
        assert!(wait_readable(&rx, Some(Duration::from_millis(50))).unwrap());
    }

    #[test]
    fn hangup_counts_as_readable() {
        let (rx, tx) = UnixStream::pair().unwrap();
        drop(tx);

        assert!(wait_readable(&rx, Some(Duration::from_millis(50))).unwrap());
    }
}
