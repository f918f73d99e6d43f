use std::{io::Write, time::Duration};

use crate::{
    error::Error,
    log::dev_info,
    system::{
        poll,
        term::{PtyRead, Terminal},
    },
};

use super::PtyProcess;

/// Read granularity used by [`PtyProcess::readline`].
const READ_CHUNK: usize = 1024;

impl PtyProcess {
    /// Default bounded wait used by [`PtyProcess::read_default`].
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

    /// Read up to `max_bytes` from the child's terminal, waiting at most
    /// `timeout` for data to become available (`None` blocks indefinitely).
    ///
    /// An elapsed timeout is reported as [`Error::Timeout`] and is
    /// retryable. End-of-stream is reported as [`Error::EndOfStream`]; once
    /// observed it is sticky and every subsequent read reports it again
    /// without touching the descriptor.
    pub fn read(&mut self, max_bytes: usize, timeout: Option<Duration>) -> Result<Vec<u8>, Error> {
        // Bytes already pulled off the pty are handed out first.
        if !self.buffer.is_empty() {
            let take = self.buffer.len().min(max_bytes);
            return Ok(self.buffer.drain(..take).collect());
        }

        self.read_raw(max_bytes, timeout)
    }

    /// [`PtyProcess::read`] with a short default poll.
    pub fn read_default(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error> {
        self.read(max_bytes, Some(Self::DEFAULT_READ_TIMEOUT))
    }

    /// Read until a line feed or end-of-stream, waiting at most `timeout`
    /// per read. The terminator is included; a final unterminated line is
    /// returned as-is before the next call reports end-of-stream.
    ///
    /// A timeout does not lose data: whatever was accumulated stays
    /// buffered for the next call.
    pub fn readline(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, Error> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                return Ok(self.buffer.drain(..=pos).collect());
            }

            match self.read_raw(READ_CHUNK, timeout) {
                Ok(bytes) => self.buffer.extend_from_slice(&bytes),
                Err(err) if err.is_eof() && !self.buffer.is_empty() => {
                    return Ok(std::mem::take(&mut self.buffer));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn read_raw(&mut self, max_bytes: usize, timeout: Option<Duration>) -> Result<Vec<u8>, Error> {
        if self.eof {
            return Err(Error::EndOfStream);
        }

        let leader = self.leader.as_mut().ok_or(Error::Closed)?;

        if !poll::wait_readable(leader, timeout)? {
            return Err(Error::Timeout);
        }

        let mut buf = vec![0; max_bytes];
        let count = leader.read_pty(&mut buf)?;
        if count == 0 {
            dev_info!("pty of {} reached end of stream", self.pid);
            self.eof = true;
            return Err(Error::EndOfStream);
        }

        buf.truncate(count);
        Ok(buf)
    }

    /// Write bytes to the child's terminal as if typed by a user. Returns
    /// the number of bytes written.
    ///
    /// A child that already exited hangs up the line discipline; that
    /// condition is reported as [`Error::EndOfStream`], like on the read
    /// side.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        // End-of-stream means every descriptor on the child side is gone,
        // so nothing could read what we write.
        if self.eof {
            return Err(Error::EndOfStream);
        }

        let leader = self.leader_mut()?;

        match leader.write(data) {
            Ok(count) => Ok(count),
            Err(err) if matches!(err.raw_os_error(), Some(libc::EIO) | Some(libc::EPIPE)) => {
                self.eof = true;
                Err(Error::EndOfStream)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Send a control character to the child by mnemonic, e.g.
    /// `sendcontrol('c')` for Ctrl-C. Returns the number of bytes written;
    /// a character with no control mapping writes nothing.
    pub fn sendcontrol(&mut self, ch: char) -> Result<usize, Error> {
        match control_byte(ch) {
            Some(byte) => self.write(&[byte]),
            None => Ok(0),
        }
    }

    /// Send the terminal's interrupt character (usually `^C`), looked up
    /// from the live control-character table so a remapping is honored.
    /// The line discipline turns it into SIGINT for the foreground process
    /// group.
    pub fn sendintr(&mut self) -> Result<usize, Error> {
        let byte = self.control_char_at(libc::VINTR)?;
        self.write(&[byte])
    }

    /// Send the terminal's end-of-file character (usually `^D`). Flushes
    /// pending terminal input to the child; at the start of a line it makes
    /// the child's read return zero. Does not write a newline.
    pub fn sendeof(&mut self) -> Result<usize, Error> {
        let byte = self.control_char_at(libc::VEOF)?;
        self.write(&[byte])
    }

    fn control_char_at(&self, index: usize) -> Result<u8, Error> {
        let leader = self.leader_ref()?;
        Ok(leader.control_char(index)?)
    }
}

fn control_byte(ch: char) -> Option<u8> {
    let ch = ch.to_ascii_lowercase();
    match ch {
        'a'..='z' => Some(ch as u8 - b'a' + 1),
        '@' | '`' => Some(0),
        '[' | '{' => Some(27),
        '\\' | '|' => Some(28),
        ']' | '}' => Some(29),
        '^' | '~' => Some(30),
        '_' => Some(31),
        '?' => Some(127),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::{process::Command, time::Duration};

    use pretty_assertions::assert_eq;

    use super::super::{tests::make_cat, ExitReason, PtyProcess};
    use super::control_byte;

    const READ_TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

    fn read_until_eof(child: &mut PtyProcess) -> Vec<u8> {
        let mut collected = Vec::new();
        loop {
            match child.read(1024, READ_TIMEOUT) {
                Ok(bytes) => collected.extend_from_slice(&bytes),
                Err(err) if err.is_eof() => return collected,
                Err(err) => panic!("unexpected read error: {err}"),
            }
        }
    }

    #[test]
    fn control_byte_mnemonics() {
        assert_eq!(control_byte('a'), Some(1));
        assert_eq!(control_byte('C'), Some(3));
        assert_eq!(control_byte('z'), Some(26));
        assert_eq!(control_byte('['), Some(27));
        assert_eq!(control_byte('?'), Some(127));
        assert_eq!(control_byte('1'), None);
    }

    #[test]
    fn written_bytes_come_back_from_cat() {
        let mut child = PtyProcess::spawn(make_cat()).unwrap();

        assert_eq!(child.write(b"roundtrip\n").unwrap(), 10);

        let mut collected = Vec::new();
        while !contains(&collected, b"roundtrip") {
            collected.extend_from_slice(&child.read(1024, READ_TIMEOUT).unwrap());
        }

        child.sendeof().unwrap();
        read_until_eof(&mut child);
        assert_eq!(child.wait().unwrap(), ExitReason::Code(0));
    }

    #[test]
    fn end_of_stream_is_sticky() {
        let mut child = PtyProcess::spawn(Command::new("true")).unwrap();

        read_until_eof(&mut child);
        assert!(child.eof());

        // Every further read must report end-of-stream without flapping
        // back to "data available".
        for _ in 0..3 {
            assert!(child.read(1024, READ_TIMEOUT).unwrap_err().is_eof());
        }

        child.wait().unwrap();
    }

    #[test]
    fn timeout_is_not_end_of_stream() {
        let mut child = PtyProcess::spawn(make_cat()).unwrap();

        let err = child.read(1024, Some(Duration::from_millis(50))).unwrap_err();
        assert!(err.is_timeout());
        assert!(!child.eof());

        // The default short poll behaves the same with nothing to read.
        assert!(child.read_default(1024).unwrap_err().is_timeout());

        child.terminate(true).unwrap();
    }

    #[test]
    fn readline_returns_lines_and_final_partial() {
        let mut command = Command::new("sh");
        command.args(["-c", "printf 'one\\ntwo'"]);
        let mut child = PtyProcess::spawn(command).unwrap();

        // The line discipline maps "\n" to "\r\n" on output.
        assert_eq!(child.readline(READ_TIMEOUT).unwrap(), b"one\r\n");
        assert_eq!(child.readline(READ_TIMEOUT).unwrap(), b"two");
        assert!(child.readline(READ_TIMEOUT).unwrap_err().is_eof());

        child.wait().unwrap();
    }

    #[test]
    fn sendeof_ends_cat() {
        let mut child = PtyProcess::spawn(make_cat()).unwrap();

        assert_eq!(child.sendeof().unwrap(), 1);

        read_until_eof(&mut child);
        assert_eq!(child.wait().unwrap(), ExitReason::Code(0));
    }

    #[test]
    fn sendintr_interrupts_cat() {
        let mut child = PtyProcess::spawn(make_cat()).unwrap();

        assert_eq!(child.sendintr().unwrap(), 1);

        assert_eq!(
            child.wait().unwrap(),
            ExitReason::Signal(libc::SIGINT)
        );
    }

    #[test]
    fn write_after_exit_reports_end_of_stream() {
        let mut child = PtyProcess::spawn(Command::new("true")).unwrap();
        child.wait().unwrap();
        read_until_eof(&mut child);

        // The line discipline has hung up; writes cannot reach anyone.
        assert!(child.write(b"anyone there?\n").unwrap_err().is_eof());
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|frame| frame == needle)
    }
}
