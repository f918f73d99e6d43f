//! UTF-8 layer over the byte-oriented [`PtyProcess`] handle.

use std::{io, str, time::Duration};

use crate::{error::Error, process::PtyProcess};

/// Incremental UTF-8 decoder: a multi-byte sequence split across reads is
/// held back until the rest of it arrives.
#[derive(Default)]
struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<String, Error> {
        self.partial.extend_from_slice(bytes);

        match str::from_utf8(&self.partial) {
            Ok(decoded) => {
                let decoded = decoded.to_owned();
                self.partial.clear();
                Ok(decoded)
            }
            // `error_len() == None` marks an incomplete sequence at the
            // tail, as opposed to garbage in the middle.
            Err(err) if err.error_len().is_none() => {
                let tail = self.partial.split_off(err.valid_up_to());
                let head = std::mem::replace(&mut self.partial, tail);
                // This cannot fail: `head` ends exactly where validation
                // stopped.
                Ok(String::from_utf8(head).unwrap())
            }
            Err(_) => {
                self.partial.clear();
                Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "child produced bytes that are not valid UTF-8",
                )))
            }
        }
    }
}

/// A [`PtyProcess`] wrapper that decodes terminal output as UTF-8 and
/// encodes written strings.
///
/// Reads may return an empty string when all received bytes belong to a
/// still-incomplete sequence; the completed character comes with a later
/// read. Lifecycle and terminal-attribute operations stay available on the
/// inner handle via [`UnicodePtyProcess::inner_mut`].
pub struct UnicodePtyProcess {
    inner: PtyProcess,
    decoder: Utf8Decoder,
}

impl UnicodePtyProcess {
    pub fn new(inner: PtyProcess) -> Self {
        Self {
            inner,
            decoder: Utf8Decoder::default(),
        }
    }

    pub fn inner(&self) -> &PtyProcess {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut PtyProcess {
        &mut self.inner
    }

    pub fn into_inner(self) -> PtyProcess {
        self.inner
    }

    /// [`PtyProcess::read`], decoded.
    pub fn read(&mut self, max_bytes: usize, timeout: Option<Duration>) -> Result<String, Error> {
        let bytes = self.inner.read(max_bytes, timeout)?;
        self.decoder.decode(&bytes)
    }

    /// [`PtyProcess::readline`], decoded.
    pub fn readline(&mut self, timeout: Option<Duration>) -> Result<String, Error> {
        let bytes = self.inner.readline(timeout)?;
        self.decoder.decode(&bytes)
    }

    /// Write a string to the child's terminal. Returns the number of bytes
    /// written, which can exceed the number of characters.
    pub fn write(&mut self, data: &str) -> Result<usize, Error> {
        self.inner.write(data.as_bytes())
    }
}
