//! Line-oriented reader over a single request body.

use std::io::{self, BufRead, BufReader, Read, Write};

use crate::error::{ProtocolError, ProtocolResult};

/// Largest chunk moved by a single read call while copying a part body.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Longest line (boundary or header) accepted before the body is rejected.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Forward-only cursor over a request body.
///
/// Lines are read up to and including `\n`. End of stream is sticky: it is
/// reported once a read came back short, mirroring how a stream's EOF flag
/// only flips after a read actually hits the end.
pub struct PartStreamReader<R> {
    inner: BufReader<R>,
    cursor: u64,
    eof: bool,
}

impl<R: Read> PartStreamReader<R> {
    pub fn new(body: R) -> Self {
        Self {
            inner: BufReader::with_capacity(READ_CHUNK_SIZE, body),
            cursor: 0,
            eof: false,
        }
    }

    /// Bytes consumed from the body so far.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Whether a read has hit the end of the body.
    pub fn at_end(&self) -> bool {
        self.eof
    }

    /// Read the next line including its terminator.
    ///
    /// Returns `Ok(None)` once the body is exhausted. The final line may lack
    /// a terminator, in which case end of stream is flagged immediately.
    pub fn next_line(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let limit = MAX_LINE_LENGTH as u64;
        let n = (&mut self.inner).take(limit).read_until(b'\n', &mut line)?;
        self.cursor += n as u64;
        if n == 0 {
            self.eof = true;
            return Ok(None);
        }
        if line.last() != Some(&b'\n') {
            if n as u64 == limit {
                return Err(ProtocolError::LineTooLong { max: MAX_LINE_LENGTH });
            }
            self.eof = true;
        }
        Ok(Some(line))
    }

    /// Read exactly `n` bytes, bypassing line framing.
    ///
    /// Fewer bytes are returned only if the body ends first.
    pub fn read_exactly(&mut self, n: i64) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.copy_exactly(n, &mut buf)?;
        Ok(buf)
    }

    /// Copy up to `n` bytes into `sink` in chunks of at most
    /// [`READ_CHUNK_SIZE`], returning how many were copied.
    pub fn copy_exactly<W: Write + ?Sized>(&mut self, n: i64, sink: &mut W) -> ProtocolResult<u64> {
        if n < 0 {
            return Err(ProtocolError::NegativeLength(n));
        }
        let mut remaining = n as u64;
        let mut copied = 0u64;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while remaining > 0 {
            let want = remaining.min(READ_CHUNK_SIZE as u64) as usize;
            let got = match self.inner.read(&mut chunk[..want]) {
                Ok(got) => got,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if got == 0 {
                self.eof = true;
                break;
            }
            sink.write_all(&chunk[..got])?;
            remaining -= got as u64;
            copied += got as u64;
            self.cursor += got as u64;
        }
        Ok(copied)
    }
}

impl<R> std::fmt::Debug for PartStreamReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartStreamReader")
            .field("cursor", &self.cursor)
            .field("eof", &self.eof)
            .finish()
    }
}
