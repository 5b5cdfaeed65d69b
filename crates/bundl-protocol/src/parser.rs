//! Incremental `multipart/related` part parser.
//!
//! Each call to [`MultipartParser::next_part`] consumes exactly one part and
//! the delimiter that follows it. Bodies are spooled into temporary storage
//! while their MD5 is computed, so a part is never held in memory past the
//! spool threshold. A part whose body is short or whose digest does not match
//! `Content-MD5` is discarded and the parser moves on.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use tempfile::SpooledTempFile;
use tracing::{debug, warn};

use crate::error::{ProtocolError, ProtocolResult};
use crate::reader::PartStreamReader;

/// Upper bound on the raw header block of one part.
pub const MAX_HEADER_BLOCK: usize = 64 * 1024;

/// Tuning knobs for [`MultipartParser`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParserOptions {
    /// Bodies up to this many bytes stay in memory before spilling to disk.
    pub spool_threshold: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            spool_threshold: 2 * 1024 * 1024,
        }
    }
}

/// Headers of one part.
///
/// Names are matched case-insensitively. The headers the pipeline relies on
/// get typed fields; everything else lands in `extra` keyed by lowercased
/// name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartHeaders {
    pub content_length: u64,
    pub content_id: Option<String>,
    pub content_md5: Option<String>,
    pub content_type: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl PartHeaders {
    /// Build typed headers from raw `(name, value)` lines.
    ///
    /// Later duplicates win. `Content-Length` is mandatory.
    pub fn from_lines<'a, I>(lines: I) -> ProtocolResult<Self>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut raw = BTreeMap::new();
        for line in lines {
            if line.trim_ascii().is_empty() {
                continue;
            }
            let (name, value) = split_header(line)?;
            raw.insert(name, value);
        }
        Self::from_map(raw)
    }

    fn from_map(mut raw: BTreeMap<String, String>) -> ProtocolResult<Self> {
        let length = raw.remove("content-length").ok_or(ProtocolError::MissingContentLength)?;
        let parsed: i64 = length
            .parse()
            .map_err(|_| ProtocolError::InvalidContentLength(length.clone()))?;
        if parsed < 0 {
            return Err(ProtocolError::NegativeLength(parsed));
        }
        Ok(Self {
            content_length: parsed as u64,
            content_id: raw.remove("content-id"),
            content_md5: raw.remove("content-md5"),
            content_type: raw.remove("content-type"),
            extra: raw,
        })
    }

    /// Look up any header by name.
    pub fn get(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "content-length" => Some(self.content_length.to_string()),
            "content-id" => self.content_id.clone(),
            "content-md5" => self.content_md5.clone(),
            "content-type" => self.content_type.clone(),
            other => self.extra.get(other).cloned(),
        }
    }
}

fn split_header(line: &[u8]) -> ProtocolResult<(String, String)> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::MalformedHeader("header is not valid UTF-8".into()))?;
    let text = text.trim_end_matches(['\r', '\n']);
    let mut pieces = text.split(':');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(name), Some(value), None) if !name.trim().is_empty() => {
            Ok((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        }
        _ => Err(ProtocolError::MalformedHeader(text.to_string())),
    }
}

/// Body of a part, spooled to memory or a temporary file.
///
/// The body owns its backing storage and closes it exactly once when dropped.
/// It can be rewound and read any number of times.
pub struct PartBody {
    file: SpooledTempFile,
    len: u64,
}

impl PartBody {
    /// Spool an in-memory buffer.
    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut file = SpooledTempFile::new(data.len().max(1));
        file.write_all(data)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file, len: data.len() as u64 })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the body spilled out of memory.
    pub fn is_spilled(&self) -> bool {
        self.file.is_rolled()
    }

    /// Seek back to the first byte.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Rewind and read the whole body.
    pub fn to_vec(&mut self) -> io::Result<Vec<u8>> {
        self.rewind()?;
        let mut buf = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for PartBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for PartBody {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl std::fmt::Debug for PartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartBody")
            .field("len", &self.len)
            .field("spilled", &self.file.is_rolled())
            .finish()
    }
}

/// One successfully parsed part.
#[derive(Debug)]
pub struct Part {
    pub headers: PartHeaders,
    pub body: PartBody,
}

/// Write sink that spools and hashes in one pass.
struct HashingSink {
    file: SpooledTempFile,
    digest: md5::Context,
}

impl Write for HashingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.digest.consume(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scan {
    /// Looking for the delimiter that opens a part.
    Delimiter,
    /// Accumulating header lines.
    Headers,
    /// Body consumed, looking for the delimiter that ends it.
    Trailer { crlf_seen: bool },
}

/// Pull parser over one `multipart/related` body.
#[derive(Debug)]
pub struct MultipartParser<R> {
    reader: PartStreamReader<R>,
    delimiter: Vec<u8>,
    close_delimiter: Vec<u8>,
    options: ParserOptions,
    end_reached: bool,
}

impl<R: Read> MultipartParser<R> {
    pub fn new(body: R, boundary: &str) -> Self {
        Self::with_options(body, boundary, ParserOptions::default())
    }

    pub fn with_options(body: R, boundary: &str, options: ParserOptions) -> Self {
        Self {
            reader: PartStreamReader::new(body),
            delimiter: format!("--{boundary}\r\n").into_bytes(),
            close_delimiter: format!("--{boundary}--").into_bytes(),
            options,
            end_reached: false,
        }
    }

    /// Whether the closing delimiter (or end of body) has been seen.
    pub fn end_reached(&self) -> bool {
        self.end_reached
    }

    /// Bytes consumed from the body so far.
    pub fn cursor(&self) -> u64 {
        self.reader.cursor()
    }

    fn is_delimiter(&self, line: &[u8]) -> bool {
        line == self.delimiter.as_slice()
    }

    fn is_close_delimiter(&self, line: &[u8]) -> bool {
        line.strip_suffix(b"\r\n").unwrap_or(line) == self.close_delimiter.as_slice()
    }

    /// Parse the next part.
    ///
    /// `Ok(None)` means no usable part was produced by this call: the part
    /// was empty, truncated, or failed its digest. Check
    /// [`end_reached`](Self::end_reached) to know whether to call again.
    /// Once the end is reached every further call returns `Ok(None)`.
    pub fn next_part(&mut self) -> ProtocolResult<Option<Part>> {
        if self.end_reached {
            return Ok(None);
        }

        let mut state = Scan::Delimiter;
        let mut header_lines: Vec<Vec<u8>> = Vec::new();
        let mut header_bytes = 0usize;
        let mut part = None;

        while !self.reader.at_end() {
            let start = self.reader.cursor();
            let Some(line) = self.reader.next_line()? else {
                if state == Scan::Headers {
                    return Err(ProtocolError::HeaderRead);
                }
                break;
            };

            match state {
                Scan::Delimiter => {
                    if self.is_close_delimiter(&line) {
                        self.end_reached = true;
                        break;
                    }
                    if self.is_delimiter(&line) {
                        continue;
                    }
                    if start == 0 {
                        return Err(ProtocolError::ExpectedBoundary);
                    }
                    state = Scan::Headers;
                    header_bytes += line.len();
                    header_lines.push(line);
                }
                Scan::Headers => {
                    if self.is_delimiter(&line) {
                        debug!("part ended before its header block");
                        break;
                    }
                    if self.is_close_delimiter(&line) {
                        self.end_reached = true;
                        break;
                    }
                    if line == b"\r\n" {
                        part = self.finish_headers(&header_lines)?;
                        state = Scan::Trailer { crlf_seen: false };
                        continue;
                    }
                    header_bytes += line.len();
                    if header_bytes > MAX_HEADER_BLOCK {
                        return Err(ProtocolError::MalformedHeader(format!(
                            "header block exceeds {MAX_HEADER_BLOCK} bytes"
                        )));
                    }
                    header_lines.push(line);
                }
                Scan::Trailer { crlf_seen } => {
                    if self.is_delimiter(&line) {
                        break;
                    }
                    if self.is_close_delimiter(&line) {
                        self.end_reached = true;
                        break;
                    }
                    if line == b"\r\n" && !crlf_seen {
                        state = Scan::Trailer { crlf_seen: true };
                        continue;
                    }
                    return Err(ProtocolError::MalformedBundle(
                        "expected boundary delimiter after part body".into(),
                    ));
                }
            }
        }

        if self.reader.at_end() {
            if state == Scan::Headers && !self.end_reached {
                return Err(ProtocolError::HeaderRead);
            }
            self.end_reached = true;
        }
        Ok(part)
    }

    /// Parse the accumulated header block and read the body it announces.
    fn finish_headers(&mut self, lines: &[Vec<u8>]) -> ProtocolResult<Option<Part>> {
        let headers = PartHeaders::from_lines(lines.iter().map(Vec::as_slice))?;
        let declared = headers.content_length;

        let mut sink = HashingSink {
            file: SpooledTempFile::new(self.options.spool_threshold),
            digest: md5::Context::new(),
        };
        let copied = self.reader.copy_exactly(declared as i64, &mut sink)?;
        if copied != declared {
            warn!(
                content_id = ?headers.content_id,
                declared,
                copied,
                "part body shorter than its content-length, skipping"
            );
            return Ok(None);
        }

        let HashingSink { mut file, digest } = sink;
        if let Some(expected) = &headers.content_md5 {
            let actual = format!("{:x}", digest.finalize());
            if !expected.eq_ignore_ascii_case(&actual) {
                warn!(
                    content_id = ?headers.content_id,
                    %expected,
                    %actual,
                    "part body failed its md5 check, skipping"
                );
                return Ok(None);
            }
        }

        file.seek(SeekFrom::Start(0))?;
        debug!(content_id = ?headers.content_id, len = copied, "parsed part");
        Ok(Some(Part {
            headers,
            body: PartBody { file, len: copied },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parser(body: &str) -> MultipartParser<Cursor<Vec<u8>>> {
        MultipartParser::new(Cursor::new(body.as_bytes().to_vec()), "boundary")
    }

    fn md5_hex(data: &[u8]) -> String {
        format!("{:x}", md5::compute(data))
    }

    #[test]
    fn reads_single_part() {
        let body = format!(
            "--boundary\r\nContent-ID: 0\r\nContent-MD5: {}\r\nContent-length: 6\r\n\r\nblabla\r\n--boundary--",
            md5_hex(b"blabla")
        );
        let mut p = parser(&body);
        let mut part = p.next_part().unwrap().unwrap();
        assert_eq!(part.headers.content_id.as_deref(), Some("0"));
        assert_eq!(part.headers.content_length, 6);
        assert_eq!(part.body.to_vec().unwrap(), b"blabla");
        assert!(p.end_reached());
    }

    #[test]
    fn wrong_first_boundary_is_rejected() {
        let mut p = parser("--boundary_wrong\r\n--boundary--");
        assert!(matches!(p.next_part(), Err(ProtocolError::ExpectedBoundary)));
    }

    #[test]
    fn non_boundary_first_line_is_rejected() {
        let mut p = parser("Content-ID: 0\r\nContent-length: 0\r\n\r\n\r\n--boundary--");
        assert!(matches!(p.next_part(), Err(ProtocolError::ExpectedBoundary)));
    }

    #[test]
    fn short_body_yields_nothing() {
        let mut p = parser("--boundary\r\nContent-ID: 0\r\nContent-length: 2000\r\n\r\nblabla");
        assert!(p.next_part().unwrap().is_none());
        assert!(p.end_reached());
    }

    #[test]
    fn wrong_md5_skips_part_but_not_the_next() {
        let body = format!(
            "--boundary\r\nContent-ID: 0\r\nContent-MD5: WRONG_MD5\r\nContent-length: 0\r\n\r\n\r\n\
             --boundary\r\nContent-ID: 1\r\nContent-MD5: {}\r\nContent-length: 6\r\n\r\nblabla\r\n--boundary--",
            md5_hex(b"blabla")
        );
        let mut p = parser(&body);
        assert!(p.next_part().unwrap().is_none());
        assert!(!p.end_reached());
        let mut part = p.next_part().unwrap().unwrap();
        assert_eq!(part.headers.content_id.as_deref(), Some("1"));
        assert_eq!(part.body.to_vec().unwrap(), b"blabla");
        assert!(p.end_reached());
    }

    #[test]
    fn uppercase_md5_accepted() {
        let body = format!(
            "--boundary\r\nContent-ID: 0\r\nContent-MD5: {}\r\nContent-length: 6\r\n\r\nblabla\r\n--boundary--",
            md5_hex(b"blabla").to_uppercase()
        );
        assert!(parser(&body).next_part().unwrap().is_some());
    }

    #[test]
    fn unknown_boundary_after_opening_is_empty_part() {
        let mut p = parser("--boundary\r\n--boundary_wrong\r\n--boundary--");
        assert!(p.next_part().unwrap().is_none());
        assert!(p.end_reached());
    }

    #[test]
    fn degenerate_bodies_end_cleanly() {
        for body in ["--boundary\r\n", "", "--boundary--", "--boundary\r\n--boundary\r\n--boundary--\r\n"] {
            let mut p = parser(body);
            assert!(p.next_part().unwrap().is_none(), "body {body:?}");
            assert!(p.end_reached(), "body {body:?}");
        }
    }

    #[test]
    fn end_is_idempotent() {
        let mut p = parser("--boundary\r\n");
        for _ in 0..3 {
            assert!(p.next_part().unwrap().is_none());
            assert!(p.end_reached());
        }
    }

    #[test]
    fn content_then_empty_part() {
        let body = format!(
            "--boundary\r\nContent-ID: 0\r\nContent-MD5: {}\r\nContent-length: 6\r\n\r\nblabla\r\n--boundary\r\n--boundary--",
            md5_hex(b"blabla")
        );
        let mut p = parser(&body);
        assert!(p.next_part().unwrap().is_some());
        assert!(!p.end_reached());
        assert!(p.next_part().unwrap().is_none());
        assert!(p.end_reached());
    }

    #[test]
    fn blank_line_before_close_is_empty_part() {
        let mut p = parser("--boundary\r\nContent-length: 1\r\n\r\nz\r\n--boundary\r\n\r\n--boundary--");
        assert!(p.next_part().unwrap().is_some());
        assert!(p.next_part().unwrap().is_none());
        assert!(p.end_reached());
    }

    #[test]
    fn empty_part_before_content_is_skipped_in_one_call() {
        let mut p = parser(
            "--boundary\r\n--boundary\r\nContent-ID: 0\r\nContent-length: 6\r\n\r\nblabla\r\n--boundary--",
        );
        let part = p.next_part().unwrap().unwrap();
        assert_eq!(part.headers.content_id.as_deref(), Some("0"));
        assert!(p.end_reached());
    }

    #[test]
    fn zero_length_part_then_content() {
        let body = format!(
            "--boundary\r\nContent-ID: 0\r\nContent-MD5: {}\r\nContent-length: 0\r\n\r\n\r\n\
             --boundary\r\nContent-ID: 1\r\nContent-MD5: {}\r\nContent-length: 6\r\n\r\nblabla\r\n--boundary--",
            md5_hex(b""),
            md5_hex(b"blabla")
        );
        let mut p = parser(&body);
        let first = p.next_part().unwrap().unwrap();
        assert!(first.body.is_empty());
        assert!(!p.end_reached());
        let second = p.next_part().unwrap().unwrap();
        assert_eq!(second.body.len(), 6);
        assert!(p.end_reached());
    }

    #[test]
    fn missing_content_length_aborts() {
        let mut p = parser("--boundary\r\nContent-ID: 0\r\n\r\nblabla\r\n--boundary--");
        assert!(matches!(p.next_part(), Err(ProtocolError::MissingContentLength)));
    }

    #[test]
    fn negative_content_length_aborts() {
        let mut p = parser("--boundary\r\nContent-ID: 0\r\nContent-length: -5\r\n\r\nblabla\r\n--boundary--");
        assert!(matches!(p.next_part(), Err(ProtocolError::NegativeLength(-5))));
    }

    #[test]
    fn non_numeric_content_length_aborts() {
        let mut p = parser("--boundary\r\nContent-length: six\r\n\r\nblabla\r\n--boundary--");
        assert!(matches!(p.next_part(), Err(ProtocolError::InvalidContentLength(_))));
    }

    #[test]
    fn header_without_colon_aborts() {
        let mut p = parser("--boundary\r\nContent-ID 0\r\nContent-length: 6\r\n\r\nblabla\r\n--boundary--");
        assert!(matches!(p.next_part(), Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn header_with_two_colons_aborts() {
        let mut p = parser("--boundary\r\nContent-ID: a:b\r\nContent-length: 6\r\n\r\nblabla\r\n--boundary--");
        assert!(matches!(p.next_part(), Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn stream_ending_inside_headers_aborts() {
        let mut p = parser("--boundary\r\nContent-ID: 0\r\n");
        assert!(matches!(p.next_part(), Err(ProtocolError::HeaderRead)));
    }

    #[test]
    fn garbage_after_body_aborts() {
        let mut p = parser("--boundary\r\nContent-length: 3\r\n\r\nblabla\r\n--boundary--");
        assert!(matches!(p.next_part(), Err(ProtocolError::MalformedBundle(_))));
    }

    #[test]
    fn missing_close_delimiter_ends_at_eof() {
        let mut p = parser("--boundary\r\nContent-ID: 0\r\nContent-length: 6\r\n\r\nblabla\r\n");
        assert!(p.next_part().unwrap().is_some());
        assert!(p.end_reached());
    }

    #[test]
    fn headers_are_case_insensitive_and_extras_kept() {
        let mut p = parser(
            "--boundary\r\nCONTENT-ID: x\r\nX-Custom: yes\r\nContent-Length: 1\r\n\r\nz\r\n--boundary--",
        );
        let part = p.next_part().unwrap().unwrap();
        assert_eq!(part.headers.content_id.as_deref(), Some("x"));
        assert_eq!(part.headers.extra.get("x-custom").map(String::as_str), Some("yes"));
        assert_eq!(part.headers.get("Content-Length").as_deref(), Some("1"));
    }

    #[test]
    fn large_body_spills_to_disk() {
        let data = vec![b'q'; 20_000];
        let mut body = b"--boundary\r\nContent-ID: big\r\nContent-Length: 20000\r\n\r\n".to_vec();
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n--boundary--");
        let mut p = MultipartParser::with_options(
            Cursor::new(body),
            "boundary",
            ParserOptions { spool_threshold: 1024 },
        );
        let mut part = p.next_part().unwrap().unwrap();
        assert!(part.body.is_spilled());
        assert_eq!(part.body.to_vec().unwrap(), data);
    }

    #[test]
    fn md5_covers_bodies_read_in_several_chunks() {
        let data: Vec<u8> = (0..30_000u32).map(|i| (i % 251) as u8).collect();
        let mut body = format!(
            "--boundary\r\nContent-ID: big\r\nContent-MD5: {}\r\nContent-Length: {}\r\n\r\n",
            md5_hex(&data),
            data.len()
        )
        .into_bytes();
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n--boundary--");
        let mut p = MultipartParser::new(Cursor::new(body), "boundary");
        let mut part = p.next_part().unwrap().unwrap();
        assert_eq!(part.body.to_vec().unwrap(), data);
    }

    #[test]
    fn body_can_be_read_twice() {
        let mut body = PartBody::from_bytes(b"again").unwrap();
        assert_eq!(body.to_vec().unwrap(), b"again");
        assert_eq!(body.to_vec().unwrap(), b"again");
    }
}
