//! Turns a stream of parts into a manifest plus a table of binaries.

use std::collections::HashMap;
use std::io::{BufReader, Read};

use tracing::{debug, info};

use crate::envelope::BundleEnvelope;
use crate::error::{ProtocolError, ProtocolResult};
use crate::manifest::BundleManifest;
use crate::parser::{MultipartParser, ParserOptions, PartBody, PartHeaders};

/// Media type prefix required on the manifest part.
pub const MANIFEST_MEDIA_TYPE: &str = "application/json";

/// Part bodies keyed by `Content-ID`, with their headers alongside.
///
/// The table owns every body. Entries are lent out by mutable reference, so
/// each body is closed exactly once when the table is dropped.
#[derive(Debug, Default)]
pub struct BinaryTable {
    bodies: HashMap<String, PartBody>,
    headers: HashMap<String, PartHeaders>,
}

impl BinaryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a body. A later part with the same id replaces the earlier one.
    pub fn insert(&mut self, content_id: String, headers: PartHeaders, body: PartBody) {
        if self.bodies.contains_key(&content_id) {
            debug!(%content_id, "content-id seen twice, keeping the later part");
        }
        self.headers.insert(content_id.clone(), headers);
        self.bodies.insert(content_id, body);
    }

    pub fn contains(&self, content_id: &str) -> bool {
        self.bodies.contains_key(content_id)
    }

    pub fn get_mut(&mut self, content_id: &str) -> Option<&mut PartBody> {
        self.bodies.get_mut(content_id)
    }

    pub fn headers(&self, content_id: &str) -> Option<&PartHeaders> {
        self.headers.get(content_id)
    }

    /// Take a body and its headers out of the table.
    pub fn remove(&mut self, content_id: &str) -> Option<(PartHeaders, PartBody)> {
        let body = self.bodies.remove(content_id)?;
        let headers = self.headers.remove(content_id)?;
        Some((headers, body))
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Everything one bundle request carried.
#[derive(Debug)]
pub struct BundleContents {
    pub manifest: BundleManifest,
    pub binaries: BinaryTable,
}

/// Drain `body` into a [`BundleContents`].
///
/// Parts without a `Content-ID`, and parts the parser discarded, are dropped.
/// The manifest part is removed from the binary table once decoded, so no
/// manifest entry can commit it as file content.
pub fn assemble<R: Read>(
    body: R,
    envelope: &BundleEnvelope,
    options: ParserOptions,
) -> ProtocolResult<BundleContents> {
    let mut parser = MultipartParser::with_options(body, &envelope.boundary, options);
    let mut binaries = BinaryTable::new();
    let mut dropped = 0usize;

    while !parser.end_reached() {
        match parser.next_part()? {
            Some(part) => match part.headers.content_id.clone() {
                Some(id) => binaries.insert(id, part.headers, part.body),
                None => dropped += 1,
            },
            None => dropped += 1,
        }
    }

    let (headers, mut manifest_body) = binaries
        .remove(&envelope.start)
        .ok_or_else(|| ProtocolError::MissingManifest(envelope.start.clone()))?;
    let content_type = headers.content_type.unwrap_or_default();
    if !content_type.starts_with(MANIFEST_MEDIA_TYPE) {
        return Err(ProtocolError::ManifestContentType(content_type));
    }

    manifest_body.rewind()?;
    let value = serde_json::from_reader(BufReader::new(&mut manifest_body))
        .map_err(|e| ProtocolError::InvalidManifest(format!("unable to parse JSON: {e}")))?;
    let manifest = BundleManifest::from_value(value)?;

    info!(
        entries = manifest.len(),
        binaries = binaries.len(),
        dropped,
        bytes = parser.cursor(),
        "assembled bundle"
    );
    Ok(BundleContents { manifest, binaries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{BundleBuilder, EncodedPart};
    use std::io::Cursor;

    fn envelope() -> BundleEnvelope {
        BundleEnvelope::new("boundary", "meta")
    }

    #[test]
    fn assembles_manifest_and_binaries() {
        let mut builder = BundleBuilder::new("boundary", "meta");
        builder.add_file("a.txt", "1", b"hello".to_vec(), None);
        builder.add_file("dir/b.txt", "2", b"world!".to_vec(), Some(7));
        let body = builder.build().unwrap();

        let mut contents = assemble(Cursor::new(body), &envelope(), ParserOptions::default()).unwrap();
        assert_eq!(contents.manifest.len(), 2);
        assert!(!contents.binaries.contains("meta"));
        assert_eq!(contents.binaries.get_mut("1").unwrap().to_vec().unwrap(), b"hello");
        assert_eq!(contents.binaries.headers("2").unwrap().content_length, 6);
        assert_eq!(contents.manifest.get("dir/b.txt").unwrap().mtime, Some(7));
    }

    #[test]
    fn missing_manifest_part_fails() {
        let mut builder = BundleBuilder::new("boundary", "other");
        builder.add_file("a.txt", "1", b"x".to_vec(), None);
        let body = builder.build().unwrap();
        let err = assemble(Cursor::new(body), &envelope(), ParserOptions::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingManifest(id) if id == "meta"));
    }

    #[test]
    fn manifest_must_be_json() {
        let mut builder = BundleBuilder::new("boundary", "meta");
        builder.manifest_content_type("text/plain");
        let body = builder.build().unwrap();
        let err = assemble(Cursor::new(body), &envelope(), ParserOptions::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::ManifestContentType(t) if t == "text/plain"));
    }

    #[test]
    fn broken_json_fails() {
        let mut builder = BundleBuilder::new("boundary", "meta");
        builder.raw_manifest(b"{not json".to_vec());
        let body = builder.build().unwrap();
        let err = assemble(Cursor::new(body), &envelope(), ParserOptions::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidManifest(_)));
    }

    #[test]
    fn parts_without_content_id_are_dropped() {
        let mut builder = BundleBuilder::new("boundary", "meta");
        builder.add_part(EncodedPart::new(b"orphan".to_vec()));
        let body = builder.build().unwrap();
        let contents = assemble(Cursor::new(body), &envelope(), ParserOptions::default()).unwrap();
        assert!(contents.binaries.is_empty());
    }

    #[test]
    fn short_part_is_missing_from_table() {
        let manifest = br#"{"a.txt":{"content-id":"1"}}"#;
        let body = format!(
            "--boundary\r\nContent-ID: meta\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}\r\n\
             --boundary\r\nContent-ID: 1\r\nContent-Length: 2000\r\n\r\nblabla\r\n--boundary--",
            manifest.len(),
            std::str::from_utf8(manifest).unwrap()
        );
        let contents = assemble(Cursor::new(body.into_bytes()), &envelope(), ParserOptions::default()).unwrap();
        assert_eq!(contents.manifest.len(), 1);
        assert!(!contents.binaries.contains("1"));
    }

    #[test]
    fn framing_errors_abort() {
        let body = b"--boundary\r\nContent-ID: meta\r\n\r\n{}\r\n--boundary--".to_vec();
        let err = assemble(Cursor::new(body), &envelope(), ParserOptions::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingContentLength));
    }
}
