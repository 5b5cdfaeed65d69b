//! Client-side encoder producing bundle bodies.

use rand::RngCore;

use crate::envelope::BundleEnvelope;
use crate::error::ProtocolResult;
use crate::manifest::{BundleManifest, FileAttributes};

/// One part ready for encoding. `Content-Length` is always derived from the
/// body and written first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedPart {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl EncodedPart {
    /// A part with no headers besides `Content-Length`.
    pub fn new(body: Vec<u8>) -> Self {
        Self { headers: Vec::new(), body }
    }

    /// A binary part with `Content-ID`, `Content-MD5` and an octet-stream type.
    pub fn binary(content_id: impl Into<String>, body: Vec<u8>) -> Self {
        let md5 = format!("{:x}", md5::compute(&body));
        Self::new(body)
            .header("Content-ID", content_id)
            .header("Content-MD5", md5)
            .header("Content-Type", "application/octet-stream")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Builds a `multipart/related` bundle: the manifest first, then binaries.
#[derive(Debug)]
pub struct BundleBuilder {
    envelope: BundleEnvelope,
    manifest: BundleManifest,
    manifest_type: String,
    raw_manifest: Option<Vec<u8>>,
    parts: Vec<EncodedPart>,
}

impl BundleBuilder {
    pub fn new(boundary: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            envelope: BundleEnvelope::new(boundary, start),
            manifest: BundleManifest::default(),
            manifest_type: "application/json; charset=UTF-8".into(),
            raw_manifest: None,
            parts: Vec::new(),
        }
    }

    /// Builder with a random boundary and `start` set to `"manifest"`.
    pub fn random() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(format!("bundle_{}", hex::encode(bytes)), "manifest")
    }

    pub fn envelope(&self) -> &BundleEnvelope {
        &self.envelope
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        self.envelope.content_type()
    }

    /// Add a manifest entry and its binary part.
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        content_id: impl Into<String>,
        data: Vec<u8>,
        mtime: Option<i64>,
    ) -> &mut Self {
        let content_id = content_id.into();
        let mut attrs = FileAttributes::new(content_id.clone());
        attrs.mtime = mtime;
        self.manifest.push(path, attrs);
        self.parts.push(EncodedPart::binary(content_id, data));
        self
    }

    /// Add a manifest entry without any binary part.
    pub fn add_entry(&mut self, path: impl Into<String>, attributes: FileAttributes) -> &mut Self {
        self.manifest.push(path, attributes);
        self
    }

    pub fn add_part(&mut self, part: EncodedPart) -> &mut Self {
        self.parts.push(part);
        self
    }

    /// Override the manifest part's `Content-Type`.
    pub fn manifest_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.manifest_type = content_type.into();
        self
    }

    /// Send `bytes` as the manifest body instead of the encoded entries.
    pub fn raw_manifest(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.raw_manifest = Some(bytes);
        self
    }

    pub fn build(&self) -> ProtocolResult<Vec<u8>> {
        let manifest = match &self.raw_manifest {
            Some(raw) => raw.clone(),
            None => self.manifest.to_json()?,
        };
        let manifest_part = EncodedPart::new(manifest)
            .header("Content-ID", self.envelope.start.clone())
            .header("Content-Type", self.manifest_type.clone());

        let mut parts = Vec::with_capacity(self.parts.len() + 1);
        parts.push(&manifest_part);
        parts.extend(self.parts.iter());
        Ok(encode_parts(&self.envelope.boundary, parts))
    }
}

/// Frame `parts` with `boundary`, closing with `--boundary--`.
pub fn encode_parts<'a, I>(boundary: &str, parts: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a EncodedPart>,
{
    let mut out = Vec::new();
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    let mut first = true;
    for part in parts {
        if !first {
            out.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        }
        first = false;
        out.extend_from_slice(format!("Content-Length: {}\r\n", part.body.len()).as_bytes());
        for (name, value) in &part.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&part.body);
    }
    if first {
        out.clear();
    } else {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--").as_bytes());
    out
}
