//! `Content-Type` envelope of a bundled upload.

use crate::error::{ProtocolError, ProtocolResult};

/// Media type every bundle request must declare.
pub const BUNDLE_MEDIA_TYPE: &str = "multipart/related";

/// Framing parameters taken from the request's `Content-Type` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleEnvelope {
    /// Multipart boundary token, without the leading `--`.
    pub boundary: String,
    /// Content-ID of the part carrying the JSON manifest.
    pub start: String,
}

impl BundleEnvelope {
    pub fn new(boundary: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            start: start.into(),
        }
    }

    /// Parse `multipart/related; boundary=<B>; start=<S>`.
    ///
    /// Exactly three `;`-separated segments are accepted, in that order.
    /// Parameter values may be double-quoted.
    pub fn parse(content_type: Option<&str>) -> ProtocolResult<Self> {
        let value = match content_type.map(str::trim) {
            None => return Err(invalid("Content-Type header is needed")),
            Some("") => return Err(invalid("Content-Type header must not be empty")),
            Some(v) => v,
        };

        let segments: Vec<&str> = value.split(';').map(str::trim).collect();
        let [media_type, boundary, start] = segments.as_slice() else {
            return Err(invalid("improper Content-Type format, boundary or start may be missing"));
        };

        if *media_type != BUNDLE_MEDIA_TYPE {
            return Err(invalid(&format!("Content-Type must be {BUNDLE_MEDIA_TYPE}")));
        }
        let boundary = parameter(boundary, "boundary")?;
        if boundary.is_empty() {
            return Err(invalid("boundary must not be empty"));
        }
        let start = parameter(start, "start")?;

        Ok(Self::new(boundary, start))
    }

    /// Render the header value this envelope parses from.
    pub fn content_type(&self) -> String {
        format!(
            "{BUNDLE_MEDIA_TYPE}; boundary=\"{}\"; start=\"{}\"",
            self.boundary, self.start
        )
    }
}

fn invalid(msg: &str) -> ProtocolError {
    ProtocolError::InvalidEnvelope(msg.to_string())
}

fn parameter<'a>(segment: &'a str, name: &str) -> ProtocolResult<&'a str> {
    let value = segment
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or_else(|| invalid(&format!("{name} is not set")))?;
    Ok(unquote(value))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
