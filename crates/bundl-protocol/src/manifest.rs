//! JSON manifest carried by the start part.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ProtocolError, ProtocolResult};

/// Manifest key naming the binary part of an entry.
pub const CONTENT_ID_KEY: &str = "content-id";
/// Manifest key carrying the client-side modification time.
pub const MTIME_KEY: &str = "x-oc-mtime";

/// Per-file attributes from the manifest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAttributes {
    #[serde(
        rename = "content-id",
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_id: Option<String>,

    /// Seconds since the epoch. Non-numeric values are ignored.
    #[serde(
        rename = "x-oc-mtime",
        default,
        deserialize_with = "lenient_mtime",
        skip_serializing_if = "Option::is_none"
    )]
    pub mtime: Option<i64>,

    /// Fields the pipeline does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileAttributes {
    pub fn new(content_id: impl Into<String>) -> Self {
        Self {
            content_id: Some(content_id.into()),
            ..Self::default()
        }
    }

    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

fn scalar_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Scalar>::deserialize(de)? {
        Some(Scalar::Int(n)) => Some(n.to_string()),
        Some(Scalar::Float(f)) => Some(f.to_string()),
        Some(Scalar::Text(s)) => Some(s),
        None => None,
    })
}

fn lenient_mtime<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Ordered list of `(relative path, attributes)` entries.
///
/// Order follows the JSON document. A path that appears twice keeps its first
/// position and its last value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BundleManifest {
    entries: Vec<(String, FileAttributes)>,
}

impl BundleManifest {
    /// Decode a manifest from its JSON bytes.
    ///
    /// The document must be a JSON object. An entry whose value is not an
    /// object keeps the path with empty attributes, so it surfaces later as a
    /// per-entry failure instead of rejecting the whole bundle.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::InvalidManifest(format!("unable to parse JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let Value::Object(map) = value else {
            return Err(ProtocolError::InvalidManifest("manifest must be a JSON object".into()));
        };
        let entries = map
            .into_iter()
            .map(|(path, attrs)| {
                let attributes = serde_json::from_value(attrs).unwrap_or_else(|e| {
                    warn!(%path, error = %e, "manifest entry is not a valid attribute object");
                    FileAttributes::default()
                });
                (path, attributes)
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn push(&mut self, path: impl Into<String>, attributes: FileAttributes) {
        let path = path.into();
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = attributes,
            None => self.entries.push((path, attributes)),
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileAttributes> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, a)| a)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileAttributes)> {
        self.entries.iter().map(|(p, a)| (p.as_str(), a))
    }

    /// Encode back to a JSON document, preserving entry order.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        let mut map = Map::new();
        for (path, attrs) in &self.entries {
            let value = serde_json::to_value(attrs)
                .map_err(|e| ProtocolError::InvalidManifest(e.to_string()))?;
            map.insert(path.clone(), value);
        }
        serde_json::to_vec(&Value::Object(map)).map_err(|e| ProtocolError::InvalidManifest(e.to_string()))
    }
}

impl<'a> IntoIterator for &'a BundleManifest {
    type Item = &'a (String, FileAttributes);
    type IntoIter = std::slice::Iter<'a, (String, FileAttributes)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
