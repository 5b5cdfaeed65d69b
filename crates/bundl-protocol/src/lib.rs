//! Wire format of bundled uploads.
//!
//! A bundle is one `multipart/related` request body. Its start part holds a
//! JSON manifest mapping relative paths to attributes; the remaining parts are
//! file contents referenced from the manifest by `Content-ID`.
//!
//! - [`PartStreamReader`]: line and fixed-length reads over the raw body
//! - [`MultipartParser`]: one part per call, bodies verified against
//!   `Content-Length` and `Content-MD5`
//! - [`assemble`]: drains the parser into a [`BundleManifest`] and a
//!   [`BinaryTable`]
//! - [`MultiStatus`]: the 207 response document
//! - [`BundleBuilder`]: encodes bundles for clients and tests

pub mod assembler;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod manifest;
pub mod multistatus;
pub mod parser;
pub mod reader;

pub use assembler::{assemble, BinaryTable, BundleContents, MANIFEST_MEDIA_TYPE};
pub use encoder::{encode_parts, BundleBuilder, EncodedPart};
pub use envelope::{BundleEnvelope, BUNDLE_MEDIA_TYPE};
pub use error::{ProtocolError, ProtocolResult};
pub use manifest::{BundleManifest, FileAttributes, CONTENT_ID_KEY, MTIME_KEY};
pub use multistatus::{error_document, MultiStatus, ResponseBody, StatusEntry, XML_CONTENT_TYPE};
pub use parser::{MultipartParser, ParserOptions, Part, PartBody, PartHeaders};
pub use reader::{PartStreamReader, READ_CHUNK_SIZE};
