//! DAV multi-status and error documents.

use hyper::StatusCode;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

pub const DAV_NAMESPACE: &str = "DAV:";
pub const SERVER_NAMESPACE: &str = "http://sabredav.org/ns";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

type XmlWriter = Writer<Vec<u8>>;

/// Body of one `<d:response>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseBody {
    /// DAV properties as `(local name, value)` pairs.
    Properties(Vec<(String, String)>),
    /// A `<d:error>` with the exception kind and a message.
    Error { exception: String, message: String },
}

/// One `<d:response>` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusEntry {
    pub href: String,
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl StatusEntry {
    pub fn properties(href: impl Into<String>, status: StatusCode, props: Vec<(String, String)>) -> Self {
        Self {
            href: href.into(),
            status,
            body: ResponseBody::Properties(props),
        }
    }

    pub fn error(
        href: impl Into<String>,
        status: StatusCode,
        exception: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            href: href.into(),
            status,
            body: ResponseBody::Error {
                exception: exception.into(),
                message: message.into(),
            },
        }
    }
}

/// An ordered multi-status document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultiStatus {
    entries: Vec<StatusEntry>,
}

impl MultiStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: StatusEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as XML.
    pub fn to_xml(&self) -> String {
        document("d:multistatus", |w| {
            for entry in &self.entries {
                write_response(w, entry)?;
            }
            Ok(())
        })
    }
}

/// Standalone `<d:error>` document for request-level failures.
pub fn error_document(exception: &str, message: &str) -> String {
    document("d:error", |w| {
        text_element(w, "s:exception", exception)?;
        text_element(w, "s:message", message)
    })
}

/// Render a document whose root element declares the DAV and server
/// namespaces.
fn document<F>(root: &str, body: F) -> String
where
    F: FnOnce(&mut XmlWriter) -> quick_xml::Result<()>,
{
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 1);
    let rendered = (|| -> quick_xml::Result<()> {
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let start = BytesStart::new(root)
            .with_attributes([("xmlns:d", DAV_NAMESPACE), ("xmlns:s", SERVER_NAMESPACE)]);
        w.write_event(Event::Start(start))?;
        body(&mut w)?;
        w.write_event(Event::End(BytesEnd::new(root)))?;
        Ok(())
    })();
    // The sink is a Vec, which never fails a write.
    rendered.expect("in-memory XML rendering failed");
    String::from_utf8_lossy(&w.into_inner()).into_owned()
}

fn write_response(w: &mut XmlWriter, entry: &StatusEntry) -> quick_xml::Result<()> {
    start_element(w, "d:response")?;
    text_element(w, "d:href", &entry.href)?;
    start_element(w, "d:propstat")?;
    start_element(w, "d:prop")?;
    match &entry.body {
        ResponseBody::Properties(props) => {
            for (name, value) in props {
                text_element(w, &format!("d:{name}"), value)?;
            }
        }
        ResponseBody::Error { exception, message } => {
            start_element(w, "d:error")?;
            text_element(w, "s:exception", exception)?;
            text_element(w, "s:message", message)?;
            end_element(w, "d:error")?;
        }
    }
    end_element(w, "d:prop")?;
    text_element(w, "d:status", &status_line(entry.status))?;
    end_element(w, "d:propstat")?;
    end_element(w, "d:response")
}

fn start_element(w: &mut XmlWriter, name: &str) -> quick_xml::Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

fn end_element(w: &mut XmlWriter, name: &str) -> quick_xml::Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> quick_xml::Result<()> {
    start_element(w, name)?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    end_element(w, name)
}

fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}
