//! Minimal XML tree reader and writer helpers shared by the file formats.
//!
//! Documents are small enough to be read into memory in one go, so the
//! readers work on an owned [`XmlNode`] tree built from `quick-xml` events
//! rather than on the event stream directly.

use std::{borrow::Cow, io, sync::LazyLock};

use encoding_rs::{Encoding, UTF_8};
use quick_xml::{
    Reader, Writer,
    events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

/// An element with its attributes, concatenated text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Local name of the element.
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Text and CDATA content, concatenated. Not trimmed.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, quick_xml::Error> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    /// Whether the node's name matches, ignoring ASCII case.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// The trimmed text content.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Whether the node has no child elements.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The first child with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|child| child.is(name))
    }

    /// All children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> {
        self.children.iter().filter(move |child| child.is(name))
    }

    /// The trimmed text of the first child with the given name, or `""`.
    #[must_use]
    pub fn child_text(&self, name: &str) -> &str {
        self.child(name).map_or("", Self::text)
    }

    /// The value of an attribute, if present.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The document could not be read as XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// The parser rejected the input.
    #[error("malformed XML near byte {position}")]
    Syntax {
        /// Byte offset at which the error was detected.
        position: u64,
        /// The underlying parser error.
        #[source]
        source: quick_xml::Error,
    },
    /// The input ended while an element was still open.
    #[error("document ends before <{0}> is closed")]
    Unclosed(String),
    /// The input contains no element at all.
    #[error("document has no root element")]
    NoRoot,
}

// `encoding="…"` inside a leading `<?xml … ?>` declaration
static DECLARED_ENCODING: LazyLock<regex::bytes::Regex> = LazyLock::new(|| {
    regex::bytes::Regex::new(
        r#"\A\x{FEFF}?\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#,
    )
    .expect("declaration pattern is valid")
});

/// Decodes raw file contents to text.
///
/// A byte order mark wins, then the encoding named in the XML declaration,
/// then UTF-8. Byte sequences that are invalid in the chosen encoding are
/// replaced rather than rejected.
#[must_use]
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    let encoding = DECLARED_ENCODING
        .captures(bytes)
        .and_then(|captures| captures.get(1))
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!("replaced malformed {} sequences while decoding", used.name());
    }
    text
}

/// Whether `name` can be written as an element name and read back unchanged.
///
/// This is stricter than XML itself: colons are refused because the reader
/// drops namespace prefixes.
#[must_use]
pub fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Parses a whole document and returns its root element.
///
/// # Errors
///
/// Fails if the text is not well-formed XML.
pub fn parse(text: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let syntax = |reader: &Reader<&[u8]>, source: quick_xml::Error| XmlError::Syntax {
        #[allow(clippy::cast_lossless, clippy::useless_conversion)]
        position: reader.buffer_position() as u64,
        source,
    };

    // the bottom of the stack collects top-level elements
    let mut stack = vec![XmlNode::default()];

    loop {
        let event = reader.read_event().map_err(|e| syntax(&reader, e))?;
        match event {
            Event::Start(start) => {
                let node = XmlNode::from_start(&start).map_err(|e| syntax(&reader, e))?;
                stack.push(node);
            }
            Event::Empty(start) => {
                let node = XmlNode::from_start(&start).map_err(|e| syntax(&reader, e))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
            }
            Event::Text(text) => {
                let content = text
                    .unescape()
                    .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&text).into_owned()));
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&content);
                }
            }
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        let open = stack.pop().map(|node| node.name).unwrap_or_default();
        return Err(XmlError::Unclosed(open));
    }

    stack
        .pop()
        .and_then(|document| document.children.into_iter().next())
        .ok_or(XmlError::NoRoot)
}

/// An indenting writer over an in-memory buffer.
pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

/// A failure while serializing a document.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The XML writer reported an error.
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    /// The output buffer reported an error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl XmlWriter {
    /// Creates a writer and emits the XML declaration.
    ///
    /// # Errors
    ///
    /// Fails if the declaration cannot be written.
    pub fn new() -> Result<Self, WriteError> {
        let mut writer = Self {
            inner: Writer::new_with_indent(Vec::new(), b' ', 2),
        };
        writer
            .inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(writer)
    }

    /// Opens an element.
    ///
    /// # Errors
    ///
    /// Fails if the event cannot be written.
    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), WriteError> {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.inner.write_event(Event::Start(start))?;
        Ok(())
    }

    /// Closes an element.
    ///
    /// # Errors
    ///
    /// Fails if the event cannot be written.
    pub fn end(&mut self, name: &str) -> Result<(), WriteError> {
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// Writes `<name>text</name>`, or `<name/>` when `text` is empty.
    ///
    /// # Errors
    ///
    /// Fails if the events cannot be written.
    pub fn leaf(&mut self, name: &str, text: &str) -> Result<(), WriteError> {
        self.leaf_with(name, &[], text)
    }

    /// Like [`leaf`](Self::leaf), with attributes.
    ///
    /// # Errors
    ///
    /// Fails if the events cannot be written.
    pub fn leaf_with(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<(), WriteError> {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        if text.is_empty() {
            self.inner.write_event(Event::Empty(start))?;
            return Ok(());
        }
        self.inner.write_event(Event::Start(start))?;
        self.inner.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// Writes `<name><![CDATA[text]]></name>`, or `<name/>` when `text` is
    /// empty.
    ///
    /// Text that itself contains `]]>` is written escaped instead.
    ///
    /// # Errors
    ///
    /// Fails if the events cannot be written.
    pub fn cdata_leaf(&mut self, name: &str, text: &str) -> Result<(), WriteError> {
        if text.is_empty() || text.contains("]]>") {
            return self.leaf(name, text);
        }
        self.inner.write_event(Event::Start(BytesStart::new(name)))?;
        self.inner.write_event(Event::CData(BytesCData::new(text)))?;
        self.end(name)
    }

    /// Finishes the document and returns it as a string.
    #[must_use]
    pub fn finish(self) -> String {
        let mut bytes = self.inner.into_inner();
        bytes.push(b'\n');
        // only `&str` input is ever written
        String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }
}
