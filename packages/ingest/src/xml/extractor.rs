//! Streaming extraction of repeated records from large XML documents.
//!
//! The extractor never builds a tree of the whole document. It feeds parser
//! events into a [`RecordSplitter`], which captures one matching element at a
//! time and hands it out as a standalone [`XmlFragment`].

use std::collections::VecDeque;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::collector::SaxCollector;
use crate::error::{IngestError, Result};

/// Push interface for XML parser events.
///
/// Element and attribute names are local names (no namespace prefix), and
/// text is already unescaped and untrimmed. An `Err` from any callback stops
/// the parse.
pub trait XmlEventHandler {
    /// An element was opened.
    fn on_start(&mut self, name: &str, attributes: &[(String, String)]) -> Result<()>;

    /// Character data, including whitespace between elements.
    fn on_text(&mut self, text: &str) -> Result<()>;

    /// The current element was closed.
    fn on_end(&mut self, name: &str) -> Result<()>;
}

/// A trailing sequence of element names, e.g. `payloadPublication/siteMeasurements`.
///
/// Matching is per path segment: `siteMeasurements` matches `.../siteMeasurements`
/// but not `.../oldSiteMeasurements`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSuffix {
    segments: Vec<String>,
}

impl PathSuffix {
    /// Parse a `/`-separated suffix; leading and trailing slashes are ignored.
    #[must_use]
    pub fn new(suffix: &str) -> Self {
        Self {
            segments: suffix
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Whether the open element stack ends with this suffix.
    #[must_use]
    pub fn matches(&self, stack: &[String]) -> bool {
        !self.segments.is_empty()
            && stack.len() >= self.segments.len()
            && stack[stack.len() - self.segments.len()..] == self.segments[..]
    }
}

/// One reconstructed record, well-formed on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlFragment {
    /// 1-based position of this record in the document.
    pub ordinal: usize,
    /// Serialized XML of the record, with a single root element.
    pub xml: String,
}

impl XmlFragment {
    /// The fragment text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.xml
    }
}

/// Event handler that cuts matching elements out of the event stream.
///
/// A match nested inside another match is part of the outer record and is
/// not emitted on its own.
#[derive(Debug)]
pub struct RecordSplitter {
    collector: SaxCollector,
    suffix: PathSuffix,
    capture_depth: Option<usize>,
    ready: VecDeque<XmlFragment>,
    emitted: usize,
    seen_root: bool,
    root_closed: bool,
}

impl RecordSplitter {
    /// Create a splitter for elements whose path ends with `suffix`.
    #[must_use]
    pub fn new(suffix: &str) -> Self {
        Self {
            collector: SaxCollector::new(),
            suffix: PathSuffix::new(suffix),
            capture_depth: None,
            ready: VecDeque::new(),
            emitted: 0,
            seen_root: false,
            root_closed: false,
        }
    }

    /// Take the oldest completed fragment.
    pub fn pop_fragment(&mut self) -> Option<XmlFragment> {
        self.ready.pop_front()
    }

    /// Number of fragments completed so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Largest capture buffer observed, in bytes.
    #[must_use]
    pub fn peak_buffered(&self) -> usize {
        self.collector.peak_buffered()
    }

    /// Check that the document ended cleanly.
    pub fn finish(&self) -> Result<()> {
        if !self.seen_root {
            return Err(IngestError::MalformedDocument(
                "document has no root element".to_string(),
            ));
        }
        if self.collector.depth() != 0 {
            return Err(IngestError::MalformedDocument(format!(
                "document ended inside <{}>",
                self.collector.current_path()
            )));
        }
        Ok(())
    }
}

impl XmlEventHandler for RecordSplitter {
    fn on_start(&mut self, name: &str, attributes: &[(String, String)]) -> Result<()> {
        if self.root_closed {
            return Err(IngestError::MalformedDocument(format!(
                "element <{name}> after the root element"
            )));
        }
        self.seen_root = true;
        self.collector.enter(name);
        if self.capture_depth.is_none() && self.suffix.matches(self.collector.segments()) {
            self.collector.reset_buffer();
            self.capture_depth = Some(self.collector.depth());
        }
        self.collector.append_start(name, attributes);
        Ok(())
    }

    fn on_text(&mut self, text: &str) -> Result<()> {
        if self.collector.depth() == 0 {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(IngestError::MalformedDocument(
                "text outside the root element".to_string(),
            ));
        }
        self.collector.append_text(text);
        Ok(())
    }

    fn on_end(&mut self, name: &str) -> Result<()> {
        let depth = self.collector.depth();
        self.collector.end_element(name);
        if self.capture_depth == Some(depth) {
            self.capture_depth = None;
            self.emitted += 1;
            self.ready.push_back(XmlFragment {
                ordinal: self.emitted,
                xml: self.collector.take_buffer(),
            });
        }
        if self.collector.depth() == 0 {
            self.root_closed = true;
        }
        Ok(())
    }
}

/// Read one parser event and forward it to `handler`.
///
/// Returns `Ok(false)` at end of input.
pub fn pump_event<R: BufRead, H: XmlEventHandler>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    handler: &mut H,
) -> Result<bool> {
    buf.clear();
    match reader.read_event_into(buf)? {
        Event::Start(e) => {
            let name = local_name(e.local_name().as_ref())?;
            let attributes = collect_attributes(&e)?;
            handler.on_start(&name, &attributes)?;
        }
        Event::Empty(e) => {
            let name = local_name(e.local_name().as_ref())?;
            let attributes = collect_attributes(&e)?;
            handler.on_start(&name, &attributes)?;
            handler.on_end(&name)?;
        }
        Event::End(e) => {
            let name = local_name(e.local_name().as_ref())?;
            handler.on_end(&name)?;
        }
        Event::Text(e) => {
            let text = e.unescape()?;
            handler.on_text(&text)?;
        }
        Event::CData(e) => {
            let raw = e.into_inner();
            let text = std::str::from_utf8(&raw)
                .map_err(|err| IngestError::MalformedDocument(err.to_string()))?;
            handler.on_text(text)?;
        }
        Event::Eof => return Ok(false),
        Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
    }
    Ok(true)
}

fn local_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|err| IngestError::MalformedDocument(err.to_string()))
}

/// Attributes by local name, without namespace declarations.
///
/// When two attributes share a local name the first one wins, so the
/// re-serialized start tag stays well-formed.
fn collect_attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attributes: Vec<(String, String)> = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| IngestError::MalformedDocument(err.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = local_name(attr.key.local_name().as_ref())?;
        if attributes.iter().any(|(existing, _)| *existing == key) {
            continue;
        }
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

/// Lazy sequence of records extracted from an XML byte stream.
///
/// Yields each matching record as soon as its end tag has been read. A
/// malformed document yields a single `Err` and then ends.
pub struct RecordExtractor<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    splitter: RecordSplitter,
    finished: bool,
}

impl<R: BufRead> RecordExtractor<R> {
    /// Extract elements whose path ends with `suffix` from `input`.
    pub fn new(input: R, suffix: &str) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
            splitter: RecordSplitter::new(suffix),
            finished: false,
        }
    }

    /// Largest capture buffer observed so far, in bytes.
    #[must_use]
    pub fn peak_buffered(&self) -> usize {
        self.splitter.peak_buffered()
    }
}

impl<R: BufRead> Iterator for RecordExtractor<R> {
    type Item = Result<XmlFragment>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fragment) = self.splitter.pop_fragment() {
                return Some(Ok(fragment));
            }
            if self.finished {
                return None;
            }
            match pump_event(&mut self.reader, &mut self.buf, &mut self.splitter) {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    if let Err(err) = self.splitter.finish() {
                        return Some(Err(err));
                    }
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for RecordExtractor<R> {}
