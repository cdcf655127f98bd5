//! Element path tracking and subtree reconstruction for streaming parses.

use std::fmt::Write as _;

/// Tracks the stack of open elements and re-serializes the element currently
/// being captured.
///
/// The buffer only grows while a capture is active (started by
/// [`reset_buffer`](Self::reset_buffer)), so memory is bounded by the largest
/// captured record rather than by the document.
#[derive(Debug, Default)]
pub struct SaxCollector {
    stack: Vec<String>,
    buffer: String,
    capturing: bool,
    peak_buffered: usize,
}

impl SaxCollector {
    /// Create an empty collector positioned outside any document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `name` and return the new path.
    pub fn enter(&mut self, name: &str) -> String {
        self.stack.push(name.to_string());
        self.current_path()
    }

    /// Push `name`, append its start tag and return the new path.
    pub fn begin_element(&mut self, name: &str, attributes: &[(String, String)]) -> String {
        let path = self.enter(name);
        self.append_start(name, attributes);
        path
    }

    /// Append a serialized start tag.
    pub fn append_start(&mut self, name: &str, attributes: &[(String, String)]) {
        if !self.capturing {
            return;
        }
        self.buffer.push('<');
        self.buffer.push_str(name);
        for (key, value) in attributes {
            // String formatting into a String cannot fail.
            let _ = write!(self.buffer, " {key}=\"{}\"", escape_xml(value));
        }
        self.buffer.push('>');
        self.track_peak();
    }

    /// Append escaped character data.
    pub fn append_text(&mut self, text: &str) {
        if !self.capturing {
            return;
        }
        self.buffer.push_str(&escape_xml(text));
        self.track_peak();
    }

    /// Append the end tag, pop, and return the path as it was before popping.
    pub fn end_element(&mut self, name: &str) -> String {
        let path = self.current_path();
        if self.capturing {
            self.buffer.push_str("</");
            self.buffer.push_str(name);
            self.buffer.push('>');
            self.track_peak();
        }
        self.stack.pop();
        path
    }

    /// Discard captured text and start a new capture; the path stack is untouched.
    pub fn reset_buffer(&mut self) {
        self.buffer.clear();
        self.capturing = true;
    }

    /// Take the captured text and stop capturing.
    pub fn take_buffer(&mut self) -> String {
        self.capturing = false;
        std::mem::take(&mut self.buffer)
    }

    /// Whether a capture is in progress.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// The open element names, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.stack
    }

    /// Number of open elements.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open element names joined with `/`.
    #[must_use]
    pub fn current_path(&self) -> String {
        self.stack.join("/")
    }

    /// Bytes currently held in the capture buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Largest number of bytes the capture buffer ever held.
    #[must_use]
    pub fn peak_buffered(&self) -> usize {
        self.peak_buffered
    }

    fn track_peak(&mut self) {
        self.peak_buffered = self.peak_buffered.max(self.buffer.len());
    }
}

/// Escape the five predefined XML entities.
///
/// # Examples
/// ```
/// use trafficflow_ingest::xml::escape_xml;
///
/// assert_eq!(escape_xml("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
/// ```
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_path_push_and_pop() {
        let mut collector = SaxCollector::new();
        assert_eq!(collector.begin_element("a", &[]), "a");
        assert_eq!(collector.begin_element("b", &[]), "a/b");
        assert_eq!(collector.end_element("b"), "a/b");
        assert_eq!(collector.current_path(), "a");
        assert_eq!(collector.end_element("a"), "a");
        assert_eq!(collector.depth(), 0);
    }

    #[test]
    fn test_nothing_buffered_outside_capture() {
        let mut collector = SaxCollector::new();
        collector.begin_element("root", &attrs(&[("id", "1")]));
        collector.append_text("ignored");
        collector.end_element("root");
        assert_eq!(collector.buffered(), 0);
        assert_eq!(collector.peak_buffered(), 0);
    }

    #[test]
    fn test_capture_reconstructs_subtree() {
        let mut collector = SaxCollector::new();
        collector.enter("root");
        collector.enter("record");
        collector.reset_buffer();
        collector.append_start("record", &attrs(&[("id", "x&y")]));
        collector.begin_element("value", &[]);
        collector.append_text("1 < 2");
        collector.end_element("value");
        collector.end_element("record");

        assert_eq!(
            collector.take_buffer(),
            r#"<record id="x&amp;y"><value>1 &lt; 2</value></record>"#
        );
        assert!(!collector.is_capturing());
        assert_eq!(collector.current_path(), "root");
    }

    #[test]
    fn test_reset_keeps_path() {
        let mut collector = SaxCollector::new();
        collector.enter("a");
        collector.enter("b");
        collector.reset_buffer();
        collector.append_text("text");
        collector.reset_buffer();
        assert_eq!(collector.buffered(), 0);
        assert_eq!(collector.segments(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_escape_xml_all_entities() {
        assert_eq!(escape_xml("&<>\"'"), "&amp;&lt;&gt;&quot;&apos;");
        assert_eq!(escape_xml("plain"), "plain");
    }
}
