//! Helpers for navigating and extracting data from a decoded record's DOM.
//!
//! All lookups match on local names, so `xsi:type` and `type` are the same
//! attribute and namespace prefixes on elements are ignored.

use std::str::FromStr;

use roxmltree::Node;

use crate::error::DecodeError;

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use trafficflow_ingest::xml::get_tag_name;
///
/// let xml = r#"<d2:siteMeasurements xmlns:d2="http://datex2.eu/schema/2/2_0"/>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "siteMeasurements");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Find the first child element with the given tag name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use trafficflow_ingest::xml::find_child;
///
/// let xml = r#"<root><child1/><child2/></root>"#;
/// let doc = Document::parse(xml).unwrap();
/// let root = doc.root_element();
///
/// assert!(find_child(root, "child1").is_some());
/// assert!(find_child(root, "missing").is_none());
/// ```
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && get_tag_name(*child) == tag)
}

/// Find all child elements with the given tag name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use trafficflow_ingest::xml::find_children;
///
/// let xml = r#"<root><item>1</item><item>2</item><other/></root>"#;
/// let doc = Document::parse(xml).unwrap();
///
/// let items: Vec<_> = find_children(doc.root_element(), "item").collect();
/// assert_eq!(items.len(), 2);
/// ```
pub fn find_children<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |child| child.is_element() && get_tag_name(*child) == tag)
}

/// Find a descendant element matching a path of tag names.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use trafficflow_ingest::xml::find_by_path;
///
/// let xml = r#"<vehicleFlow><vehicleFlowRate>1200</vehicleFlowRate></vehicleFlow>"#;
/// let doc = Document::parse(xml).unwrap();
///
/// let rate = find_by_path(doc.root_element(), "vehicleFlowRate");
/// assert_eq!(rate.unwrap().text(), Some("1200"));
/// ```
pub fn find_by_path<'a, 'input>(node: Node<'a, 'input>, path: &str) -> Option<Node<'a, 'input>> {
    let mut current = node;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current = find_child(current, part)?;
    }
    Some(current)
}

/// Get the text content of a node, trimmed.
pub fn get_text(node: Node<'_, '_>) -> String {
    node.text()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Get the trimmed text at `path` below `node`, or an empty string.
pub fn text_at(node: Node<'_, '_>, path: &str) -> String {
    find_by_path(node, path).map(get_text).unwrap_or_default()
}

/// Get an attribute value by local name, ignoring any namespace.
pub fn get_attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.name() == name)
        .map(|attr| attr.value())
}

/// Parse the text at `path` as a number, if the element is present.
///
/// Returns `Ok(None)` when the element is absent or empty.
pub fn parse_number_at<T: FromStr>(
    node: Node<'_, '_>,
    path: &str,
) -> Result<Option<T>, DecodeError> {
    let text = text_at(node, path);
    if text.is_empty() {
        return Ok(None);
    }
    text.parse()
        .map(Some)
        .map_err(|_| DecodeError::InvalidNumber {
            field: path.to_string(),
            value: text,
        })
}

/// Parse a numeric attribute, if present.
pub fn parse_number_attribute<T: FromStr>(
    node: Node<'_, '_>,
    name: &str,
) -> Result<Option<T>, DecodeError> {
    match get_attribute(node, name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DecodeError::InvalidNumber {
                field: format!("@{name}"),
                value: value.to_string(),
            }),
    }
}

/// Require a numeric attribute.
pub fn require_number_attribute<T: FromStr>(
    node: Node<'_, '_>,
    name: &str,
) -> Result<T, DecodeError> {
    parse_number_attribute(node, name)?.ok_or_else(|| DecodeError::MissingAttribute {
        attribute: name.to_string(),
        element: get_tag_name(node).to_string(),
    })
}

/// Parse an `xs:boolean` at `path`; absent means `false`.
pub fn parse_bool_at(node: Node<'_, '_>, path: &str) -> bool {
    matches!(text_at(node, path).as_str(), "true" | "1")
}

/// Check that the root of a decoded fragment has the expected name.
pub fn expect_root<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    expected: &str,
) -> Result<Node<'a, 'input>, DecodeError> {
    let root = doc.root_element();
    if get_tag_name(root) == expected {
        Ok(root)
    } else {
        Err(DecodeError::UnexpectedRoot {
            expected: expected.to_string(),
            found: get_tag_name(root).to_string(),
        })
    }
}
