//! XML streaming and navigation.
//!
//! - [`collector`]: element path stack and subtree re-serialization
//! - [`extractor`]: event-driven record extraction from large documents
//! - [`utils`]: helpers for decoding one extracted record with `roxmltree`

pub mod collector;
pub mod extractor;
pub mod utils;

pub use collector::{escape_xml, SaxCollector};
pub use extractor::{
    pump_event, PathSuffix, RecordExtractor, RecordSplitter, XmlEventHandler, XmlFragment,
};
pub use utils::{
    expect_root, find_by_path, find_child, find_children, get_attribute, get_tag_name, get_text,
    parse_bool_at, parse_number_at, parse_number_attribute, require_number_attribute, text_at,
};
