//! Error types for the ingest pipeline.
//!
//! Uses the dual-error pattern: `IngestError` for failures that abort a whole
//! cycle (transport, malformed documents, configuration), and `DecodeError` for
//! problems with a single record, which are counted and logged but never
//! propagated out of a cycle.

use thiserror::Error;

/// Main error type for the ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to download a feed file.
    #[error("Failed to download feed '{feed}': {source}")]
    Download {
        feed: String,
        #[source]
        source: reqwest::Error,
    },

    /// All retry attempts exhausted.
    #[error("Download failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// The server answered with a status we cannot use.
    #[error("Unexpected HTTP status {status} for feed '{feed}'")]
    UnexpectedStatus { feed: String, status: u16 },

    /// The top-level document is not well-formed XML.
    #[error("Malformed XML document: {0}")]
    MalformedDocument(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Feed file name that cannot be used in a download URL.
    #[error("Invalid feed name: '{0}'. Expected a plain file name (e.g., trafficspeed.xml.gz)")]
    InvalidFeedName(String),

    /// The scheduler thread is not running.
    #[error("Scheduler is not running")]
    SchedulerStopped,
}

impl From<quick_xml::Error> for IngestError {
    fn from(err: quick_xml::Error) -> Self {
        IngestError::MalformedDocument(err.to_string())
    }
}

/// Result type alias for ingest operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failure to decode a single extracted record.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The fragment itself could not be parsed.
    #[error("Fragment is not valid XML: {0}")]
    Xml(String),

    /// The fragment root is not the element this decoder handles.
    #[error("Unexpected root element <{found}>, expected <{expected}>")]
    UnexpectedRoot { expected: String, found: String },

    /// Missing required XML element.
    #[error("Missing required element: {element} in {context}")]
    MissingElement { element: String, context: String },

    /// Missing required attribute.
    #[error("Missing required attribute '{attribute}' on <{element}>")]
    MissingAttribute { attribute: String, element: String },

    /// Numeric field that does not parse.
    #[error("Invalid number '{value}' in {field}")]
    InvalidNumber { field: String, value: String },

    /// Timestamp that is not RFC 3339.
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

impl From<roxmltree::Error> for DecodeError {
    fn from(err: roxmltree::Error) -> Self {
        DecodeError::Xml(err.to_string())
    }
}
