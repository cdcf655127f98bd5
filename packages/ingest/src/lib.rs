//! trafficflow ingest - streaming DATEX II ingest for NDW traffic feeds.
//!
//! This crate turns the large, minutely refreshed NDW publications into
//! small per-site aggregates of vehicle flow and average speed. Documents are
//! never loaded as a whole: repeated records are cut out of the XML stream one
//! at a time, decoded, resolved against the measurement site reference table
//! and aggregated.
//!
//! # Example
//!
//! ```
//! use trafficflow_ingest::traffic::{SiteFilter, TrafficHandler};
//!
//! let handler = TrafficHandler::new(SiteFilter::all(), 4);
//! let stats = handler
//!     .trigger_decode(b"<d2LogicalModel><payloadPublication/></d2LogicalModel>")
//!     .unwrap();
//! assert_eq!(stats.records_seen, 0);
//! assert!(handler.get_aggregate("RWS01_MONIBAS_0021hrl0414ra").is_none());
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Configuration constants, environment loading and validation
//! - [`error`]: Error types and Result alias
//! - [`xml`]: Element path collector and streaming record extractor
//! - [`datex2`]: Per-record decoders for the DATEX II publications
//! - [`traffic`]: Reference table, aggregation, cache, notifications, scheduling
//! - [`gzip`]: Transparent decompression of feed files
//! - [`http`]: HTTP download with retries and conditional requests
//! - [`ndw`]: Feed source for the NDW open data portal
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod datex2;
pub mod error;
pub mod gzip;
pub mod http;
pub mod ndw;
pub mod traffic;
pub mod xml;

// Re-export commonly used items
pub use error::{DecodeError, IngestError, Result};
pub use traffic::{AggregateMeasurement, DecodeStats, TrafficHandler};
