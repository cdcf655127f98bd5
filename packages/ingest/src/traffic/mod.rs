//! From decoded records to query-ready per-site aggregates.
//!
//! - [`reference`]: site filter and the swappable reference table
//! - [`aggregate`]: flow and speed aggregation for one site
//! - [`cache`]: latest aggregate per site
//! - [`notify`]: update notifications to subscribers
//! - [`handler`]: ties the above together per decode cycle
//! - [`scheduler`]: the thread that fetches feeds and drives the handler

pub mod aggregate;
pub mod cache;
pub mod handler;
pub mod notify;
pub mod reference;
pub mod scheduler;
pub mod stats;

pub use aggregate::{aggregate, AggregateMeasurement, Aggregation, LaneMeasurement};
pub use cache::MeasurementCache;
pub use handler::TrafficHandler;
pub use notify::{BroadcastReport, SubscriptionRegistry, UpdateNotice};
pub use reference::{ReferenceTable, SiteFilter};
pub use scheduler::{next_fetch_delay, Scheduler};
pub use stats::DecodeStats;
