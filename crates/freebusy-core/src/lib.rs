//! Core types: time windows, busy intervals, queries, tracing

pub mod interval;
pub mod time;
pub mod tracing;

pub use interval::{BusyInterval, FreeBusyQuery, QueryError};
pub use time::{TimeError, TimeWindow, parse_timestamp};
pub use tracing::{LogConfig, LogFormat, TracingError, init_tracing};
