//! Database operations for the registry
//!
//! Read helpers take a pool; write helpers take a `SqliteConnection` so they
//! compose into one transaction per submission or lifecycle transition.

pub mod analyses;
pub mod analysis_types;
pub mod entities;
pub mod files;
pub mod history;
pub mod ids;
pub mod studies;

use chrono::{DateTime, Utc};

use crate::error::{RegistryError, RegistryResult};

/// Parse an RFC 3339 timestamp column
pub(crate) fn parse_ts(s: &str) -> RegistryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RegistryError::Internal(format!("bad timestamp '{}': {}", s, e)))
}

/// Parse an optional RFC 3339 timestamp column
pub(crate) fn parse_ts_opt(s: Option<String>) -> RegistryResult<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}
