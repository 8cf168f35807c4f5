//! The core sensor reading type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Field names that get dedicated columns in the relational backend.
///
/// Every other field travels in the flexible attribute map. Storage code
/// never special-cases names beyond these two.
pub const CANONICAL_FIELDS: [&str; 2] = ["temperature", "humidity"];

/// One timestamped set of sensor measurements from one client.
///
/// Timestamps carry second precision: they are truncated on construction so
/// that a reading survives every storage representation unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Opaque stable identifier for the originating client.
    pub client_id: String,
    /// When the measurement was taken (UTC, second precision).
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Named numeric measurements. `BTreeMap` keeps field order stable
    /// across encode/decode, which backend-equivalence checks rely on.
    pub fields: BTreeMap<String, f64>,
}

impl Reading {
    /// Create a reading with an explicit timestamp.
    pub fn new(client_id: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            client_id: client_id.into(),
            timestamp: truncate_to_second(timestamp),
            fields: BTreeMap::new(),
        }
    }

    /// Create a reading timestamped now.
    pub fn now(client_id: impl Into<String>) -> Self {
        Self::new(client_id, OffsetDateTime::now_utc())
    }

    /// Add a measurement field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Field names not covered by [`CANONICAL_FIELDS`].
    pub fn extra_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields
            .iter()
            .filter(|(name, _)| !CANONICAL_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), *value))
    }
}

/// Drop sub-second precision from a timestamp.
pub fn truncate_to_second(ts: OffsetDateTime) -> OffsetDateTime {
    ts.replace_nanosecond(0).unwrap_or(ts)
}
