//! Time-ordered event identifiers.
//!
//! Identifiers are UUIDv7: the high 48 bits carry a millisecond Unix
//! timestamp, the rest is drawn from the process CSPRNG. Lexicographic
//! order of the rendered form matches generation order for identifiers
//! separated by at least one millisecond.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{NoContext, Timestamp, Uuid};

/// A globally unique, time-sortable identifier in canonical hyphenated form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generates an identifier stamped with the current wall clock.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Generates an identifier stamped with an explicit timestamp.
    ///
    /// The random bits still come from the CSPRNG; only the time prefix is
    /// fixed, which is enough for deterministic ordering in tests.
    pub fn generate_at(at: DateTime<Utc>) -> Self {
        let secs = at.timestamp().max(0) as u64;
        let nanos = at.timestamp_subsec_nanos();
        let ts = Timestamp::from_unix(NoContext, secs, nanos);
        Self(Uuid::new_v7(ts).to_string())
    }

    /// Checks that a string is a canonically formatted UUIDv7: 36 characters,
    /// hyphens at the fixed positions, version nibble `7`, RFC 4122 variant.
    pub fn is_valid(s: &str) -> bool {
        if s.len() != 36 {
            return false;
        }
        match Uuid::parse_str(s) {
            Ok(u) => u.get_version_num() == 7 && u.get_variant() == uuid::Variant::RFC4122,
            Err(_) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
