use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Lifecycle status of a memory item.
///
/// Every status has its own bucket file on disk; an item lives in exactly
/// one bucket at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// In force and rendered into the runtime projection.
    Active,
    /// Captured but not yet promoted.
    Pending,
    /// Superseded or retired; kept until an external prune step removes it.
    Deprecated,
}

impl Status {
    /// All statuses in bucket order.
    pub const ALL: [Status; 3] = [Status::Active, Status::Pending, Status::Deprecated];

    /// Lowercase name, also used as the bucket file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "pending" => Ok(Self::Pending),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

/// Number of items in each bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub active: usize,
    pub pending: usize,
    pub deprecated: usize,
}

impl StatusCounts {
    /// Count for a single status.
    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Active => self.active,
            Status::Pending => self.pending,
            Status::Deprecated => self.deprecated,
        }
    }

    /// Total number of items across all buckets.
    pub fn total(&self) -> usize {
        self.active + self.pending + self.deprecated
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={} pending={} deprecated={}",
            self.active, self.pending, self.deprecated
        )
    }
}
