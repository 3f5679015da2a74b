//! Lease records enriched by the lease workflows.
//!
//! The record is owned by the caller. Workflows receive a mutable borrow and
//! only ever touch the workflow-populated fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Land agency a lease belongs to.
///
/// Closed set. Each agency has its own top-level workspace in storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agency {
    /// Federal land management (e.g., NMNM serial numbers)
    Federal,
    /// State land office
    State,
}

impl Agency {
    /// All supported agencies.
    pub const ALL: [Agency; 2] = [Agency::Federal, Agency::State];

    /// Short display code.
    pub fn code(&self) -> &'static str {
        match self {
            Agency::Federal => "BLM",
            Agency::State => "NMSLO",
        }
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Tri-state result of previous report detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Not determined, or the directory could not be read
    #[default]
    Unknown,
    /// A completed report exists
    Found,
    /// The directory was read and holds no completed report
    NotFound,
}

impl ReportStatus {
    /// Converts to an optional boolean; `None` for unknown.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ReportStatus::Unknown => None,
            ReportStatus::Found => Some(true),
            ReportStatus::NotFound => Some(false),
        }
    }
}

impl From<bool> for ReportStatus {
    fn from(found: bool) -> Self {
        if found {
            ReportStatus::Found
        } else {
            ReportStatus::NotFound
        }
    }
}

/// A lease record as supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Owning agency
    pub agency: Agency,
    /// Lease identifier (serial number), possibly with surrounding whitespace
    pub lease_number: String,
    /// Storage directory of the lease, once found
    #[serde(default)]
    pub directory_path: Option<String>,
    /// Shareable link to the directory, once issued
    #[serde(default)]
    pub shareable_link: Option<String>,
    /// Whether a completed report already exists in the directory
    #[serde(default)]
    pub previous_report_found: ReportStatus,
}

impl LeaseRecord {
    /// Creates a record with no workflow-populated fields.
    pub fn new(agency: Agency, lease_number: impl Into<String>) -> Self {
        Self {
            agency,
            lease_number: lease_number.into(),
            directory_path: None,
            shareable_link: None,
            previous_report_found: ReportStatus::Unknown,
        }
    }

    /// The lease identifier with surrounding whitespace removed.
    pub fn trimmed_lease_number(&self) -> &str {
        self.lease_number.trim()
    }

    /// Directory path, if set and not blank.
    pub fn known_directory(&self) -> Option<&str> {
        self.directory_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
    }
}
