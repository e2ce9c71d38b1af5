//! Record lifecycle types.
//!
//! Records are owned by the surrounding platform. The engine only reads
//! their existence and writes their status and audit fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a record.
///
/// The four known states drive the routing; stores may carry others, which
/// are preserved as [`RecordStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordStatus {
    /// Not submitted yet.
    Draft,
    /// Routing is in flight.
    Submitted,
    /// The last node completed.
    Approved,
    /// Someone rejected the record.
    Rejected,
    /// A status the engine does not interpret.
    Other(String),
}

impl RecordStatus {
    /// Returns the stored name of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Other(s) => s,
        }
    }

    /// Returns true for `approved` and `rejected`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl From<&str> for RecordStatus {
    fn from(s: &str) -> Self {
        match s {
            "draft" => Self::Draft,
            "submitted" => Self::Submitted,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for RecordStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<RecordStatus> for String {
    fn from(status: RecordStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slice of a business record the engine can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier.
    pub id: String,
    /// Owning subject.
    pub subject_id: String,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Who last changed the record, if known.
    pub updated_by: Option<String>,
    /// When the record was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Creates a draft record.
    pub fn draft(id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject_id: subject_id.into(),
            status: RecordStatus::Draft,
            updated_by: None,
            updated_at: Utc::now(),
        }
    }
}
