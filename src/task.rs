//! Task types.
//!
//! A [`Task`] is one unit of approval work for a `(record, node, assignee)`.
//! Tasks start `pending` and are closed exactly once; cancellation is a
//! transition, never a delete, so the full history stays queryable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::FlowError;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for its assignee.
    Pending,
    /// Closed by an approve, reject or cancellation.
    Done,
}

impl TaskStatus {
    /// Returns the stored name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
        }
    }
}

/// The action that closed (or will close) a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    /// Not acted on yet.
    Pending,
    /// Approved by its assignee.
    Approve,
    /// Rejected by its assignee.
    Reject,
    /// Closed by the engine as a side effect of another action.
    Cancelled,
}

impl TaskAction {
    /// Returns the stored name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            other => Err(FlowError::Store(format!("unknown task status: {}", other))),
        }
    }
}

impl FromStr for TaskAction {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(FlowError::Store(format!("unknown task action: {}", other))),
        }
    }
}

/// A stored task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: i64,
    /// The owning record.
    pub record_id: String,
    /// The subject the record belongs to.
    pub subject_id: String,
    /// The node this task belongs to.
    pub node_code: String,
    /// Who is expected to act, if anyone.
    pub assignee: Option<String>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Closing action.
    pub action: TaskAction,
    /// Free-text comment left with the action.
    pub comment: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Returns true if the task is still waiting.
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}

/// What approving one task did to its node.
///
/// Returned by [`TaskStore::approve_task`](crate::TaskStore::approve_task),
/// which decides it in the same atomic step that closes the task. At most
/// one approval per node activation observes `complete == true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCompletion {
    /// The node has nothing left pending and should advance.
    pub complete: bool,
    /// Sibling tasks cancelled by an `any`-mode approval.
    pub cancelled: u64,
}

/// The fields of a task to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// The owning record.
    pub record_id: String,
    /// The subject the record belongs to.
    pub subject_id: String,
    /// The node this task belongs to.
    pub node_code: String,
    /// Who is expected to act, if anyone.
    pub assignee: Option<String>,
    /// Initial status.
    pub status: TaskStatus,
    /// Initial action.
    pub action: TaskAction,
    /// Optional comment.
    pub comment: Option<String>,
}

impl NewTask {
    /// A pending task waiting on `assignee`.
    pub fn pending(
        record_id: impl Into<String>,
        subject_id: impl Into<String>,
        node_code: impl Into<String>,
        assignee: Option<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            subject_id: subject_id.into(),
            node_code: node_code.into(),
            assignee,
            status: TaskStatus::Pending,
            action: TaskAction::Pending,
            comment: None,
        }
    }

    /// A task that is already closed with `action`.
    pub fn closed(
        record_id: impl Into<String>,
        subject_id: impl Into<String>,
        node_code: impl Into<String>,
        assignee: Option<String>,
        action: TaskAction,
    ) -> Self {
        Self {
            status: TaskStatus::Done,
            action,
            ..Self::pending(record_id, subject_id, node_code, assignee)
        }
    }

    /// Attaches a comment.
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    /// Materialises the stored form of this task.
    pub fn into_task(self, id: i64, now: DateTime<Utc>) -> Task {
        Task {
            id,
            record_id: self.record_id,
            subject_id: self.subject_id,
            node_code: self.node_code,
            assignee: self.assignee,
            status: self.status,
            action: self.action,
            comment: self.comment,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for the task inbox query. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    /// Only tasks assigned to this subject.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Only tasks of records under this subject.
    #[serde(default)]
    pub subject_id: Option<String>,
}

impl TaskQuery {
    /// Matches every task.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the query to an assignee.
    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Restricts the query to a subject.
    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Returns true if `task` passes the filter. Blank filters are ignored.
    pub fn matches(&self, task: &Task) -> bool {
        let assignee_ok = match self.assignee.as_deref().map(str::trim) {
            Some(a) if !a.is_empty() => task.assignee.as_deref() == Some(a),
            _ => true,
        };
        let subject_ok = match self.subject_id.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => task.subject_id == s,
            _ => true,
        };
        assignee_ok && subject_ok
    }
}
