//! Routing events.
//!
//! This module provides [`WorkflowEvent`] for observing routing decisions.
//! Events are broadcast through a channel that can be subscribed to for
//! notifications, audit logging, or building inbox UIs.

use crate::{RecordStatus, TaskAction};

/// An event emitted while a record moves through its routing.
///
/// Events are only emitted after the store mutation they describe has
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WorkflowEvent {
    /// A record was submitted into routing.
    Submitted {
        /// The record's identifier.
        record_id: String,
        /// The subject the record belongs to.
        subject_id: String,
    },

    /// Pending tasks were created at a node.
    TasksCreated {
        /// The record's identifier.
        record_id: String,
        /// The node code.
        node: String,
        /// One entry per created task; `None` is an unassigned task.
        assignees: Vec<Option<String>>,
    },

    /// A task was closed by its assignee.
    TaskCompleted {
        /// The record's identifier.
        record_id: String,
        /// The node code.
        node: String,
        /// The task's identifier.
        task_id: i64,
        /// How the task was closed.
        action: TaskAction,
    },

    /// Pending tasks were cancelled as a side effect.
    TasksCancelled {
        /// The record's identifier.
        record_id: String,
        /// The node code, or `None` when every node was swept.
        node: Option<String>,
        /// Number of tasks cancelled.
        count: u64,
    },

    /// A node's completion rule was satisfied.
    NodeCompleted {
        /// The record's identifier.
        record_id: String,
        /// The node code.
        node: String,
    },

    /// The record's lifecycle status changed.
    RecordStatusChanged {
        /// The record's identifier.
        record_id: String,
        /// The new status.
        status: RecordStatus,
    },
}

impl WorkflowEvent {
    /// Returns the record ID for this event.
    pub fn record_id(&self) -> &str {
        match self {
            Self::Submitted { record_id, .. }
            | Self::TasksCreated { record_id, .. }
            | Self::TaskCompleted { record_id, .. }
            | Self::TasksCancelled { record_id, .. }
            | Self::NodeCompleted { record_id, .. }
            | Self::RecordStatusChanged { record_id, .. } => record_id,
        }
    }

    /// Returns the node code for this event, if applicable.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::TasksCreated { node, .. }
            | Self::TaskCompleted { node, .. }
            | Self::NodeCompleted { node, .. } => Some(node),
            Self::TasksCancelled { node, .. } => node.as_deref(),
            Self::Submitted { .. } | Self::RecordStatusChanged { .. } => None,
        }
    }

    /// Returns true if the record reached `approved` or `rejected`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RecordStatusChanged { status, .. } if status.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_record_id() {
        let event = WorkflowEvent::Submitted {
            record_id: "rec-1".to_string(),
            subject_id: "leave".to_string(),
        };
        assert_eq!(event.record_id(), "rec-1");
    }

    #[test]
    fn test_event_node() {
        let event = WorkflowEvent::NodeCompleted {
            record_id: "rec-1".to_string(),
            node: "mgr".to_string(),
        };
        assert_eq!(event.node(), Some("mgr"));

        let sweep = WorkflowEvent::TasksCancelled {
            record_id: "rec-1".to_string(),
            node: None,
            count: 3,
        };
        assert_eq!(sweep.node(), None);

        let status = WorkflowEvent::RecordStatusChanged {
            record_id: "rec-1".to_string(),
            status: RecordStatus::Submitted,
        };
        assert_eq!(status.node(), None);
    }

    #[test]
    fn test_is_terminal() {
        let submitted = WorkflowEvent::RecordStatusChanged {
            record_id: "x".to_string(),
            status: RecordStatus::Submitted,
        };
        assert!(!submitted.is_terminal());

        let rejected = WorkflowEvent::RecordStatusChanged {
            record_id: "x".to_string(),
            status: RecordStatus::Rejected,
        };
        assert!(rejected.is_terminal());

        let completed = WorkflowEvent::NodeCompleted {
            record_id: "x".to_string(),
            node: "dir".to_string(),
        };
        assert!(!completed.is_terminal());
    }

    #[test]
    fn test_task_completed_event() {
        let event = WorkflowEvent::TaskCompleted {
            record_id: "rec-1".to_string(),
            node: "mgr".to_string(),
            task_id: 4,
            action: TaskAction::Approve,
        };
        assert_eq!(event.record_id(), "rec-1");
        assert_eq!(event.node(), Some("mgr"));
        assert_eq!(event.clone(), event);
    }
}
