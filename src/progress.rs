//! Routing progress reporting.
//!
//! This module provides [`RoutingProgress`] for inspecting where a record
//! is in its approval routing. The snapshot is derived entirely from the
//! record's task history; nothing about it is stored.

use std::fmt;

use crate::{NodeMode, Record, RecordStatus, Task, TaskAction, WorkflowConfig};

/// Derived state of one node for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No task has been created at this node yet.
    Waiting,
    /// At least one task is still pending.
    Active,
    /// The node's tasks are closed and at least one approved.
    Complete,
    /// A task at this node was rejected.
    Rejected,
    /// Every task at this node was cancelled.
    Cancelled,
}

impl NodeState {
    fn derive(tasks: &[&Task]) -> Self {
        if tasks.is_empty() {
            Self::Waiting
        } else if tasks.iter().any(|t| t.is_pending()) {
            Self::Active
        } else if tasks.iter().any(|t| t.action == TaskAction::Reject) {
            Self::Rejected
        } else if tasks.iter().any(|t| t.action == TaskAction::Approve) {
            Self::Complete
        } else {
            Self::Cancelled
        }
    }

    /// Returns a status indicator character.
    pub fn status_char(&self) -> char {
        match self {
            Self::Waiting => '⏳',
            Self::Active => '🔄',
            Self::Complete => '✅',
            Self::Rejected => '❌',
            Self::Cancelled => '⛔',
        }
    }
}

/// Progress entry for a single node.
#[derive(Debug, Clone)]
pub struct NodeProgress {
    /// The node code.
    pub code: String,
    /// Display name from the config, if any.
    pub name: Option<String>,
    /// Completion mode; `None` for nodes not in the config.
    pub mode: Option<NodeMode>,
    /// Derived state.
    pub state: NodeState,
    /// The node's tasks in creation order.
    pub tasks: Vec<Task>,
}

impl NodeProgress {
    /// Number of tasks still pending.
    pub fn pending_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_pending()).count()
    }
}

/// A snapshot of a record's routing.
#[derive(Debug, Clone)]
pub struct RoutingProgress {
    /// The record's identifier.
    pub record_id: String,
    /// The subject the record belongs to.
    pub subject_id: String,
    /// The record's current status.
    pub record_status: RecordStatus,
    /// Whether the subject has a non-empty workflow config.
    pub configured: bool,
    /// Configured nodes in routing order, followed by any node codes that
    /// only appear in the task history.
    pub nodes: Vec<NodeProgress>,
}

impl RoutingProgress {
    /// Builds the snapshot for `record` from its tasks.
    ///
    /// Without a config, nodes are the distinct node codes of `tasks` in
    /// first-seen order.
    pub fn from_tasks(record: &Record, config: Option<&WorkflowConfig>, tasks: Vec<Task>) -> Self {
        let config = config.filter(|c| !c.is_empty());
        let mut nodes: Vec<NodeProgress> = Vec::new();

        if let Some(config) = config {
            for node in &config.nodes {
                let at_node: Vec<&Task> =
                    tasks.iter().filter(|t| t.node_code == node.code).collect();
                nodes.push(NodeProgress {
                    code: node.code.clone(),
                    name: node.name.clone(),
                    mode: Some(node.mode),
                    state: NodeState::derive(&at_node),
                    tasks: at_node.into_iter().cloned().collect(),
                });
            }
        }

        for task in &tasks {
            if nodes.iter().any(|n| n.code == task.node_code) {
                continue;
            }
            let at_node: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.node_code == task.node_code)
                .collect();
            nodes.push(NodeProgress {
                code: task.node_code.clone(),
                name: None,
                mode: None,
                state: NodeState::derive(&at_node),
                tasks: at_node.into_iter().cloned().collect(),
            });
        }

        Self {
            record_id: record.id.clone(),
            subject_id: record.subject_id.clone(),
            record_status: record.status.clone(),
            configured: config.is_some(),
            nodes,
        }
    }

    /// Returns true if the record was approved.
    pub fn is_complete(&self) -> bool {
        self.record_status == RecordStatus::Approved
    }

    /// Returns true if the record was rejected.
    pub fn is_rejected(&self) -> bool {
        self.record_status == RecordStatus::Rejected
    }

    /// Returns the codes of nodes with pending tasks.
    pub fn active_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Active)
            .map(|n| n.code.as_str())
            .collect()
    }

    /// Returns the progress entry for a node.
    pub fn node(&self, code: &str) -> Option<&NodeProgress> {
        self.nodes.iter().find(|n| n.code == code)
    }

    /// Returns the share of completed nodes as a percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.nodes.is_empty() {
            return if self.is_complete() { 100.0 } else { 0.0 };
        }

        let completed = self
            .nodes
            .iter()
            .filter(|n| n.state == NodeState::Complete)
            .count();

        (completed as f32 / self.nodes.len() as f32) * 100.0
    }
}

impl fmt::Display for RoutingProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Routing for record \"{}\" ({}):",
            self.record_id, self.subject_id
        )?;
        writeln!(f)?;

        for node in &self.nodes {
            let state_str = format!("{:?}", node.state);
            let mode_str = node.mode.map(|m| m.as_str()).unwrap_or("-");
            writeln!(
                f,
                "  {} {:<15} {:<10} {}",
                node.state.status_char(),
                node.code,
                state_str,
                mode_str
            )?;

            for task in &node.tasks {
                write!(
                    f,
                    "     └─ #{:<5} {:<12} {}",
                    task.id,
                    task.assignee.as_deref().unwrap_or("(unassigned)"),
                    task.action
                )?;
                if let Some(ref comment) = task.comment {
                    write!(f, "  \"{}\"", comment)?;
                }
                writeln!(f)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Progress: {:.0}%", self.progress_percent())?;
        writeln!(f, "Status: {}", self.record_status)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewTask, WorkflowNode};
    use chrono::Utc;

    fn task(id: i64, node: &str, assignee: &str, action: TaskAction) -> Task {
        let new = if action == TaskAction::Pending {
            NewTask::pending("rec-1", "leave", node, Some(assignee.into()))
        } else {
            NewTask::closed("rec-1", "leave", node, Some(assignee.into()), action)
        };
        new.into_task(id, Utc::now())
    }

    fn config() -> WorkflowConfig {
        WorkflowConfig::new(vec![
            WorkflowNode::new("mgr").with_assignees(["alice", "bob"]),
            WorkflowNode::new("dir")
                .with_assignees(["carol"])
                .with_mode(NodeMode::Any),
        ])
    }

    #[test]
    fn test_first_node_active() {
        let record = Record::draft("rec-1", "leave");
        let tasks = vec![
            task(1, "mgr", "alice", TaskAction::Approve),
            task(2, "mgr", "bob", TaskAction::Pending),
        ];
        let progress = RoutingProgress::from_tasks(&record, Some(&config()), tasks);

        assert!(progress.configured);
        assert_eq!(progress.active_nodes(), vec!["mgr"]);
        assert_eq!(progress.node("mgr").unwrap().pending_count(), 1);
        assert_eq!(progress.node("dir").unwrap().state, NodeState::Waiting);
        assert_eq!(progress.progress_percent(), 0.0);
    }

    #[test]
    fn test_any_mode_cancelled_sibling_still_complete() {
        let record = Record::draft("rec-1", "leave");
        let tasks = vec![
            task(1, "mgr", "alice", TaskAction::Approve),
            task(2, "mgr", "bob", TaskAction::Cancelled),
        ];
        let progress = RoutingProgress::from_tasks(&record, Some(&config()), tasks);
        assert_eq!(progress.node("mgr").unwrap().state, NodeState::Complete);
        assert_eq!(progress.progress_percent(), 50.0);
    }

    #[test]
    fn test_rejected_and_cancelled_nodes() {
        let mut record = Record::draft("rec-1", "leave");
        record.status = RecordStatus::Rejected;
        let tasks = vec![
            task(1, "mgr", "alice", TaskAction::Approve),
            task(2, "mgr", "bob", TaskAction::Approve),
            task(3, "dir", "carol", TaskAction::Reject),
        ];
        let progress = RoutingProgress::from_tasks(&record, Some(&config()), tasks);

        assert!(progress.is_rejected());
        assert_eq!(progress.node("dir").unwrap().state, NodeState::Rejected);

        let only_cancelled = vec![task(4, "mgr", "bob", TaskAction::Cancelled)];
        let progress = RoutingProgress::from_tasks(&record, Some(&config()), only_cancelled);
        assert_eq!(progress.node("mgr").unwrap().state, NodeState::Cancelled);
    }

    #[test]
    fn test_unconfigured_groups_by_node_code() {
        let mut record = Record::draft("rec-1", "leave");
        record.status = RecordStatus::Approved;
        let tasks = vec![
            task(1, "submit", "dave", TaskAction::Pending),
            task(2, "approve", "erin", TaskAction::Approve),
        ];
        let progress = RoutingProgress::from_tasks(&record, None, tasks);

        assert!(!progress.configured);
        let codes: Vec<&str> = progress.nodes.iter().map(|n| n.code.as_str()).collect();
        assert_eq!(codes, vec!["submit", "approve"]);
        assert!(progress.nodes.iter().all(|n| n.mode.is_none()));
        assert!(progress.is_complete());
    }

    #[test]
    fn test_empty_config_treated_as_unconfigured() {
        let record = Record::draft("rec-1", "leave");
        let empty = WorkflowConfig::default();
        let progress = RoutingProgress::from_tasks(&record, Some(&empty), Vec::new());
        assert!(!progress.configured);
        assert!(progress.nodes.is_empty());
        assert_eq!(progress.progress_percent(), 0.0);
    }

    #[test]
    fn test_history_outside_config_is_appended() {
        let record = Record::draft("rec-1", "leave");
        let tasks = vec![task(1, "submit", "dave", TaskAction::Pending)];
        let progress = RoutingProgress::from_tasks(&record, Some(&config()), tasks);
        let codes: Vec<&str> = progress.nodes.iter().map(|n| n.code.as_str()).collect();
        assert_eq!(codes, vec!["mgr", "dir", "submit"]);
    }

    #[test]
    fn test_display() {
        let record = Record::draft("rec-1", "leave");
        let tasks = vec![
            task(1, "mgr", "alice", TaskAction::Approve),
            task(2, "mgr", "bob", TaskAction::Pending),
        ];
        let progress = RoutingProgress::from_tasks(&record, Some(&config()), tasks);

        let display = format!("{}", progress);
        assert!(display.contains("rec-1"));
        assert!(display.contains("mgr"));
        assert!(display.contains("dir"));
        assert!(display.contains("alice"));
        assert!(display.contains("Status: draft"));
    }
}
