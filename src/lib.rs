//! # Formflow
//!
//! An approval-routing engine for form records.
//!
//! A subject (a dataset or form) owns one ordered list of approval nodes.
//! Submitting a record activates the first node and fans out one task per
//! assignee. Approvals close tasks; a node completes when all of its tasks
//! are approved (`all` mode) or when the first one is (`any` mode), and the
//! record then moves on to the next node or, after the last one, becomes
//! `approved`. A rejection anywhere cancels every open task of the record.
//!
//! The engine keeps no state of its own. Configs, tasks and record status
//! live behind the [`ConfigStore`], [`TaskStore`] and [`RecordStore`]
//! traits, and every action is re-derived from fresh reads.
//!
//! ## Quick Example
//!
//! ```
//! use formflow::{ActionRequest, MemoryStore, Record, RecordStatus, WorkflowConfig,
//!     WorkflowEngine, WorkflowNode};
//!
//! # async fn example() -> formflow::Result<()> {
//! let store = MemoryStore::new();
//! store.insert_record(Record::draft("rec-1", "leave")).await;
//!
//! let engine = WorkflowEngine::builder().store(store.clone()).build()?;
//! engine
//!     .save_config(
//!         "leave",
//!         Some("Leave request"),
//!         &WorkflowConfig::new(vec![
//!             WorkflowNode::new("mgr").with_assignees(["alice", "bob"]),
//!             WorkflowNode::new("dir").with_assignees(["carol"]),
//!         ]),
//!     )
//!     .await?;
//!
//! engine.submit("leave", "rec-1", &ActionRequest::new()).await?;
//! for who in ["alice", "bob", "carol"] {
//!     engine
//!         .approve("leave", "rec-1", &ActionRequest::new().operator(who))
//!         .await?;
//! }
//!
//! let progress = engine.progress("leave", "rec-1").await?;
//! assert_eq!(progress.record_status, RecordStatus::Approved);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `sqlite`: enables `SqliteStore`, a persistent backend on SQLite.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod gate;
pub mod progress;
pub mod record;
pub mod settings;
pub mod store;
pub mod task;

pub use config::{ConfigEntry, NodeMode, WorkflowConfig, WorkflowNode};
pub use engine::{ActionOutcome, ActionRequest, Routing, WorkflowEngine, WorkflowEngineBuilder};
pub use error::{ErrorKind, FlowError, Result};
pub use event::WorkflowEvent;
pub use progress::{NodeProgress, NodeState, RoutingProgress};
pub use record::{Record, RecordStatus};
pub use settings::EngineSettings;
pub use store::{ConfigStore, MemoryStore, RecordStore, TaskStore, WorkflowStore};
pub use task::{NewTask, NodeCompletion, Task, TaskAction, TaskQuery, TaskStatus};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_returns_valid_semver() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WorkflowEngine>();
        assert_send_sync::<MemoryStore>();
    }
}
