//! Store contracts consumed by the routing engine.
//!
//! The engine owns no durable state. Everything it decides is derived from
//! three stores:
//!
//! - [`ConfigStore`]: one workflow configuration per subject
//! - [`TaskStore`]: approval tasks keyed by record and node
//! - [`RecordStore`]: record lifecycle status and audit fields
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: thread-safe in-memory storage for testing/development
//! - `SqliteStore` (feature `sqlite`): persistent storage backed by SQLite
//!
//! # Conditional mutations
//!
//! Implementations must apply [`TaskStore::update_task`] and both cancel
//! operations only to rows that are still `pending`, atomically per call.
//! The engine relies on this to reject a second approval of the same task.
//!
//! [`TaskStore::approve_task`] goes further: closing the task and deciding
//! whether its node completed happen in one atomic step, so two approvers
//! of different tasks at the same node never both advance the record, even
//! when they run through separate engines over one store.
//!
//! # Example
//!
//! ```
//! use formflow::{MemoryStore, NewTask, TaskStore};
//!
//! # async fn example() -> formflow::Result<()> {
//! let store = MemoryStore::new();
//! store
//!     .insert_task(&NewTask::pending("rec-1", "leave", "mgr", Some("alice".into())))
//!     .await?;
//! assert_eq!(store.count_pending_tasks("rec-1", "mgr").await?, 1);
//! # Ok(())
//! # }
//! ```

mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::{
    ConfigEntry, NewTask, NodeCompletion, NodeMode, RecordStatus, Result, Task, TaskAction,
    TaskQuery, TaskStatus,
};
use crate::{Record, WorkflowConfig};

/// Storage for per-subject workflow configurations.
///
/// This trait is object-safe so the engine can hold it as `dyn ConfigStore`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the configuration saved for `subject_id`, or `None` when the
    /// subject is unconfigured.
    async fn get_config(&self, subject_id: &str) -> Result<Option<ConfigEntry>>;

    /// Inserts or replaces the configuration of `subject_id`.
    ///
    /// # Returns
    ///
    /// The config id; an update keeps the id of the existing row.
    async fn save_config(
        &self,
        subject_id: &str,
        name: Option<&str>,
        config: &WorkflowConfig,
    ) -> Result<i64>;
}

/// Storage for approval tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a task and returns its id.
    async fn insert_task(&self, task: &NewTask) -> Result<i64>;

    /// Returns a task by id.
    async fn get_task(&self, task_id: i64) -> Result<Option<Task>>;

    /// Returns the ids of pending tasks at `(record_id, node_code)` in store
    /// order.
    async fn find_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<Vec<i64>>;

    /// Returns the pending task at `(record_id, node_code)` assigned to
    /// `assignee`, if any.
    async fn find_pending_task(
        &self,
        record_id: &str,
        node_code: &str,
        assignee: &str,
    ) -> Result<Option<i64>>;

    /// Returns a pending task of `record_id` assigned to `assignee` at any
    /// node.
    async fn find_pending_task_by_assignee(
        &self,
        record_id: &str,
        assignee: &str,
    ) -> Result<Option<i64>>;

    /// Returns the node code of a task.
    async fn get_task_node_code(&self, task_id: i64) -> Result<Option<String>>;

    /// Closes a task if and only if it is still pending.
    ///
    /// # Returns
    ///
    /// The number of rows changed: `0` when the task is missing or was
    /// already closed.
    async fn update_task(
        &self,
        task_id: i64,
        status: TaskStatus,
        action: TaskAction,
        comment: Option<&str>,
    ) -> Result<u64>;

    /// Approves a pending task and applies its node's completion rule in
    /// one atomic step.
    ///
    /// Under [`NodeMode::Any`] the other pending tasks at the task's
    /// `(record_id, node_code)` are cancelled and the node completes. Under
    /// [`NodeMode::All`] the node completes when no task there is left
    /// pending.
    ///
    /// # Returns
    ///
    /// `None` when the task is missing or no longer pending.
    async fn approve_task(
        &self,
        task_id: i64,
        mode: NodeMode,
        comment: Option<&str>,
    ) -> Result<Option<NodeCompletion>>;

    /// Cancels every pending task at `(record_id, node_code)`.
    async fn cancel_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<u64>;

    /// Cancels every pending task of `record_id`, at all nodes.
    async fn cancel_all_pending_tasks(&self, record_id: &str) -> Result<u64>;

    /// Counts pending tasks at `(record_id, node_code)`.
    async fn count_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<u64>;

    /// Returns the tasks matching `query`, newest first.
    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>>;

    /// Returns every task of `record_id` in creation order.
    async fn record_tasks(&self, record_id: &str) -> Result<Vec<Task>>;
}

/// Storage for record lifecycle fields.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns true if the subject is known.
    async fn subject_exists(&self, subject_id: &str) -> Result<bool>;

    /// Returns the record, if it exists under `subject_id`.
    async fn get_record(&self, record_id: &str, subject_id: &str) -> Result<Option<Record>>;

    /// Sets the record's status and audit fields.
    ///
    /// # Returns
    ///
    /// The number of rows changed.
    async fn update_record_status(
        &self,
        record_id: &str,
        subject_id: &str,
        status: &RecordStatus,
        operator: Option<&str>,
    ) -> Result<u64>;

    /// Updates only the record's audit fields.
    async fn touch_record(
        &self,
        record_id: &str,
        subject_id: &str,
        operator: Option<&str>,
    ) -> Result<u64>;
}

/// A single backend that provides all three stores.
///
/// Blanket-implemented, so [`MemoryStore`] and `SqliteStore` can be handed
/// to the engine builder in one call.
pub trait WorkflowStore: ConfigStore + TaskStore + RecordStore {}

impl<T: ConfigStore + TaskStore + RecordStore> WorkflowStore for T {}
