//! In-memory store implementation.
//!
//! This module provides [`MemoryStore`], a thread-safe in-memory
//! implementation of all three store traits, suitable for testing and
//! development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ConfigStore, RecordStore, TaskStore};
use crate::{
    ConfigEntry, NewTask, NodeCompletion, NodeMode, Record, RecordStatus, Result, Task,
    TaskAction, TaskQuery, TaskStatus, WorkflowConfig,
};

/// Internal storage for the memory store.
#[derive(Debug, Default)]
struct Storage {
    subjects: HashSet<String>,
    /// Records indexed by (subject_id, record_id).
    records: HashMap<(String, String), Record>,
    /// Configs indexed by subject_id.
    configs: HashMap<String, ConfigEntry>,
    next_config_id: i64,
    /// Tasks indexed by id; iteration order is insertion order.
    tasks: BTreeMap<i64, Task>,
    next_task_id: i64,
}

impl Storage {
    fn pending_at<'a>(
        &'a self,
        record_id: &'a str,
        node_code: &'a str,
    ) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks
            .values()
            .filter(move |t| t.is_pending() && t.record_id == record_id && t.node_code == node_code)
    }

    fn cancel_where(&mut self, predicate: impl Fn(&Task) -> bool) -> u64 {
        let now = Utc::now();
        let mut changed = 0;
        for task in self.tasks.values_mut() {
            if task.is_pending() && predicate(task) {
                task.status = TaskStatus::Done;
                task.action = TaskAction::Cancelled;
                task.updated_at = now;
                changed += 1;
            }
        }
        changed
    }
}

/// An in-memory implementation of [`ConfigStore`], [`TaskStore`] and
/// [`RecordStore`].
///
/// This implementation uses `Arc<RwLock<...>>` internally, making it
/// safe to clone and share across async tasks. Every trait method takes the
/// lock once, so each call is atomic with respect to the others.
///
/// # Example
///
/// ```
/// use formflow::{MemoryStore, Record, RecordStore};
///
/// # async fn example() -> formflow::Result<()> {
/// let store = MemoryStore::new();
/// store.register_subject("leave").await;
/// store.insert_record(Record::draft("rec-1", "leave")).await;
///
/// assert!(store.subject_exists("leave").await?);
/// assert!(store.get_record("rec-1", "leave").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    storage: Arc<RwLock<Storage>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(Storage::default())),
        }
    }

    /// Makes a subject known to the store.
    pub async fn register_subject(&self, subject_id: impl Into<String>) {
        self.storage.write().await.subjects.insert(subject_id.into());
    }

    /// Inserts or replaces a record. Its subject is registered as well.
    pub async fn insert_record(&self, record: Record) {
        let mut storage = self.storage.write().await;
        storage.subjects.insert(record.subject_id.clone());
        storage
            .records
            .insert((record.subject_id.clone(), record.id.clone()), record);
    }

    /// Returns the total number of tasks stored.
    ///
    /// Useful for testing.
    pub async fn task_count(&self) -> usize {
        self.storage.read().await.tasks.len()
    }

    /// Clears all stored data.
    ///
    /// Useful for resetting state between tests.
    pub async fn clear(&self) {
        *self.storage.write().await = Storage::default();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_config(&self, subject_id: &str) -> Result<Option<ConfigEntry>> {
        let storage = self.storage.read().await;
        Ok(storage.configs.get(subject_id).cloned())
    }

    async fn save_config(
        &self,
        subject_id: &str,
        name: Option<&str>,
        config: &WorkflowConfig,
    ) -> Result<i64> {
        let mut storage = self.storage.write().await;
        let now = Utc::now();

        if let Some(entry) = storage.configs.get_mut(subject_id) {
            entry.name = name.map(str::to_string);
            entry.config = config.clone();
            entry.updated_at = now;
            return Ok(entry.id);
        }

        storage.next_config_id += 1;
        let id = storage.next_config_id;
        storage.configs.insert(
            subject_id.to_string(),
            ConfigEntry {
                id,
                subject_id: subject_id.to_string(),
                name: name.map(str::to_string),
                config: config.clone(),
                updated_at: now,
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &NewTask) -> Result<i64> {
        let mut storage = self.storage.write().await;
        storage.next_task_id += 1;
        let id = storage.next_task_id;
        storage
            .tasks
            .insert(id, task.clone().into_task(id, Utc::now()));
        Ok(id)
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        let storage = self.storage.read().await;
        Ok(storage.tasks.get(&task_id).cloned())
    }

    async fn find_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<Vec<i64>> {
        let storage = self.storage.read().await;
        let ids = storage.pending_at(record_id, node_code).map(|t| t.id).collect();
        Ok(ids)
    }

    async fn find_pending_task(
        &self,
        record_id: &str,
        node_code: &str,
        assignee: &str,
    ) -> Result<Option<i64>> {
        let storage = self.storage.read().await;
        let id = storage
            .pending_at(record_id, node_code)
            .find(|t| t.assignee.as_deref() == Some(assignee))
            .map(|t| t.id);
        Ok(id)
    }

    async fn find_pending_task_by_assignee(
        &self,
        record_id: &str,
        assignee: &str,
    ) -> Result<Option<i64>> {
        let storage = self.storage.read().await;
        Ok(storage
            .tasks
            .values()
            .find(|t| {
                t.is_pending()
                    && t.record_id == record_id
                    && t.assignee.as_deref() == Some(assignee)
            })
            .map(|t| t.id))
    }

    async fn get_task_node_code(&self, task_id: i64) -> Result<Option<String>> {
        let storage = self.storage.read().await;
        Ok(storage.tasks.get(&task_id).map(|t| t.node_code.clone()))
    }

    async fn update_task(
        &self,
        task_id: i64,
        status: TaskStatus,
        action: TaskAction,
        comment: Option<&str>,
    ) -> Result<u64> {
        let mut storage = self.storage.write().await;
        match storage.tasks.get_mut(&task_id) {
            Some(task) if task.is_pending() => {
                task.status = status;
                task.action = action;
                task.comment = comment.map(str::to_string);
                task.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn approve_task(
        &self,
        task_id: i64,
        mode: NodeMode,
        comment: Option<&str>,
    ) -> Result<Option<NodeCompletion>> {
        let mut storage = self.storage.write().await;
        let (record_id, node_code) = match storage.tasks.get_mut(&task_id) {
            Some(task) if task.is_pending() => {
                task.status = TaskStatus::Done;
                task.action = TaskAction::Approve;
                task.comment = comment.map(str::to_string);
                task.updated_at = Utc::now();
                (task.record_id.clone(), task.node_code.clone())
            }
            _ => return Ok(None),
        };

        let completion = match mode {
            NodeMode::Any => NodeCompletion {
                complete: true,
                cancelled: storage
                    .cancel_where(|t| t.record_id == record_id && t.node_code == node_code),
            },
            NodeMode::All => {
                let remaining = storage.pending_at(&record_id, &node_code).count();
                NodeCompletion {
                    complete: remaining == 0,
                    cancelled: 0,
                }
            }
        };
        Ok(Some(completion))
    }

    async fn cancel_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<u64> {
        let mut storage = self.storage.write().await;
        Ok(storage.cancel_where(|t| t.record_id == record_id && t.node_code == node_code))
    }

    async fn cancel_all_pending_tasks(&self, record_id: &str) -> Result<u64> {
        let mut storage = self.storage.write().await;
        Ok(storage.cancel_where(|t| t.record_id == record_id))
    }

    async fn count_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<u64> {
        let storage = self.storage.read().await;
        let count = storage.pending_at(record_id, node_code).count();
        Ok(count as u64)
    }

    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let storage = self.storage.read().await;
        Ok(storage
            .tasks
            .values()
            .rev()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn record_tasks(&self, record_id: &str) -> Result<Vec<Task>> {
        let storage = self.storage.read().await;
        Ok(storage
            .tasks
            .values()
            .filter(|t| t.record_id == record_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn subject_exists(&self, subject_id: &str) -> Result<bool> {
        let storage = self.storage.read().await;
        Ok(storage.subjects.contains(subject_id))
    }

    async fn get_record(&self, record_id: &str, subject_id: &str) -> Result<Option<Record>> {
        let storage = self.storage.read().await;
        Ok(storage
            .records
            .get(&(subject_id.to_string(), record_id.to_string()))
            .cloned())
    }

    async fn update_record_status(
        &self,
        record_id: &str,
        subject_id: &str,
        status: &RecordStatus,
        operator: Option<&str>,
    ) -> Result<u64> {
        let mut storage = self.storage.write().await;
        match storage
            .records
            .get_mut(&(subject_id.to_string(), record_id.to_string()))
        {
            Some(record) => {
                record.status = status.clone();
                record.updated_by = operator.map(str::to_string);
                record.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn touch_record(
        &self,
        record_id: &str,
        subject_id: &str,
        operator: Option<&str>,
    ) -> Result<u64> {
        let mut storage = self.storage.write().await;
        match storage
            .records
            .get_mut(&(subject_id.to_string(), record_id.to_string()))
        {
            Some(record) => {
                record.updated_by = operator.map(str::to_string);
                record.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
