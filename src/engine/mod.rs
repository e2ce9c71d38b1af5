//! The routing engine.
//!
//! This module provides [`WorkflowEngine`] and [`WorkflowEngineBuilder`].
//! The engine is a stateless orchestrator: every action re-reads the
//! subject's config and the record's tasks, decides what changes, and
//! writes those changes back through the stores it was built with.

mod resolve;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::gate::RecordGate;
use crate::{
    ConfigEntry, ConfigStore, EngineSettings, ErrorKind, FlowError, NewTask, RecordStatus,
    RecordStore, Result, RoutingProgress, Task, TaskAction, TaskQuery, TaskStatus, TaskStore,
    WorkflowConfig, WorkflowEvent, WorkflowStore,
};

/// The caller-supplied side of an action.
///
/// All fields are optional; blank strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionRequest {
    /// Who performs the action. Written to the record's audit fields.
    pub operator: Option<String>,
    /// Assignee for ad-hoc tasks, the submit fallback, and task matching
    /// when no operator is given.
    pub assignee: Option<String>,
    /// Node hint; on an unconfigured subject it names the ad-hoc task's node.
    pub node_code: Option<String>,
    /// Comment stored on the task being closed or created.
    pub comment: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl ActionRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operator.
    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Sets the assignee.
    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Sets the node hint.
    pub fn node(mut self, node_code: impl Into<String>) -> Self {
        self.node_code = Some(node_code.into());
        self
    }

    /// Sets the comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub(crate) fn operator_id(&self) -> Option<&str> {
        non_blank(&self.operator)
    }

    pub(crate) fn assignee_id(&self) -> Option<&str> {
        non_blank(&self.assignee)
    }

    pub(crate) fn node_hint(&self) -> Option<&str> {
        non_blank(&self.node_code)
    }

    /// The operator if given, else the assignee.
    pub(crate) fn acting_assignee(&self) -> Option<&str> {
        self.operator_id().or_else(|| self.assignee_id())
    }
}

/// What an action did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Rows reported by the store for the action's primary write.
    ///
    /// Submit, reject and unconfigured approve report the record status
    /// update; a configured approve reports the one task it closed.
    pub rows_affected: u64,
    /// The node that completed during this action, if any.
    pub completed_node: Option<String>,
    /// The node whose tasks were created during this action, if any.
    pub next_node: Option<String>,
    /// The record status written by this action, if it wrote one.
    pub record_status: Option<RecordStatus>,
}

/// How a subject routes its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// A saved, non-empty node list.
    Configured(WorkflowConfig),
    /// No config, or one without nodes: actions write a single ad-hoc task.
    Unconfigured,
}

impl Routing {
    fn from_entry(entry: Option<ConfigEntry>) -> Self {
        match entry {
            Some(entry) if !entry.config.is_empty() => Self::Configured(entry.config),
            _ => Self::Unconfigured,
        }
    }

    /// Returns true for [`Routing::Configured`].
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }
}

/// Orchestrates submit, approve and reject over three stores.
///
/// # Construction
///
/// ```
/// use formflow::{MemoryStore, WorkflowEngine};
///
/// let engine = WorkflowEngine::builder()
///     .store(MemoryStore::new())
///     .build()?;
/// # Ok::<(), formflow::FlowError>(())
/// ```
///
/// # Thread Safety
///
/// `WorkflowEngine` is `Send + Sync` and can be shared across async tasks.
/// Actions on the same record are serialised within one engine; actions on
/// different records run concurrently. Node completion is decided by the
/// task store in one atomic call, so engines in separate processes sharing
/// a store still advance a node at most once.
pub struct WorkflowEngine {
    configs: Arc<dyn ConfigStore>,
    tasks: Arc<dyn TaskStore>,
    records: Arc<dyn RecordStore>,
    settings: EngineSettings,
    gate: RecordGate,
    event_tx: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowEngine {
    /// Creates a new engine builder.
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new()
    }

    /// Returns the settings the engine was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Subscribes to routing events.
    ///
    /// Events are not persisted; if the receiver is too slow, events may be
    /// dropped.
    ///
    /// # Example
    ///
    /// ```
    /// # use formflow::{MemoryStore, WorkflowEngine};
    /// let engine = WorkflowEngine::builder().store(MemoryStore::new()).build().unwrap();
    /// let mut events = engine.subscribe();
    ///
    /// // In a separate task:
    /// // while let Ok(event) = events.recv().await {
    /// //     println!("Event: {:?}", event);
    /// // }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    /// Emits an event to all subscribers.
    ///
    /// Ignores send errors (no subscribers or channel full).
    fn emit(&self, event: WorkflowEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn ensure_subject(&self, subject_id: &str) -> Result<()> {
        if subject_id.trim().is_empty() {
            return Err(FlowError::MissingIdentifier("subject"));
        }
        if !self.records.subject_exists(subject_id).await? {
            return Err(FlowError::SubjectNotFound(subject_id.to_string()));
        }
        Ok(())
    }

    async fn ensure_record(&self, subject_id: &str, record_id: &str) -> Result<()> {
        self.ensure_subject(subject_id).await?;
        if record_id.trim().is_empty() {
            return Err(FlowError::MissingIdentifier("record"));
        }
        if self.records.get_record(record_id, subject_id).await?.is_none() {
            return Err(FlowError::RecordNotFound(record_id.to_string()));
        }
        Ok(())
    }

    /// Validates and stores the workflow config of a subject.
    ///
    /// # Returns
    ///
    /// The config id. Saving over an existing config keeps its id.
    ///
    /// # Errors
    ///
    /// - [`FlowError::InvalidConfig`] if the config fails validation
    /// - [`FlowError::SubjectNotFound`] if the subject is unknown
    pub async fn save_config(
        &self,
        subject_id: &str,
        name: Option<&str>,
        config: &WorkflowConfig,
    ) -> Result<i64> {
        self.ensure_subject(subject_id).await?;
        config.validate()?;

        let id = self.configs.save_config(subject_id, name, config).await?;
        info!(subject = %subject_id, config_id = id, nodes = config.nodes.len(), "workflow config saved");
        Ok(id)
    }

    /// Returns the saved config of a subject.
    ///
    /// # Errors
    ///
    /// [`FlowError::ConfigNotFound`] if none was saved.
    pub async fn get_config(&self, subject_id: &str) -> Result<ConfigEntry> {
        self.ensure_subject(subject_id).await?;
        self.configs
            .get_config(subject_id)
            .await?
            .ok_or_else(|| FlowError::ConfigNotFound(subject_id.to_string()))
    }

    /// Returns how records of a subject are routed.
    pub async fn routing(&self, subject_id: &str) -> Result<Routing> {
        self.ensure_subject(subject_id).await?;
        self.load_routing(subject_id).await
    }

    async fn load_routing(&self, subject_id: &str) -> Result<Routing> {
        let routing = Routing::from_entry(self.configs.get_config(subject_id).await?);
        debug!(configured = routing.is_configured(), "loaded routing");
        Ok(routing)
    }

    /// Submits a record into routing.
    ///
    /// The record becomes `submitted`. A configured subject gets the first
    /// node's tasks; an unconfigured one gets a single pending ad-hoc task.
    pub async fn submit(
        &self,
        subject_id: &str,
        record_id: &str,
        request: &ActionRequest,
    ) -> Result<ActionOutcome> {
        let span = info_span!("submit", subject = %subject_id, record = %record_id);
        async move {
            self.ensure_record(subject_id, record_id).await?;
            let _permit = self.gate.acquire(subject_id, record_id).await;

            let status = RecordStatus::Submitted;
            let rows = self
                .records
                .update_record_status(record_id, subject_id, &status, request.operator_id())
                .await?;
            info!(%status, "record submitted");
            self.emit(WorkflowEvent::Submitted {
                record_id: record_id.to_string(),
                subject_id: subject_id.to_string(),
            });
            self.emit(WorkflowEvent::RecordStatusChanged {
                record_id: record_id.to_string(),
                status: status.clone(),
            });

            let (node, assignees) = match self.load_routing(subject_id).await? {
                Routing::Unconfigured => {
                    let node = request
                        .node_hint()
                        .unwrap_or(&self.settings.submit_node)
                        .to_string();
                    let assignee = request.assignee_id().map(str::to_string);
                    self.tasks
                        .insert_task(
                            &NewTask::pending(record_id, subject_id, node.as_str(), assignee.clone())
                                .with_comment(request.comment.clone()),
                        )
                        .await?;
                    (node, vec![assignee])
                }
                Routing::Configured(config) => {
                    let first = config.first_node().ok_or(FlowError::NoActiveNode)?;
                    let assignees = resolve::create_tasks(
                        self.tasks.as_ref(),
                        subject_id,
                        record_id,
                        first,
                        request.assignee_id(),
                    )
                    .await?;
                    (first.code.clone(), assignees)
                }
            };

            info!(node = %node, tasks = assignees.len(), "node activated");
            self.emit(WorkflowEvent::TasksCreated {
                record_id: record_id.to_string(),
                node: node.clone(),
                assignees,
            });

            Ok(ActionOutcome {
                rows_affected: rows,
                completed_node: None,
                next_node: Some(node),
                record_status: Some(status),
            })
        }
        .instrument(span)
        .await
    }

    /// Approves the resolved pending task of a record.
    ///
    /// On a configured subject the task's node may complete, which either
    /// activates the next node or, after the last node, sets the record to
    /// `approved`. On an unconfigured subject the record is approved
    /// directly and a closed ad-hoc task is written.
    ///
    /// # Errors
    ///
    /// - [`FlowError::NoActiveNode`] if no node can be resolved
    /// - [`FlowError::NoPendingTask`] if the node has nothing left to approve
    pub async fn approve(
        &self,
        subject_id: &str,
        record_id: &str,
        request: &ActionRequest,
    ) -> Result<ActionOutcome> {
        let span = info_span!("approve", subject = %subject_id, record = %record_id);
        async move {
            self.ensure_record(subject_id, record_id).await?;
            let _permit = self.gate.acquire(subject_id, record_id).await;

            let result = match self.load_routing(subject_id).await? {
                Routing::Unconfigured => {
                    self.close_unconfigured(subject_id, record_id, request, TaskAction::Approve)
                        .await
                }
                Routing::Configured(config) => {
                    self.approve_configured(subject_id, record_id, &config, request)
                        .await
                }
            };
            warn_if_not_applicable(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn approve_configured(
        &self,
        subject_id: &str,
        record_id: &str,
        config: &WorkflowConfig,
        request: &ActionRequest,
    ) -> Result<ActionOutcome> {
        let tasks = self.tasks.as_ref();
        let operator = request.operator_id();

        let node = resolve::active_node(tasks, config, record_id, request).await?;
        let task_id = resolve::target_task(tasks, record_id, node, request).await?;
        let completion =
            resolve::approve_task(tasks, node, task_id, request.comment.as_deref()).await?;

        self.emit(WorkflowEvent::TaskCompleted {
            record_id: record_id.to_string(),
            node: node.code.clone(),
            task_id,
            action: TaskAction::Approve,
        });
        if completion.cancelled > 0 {
            debug!(node = %node.code, count = completion.cancelled, "cancelled sibling tasks");
            self.emit(WorkflowEvent::TasksCancelled {
                record_id: record_id.to_string(),
                node: Some(node.code.clone()),
                count: completion.cancelled,
            });
        }

        self.records
            .touch_record(record_id, subject_id, operator)
            .await?;

        let mut outcome = ActionOutcome {
            rows_affected: 1,
            ..Default::default()
        };

        if !completion.complete {
            debug!(node = %node.code, task_id, "task approved, node still waiting");
            return Ok(outcome);
        }

        info!(node = %node.code, mode = node.mode.as_str(), "node completed");
        self.emit(WorkflowEvent::NodeCompleted {
            record_id: record_id.to_string(),
            node: node.code.clone(),
        });
        outcome.completed_node = Some(node.code.clone());

        match config.next_node(&node.code) {
            Some(next) => {
                let assignees =
                    resolve::create_tasks(tasks, subject_id, record_id, next, None).await?;
                info!(node = %next.code, tasks = assignees.len(), "node activated");
                self.emit(WorkflowEvent::TasksCreated {
                    record_id: record_id.to_string(),
                    node: next.code.clone(),
                    assignees,
                });
                outcome.next_node = Some(next.code.clone());
            }
            None => {
                let status = RecordStatus::Approved;
                self.records
                    .update_record_status(record_id, subject_id, &status, operator)
                    .await?;
                info!(%status, "routing finished");
                self.emit(WorkflowEvent::RecordStatusChanged {
                    record_id: record_id.to_string(),
                    status: status.clone(),
                });
                outcome.record_status = Some(status);
            }
        }

        Ok(outcome)
    }

    /// Rejects the record at its resolved pending task.
    ///
    /// Every other pending task of the record, at every node, is cancelled
    /// and the record becomes `rejected`.
    ///
    /// # Errors
    ///
    /// Same resolution errors as [`approve`](Self::approve).
    pub async fn reject(
        &self,
        subject_id: &str,
        record_id: &str,
        request: &ActionRequest,
    ) -> Result<ActionOutcome> {
        let span = info_span!("reject", subject = %subject_id, record = %record_id);
        async move {
            self.ensure_record(subject_id, record_id).await?;
            let _permit = self.gate.acquire(subject_id, record_id).await;

            let result = match self.load_routing(subject_id).await? {
                Routing::Unconfigured => {
                    self.close_unconfigured(subject_id, record_id, request, TaskAction::Reject)
                        .await
                }
                Routing::Configured(config) => {
                    self.reject_configured(subject_id, record_id, &config, request)
                        .await
                }
            };
            warn_if_not_applicable(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn reject_configured(
        &self,
        subject_id: &str,
        record_id: &str,
        config: &WorkflowConfig,
        request: &ActionRequest,
    ) -> Result<ActionOutcome> {
        let tasks = self.tasks.as_ref();

        let node = resolve::active_node(tasks, config, record_id, request).await?;
        let task_id = resolve::target_task(tasks, record_id, node, request).await?;

        let changed = tasks
            .update_task(
                task_id,
                TaskStatus::Done,
                TaskAction::Reject,
                request.comment.as_deref(),
            )
            .await?;
        if changed == 0 {
            return Err(FlowError::NoPendingTask);
        }
        self.emit(WorkflowEvent::TaskCompleted {
            record_id: record_id.to_string(),
            node: node.code.clone(),
            task_id,
            action: TaskAction::Reject,
        });

        let cancelled = tasks.cancel_all_pending_tasks(record_id).await?;
        if cancelled > 0 {
            debug!(count = cancelled, "cancelled remaining tasks");
            self.emit(WorkflowEvent::TasksCancelled {
                record_id: record_id.to_string(),
                node: None,
                count: cancelled,
            });
        }

        let status = RecordStatus::Rejected;
        let rows = self
            .records
            .update_record_status(record_id, subject_id, &status, request.operator_id())
            .await?;
        info!(node = %node.code, %status, "record rejected");
        self.emit(WorkflowEvent::RecordStatusChanged {
            record_id: record_id.to_string(),
            status: status.clone(),
        });

        Ok(ActionOutcome {
            rows_affected: rows,
            completed_node: None,
            next_node: None,
            record_status: Some(status),
        })
    }

    /// Approve or reject on a subject without routing: set the terminal
    /// status and write one closed ad-hoc task.
    async fn close_unconfigured(
        &self,
        subject_id: &str,
        record_id: &str,
        request: &ActionRequest,
        action: TaskAction,
    ) -> Result<ActionOutcome> {
        let (status, default_node) = match action {
            TaskAction::Reject => (RecordStatus::Rejected, &self.settings.reject_node),
            _ => (RecordStatus::Approved, &self.settings.approve_node),
        };

        let rows = self
            .records
            .update_record_status(record_id, subject_id, &status, request.operator_id())
            .await?;

        let node = request.node_hint().unwrap_or(default_node).to_string();
        let task_id = self
            .tasks
            .insert_task(
                &NewTask::closed(
                    record_id,
                    subject_id,
                    node.as_str(),
                    request.assignee_id().map(str::to_string),
                    action,
                )
                .with_comment(request.comment.clone()),
            )
            .await?;

        info!(node = %node, %status, "record closed without routing");
        self.emit(WorkflowEvent::TaskCompleted {
            record_id: record_id.to_string(),
            node,
            task_id,
            action,
        });
        self.emit(WorkflowEvent::RecordStatusChanged {
            record_id: record_id.to_string(),
            status: status.clone(),
        });

        Ok(ActionOutcome {
            rows_affected: rows,
            completed_node: None,
            next_node: None,
            record_status: Some(status),
        })
    }

    /// Lists tasks for an inbox, newest first.
    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        self.tasks.list_tasks(query).await
    }

    /// Returns a snapshot of where a record is in its routing.
    pub async fn progress(&self, subject_id: &str, record_id: &str) -> Result<RoutingProgress> {
        self.ensure_subject(subject_id).await?;
        if record_id.trim().is_empty() {
            return Err(FlowError::MissingIdentifier("record"));
        }
        let record = self
            .records
            .get_record(record_id, subject_id)
            .await?
            .ok_or_else(|| FlowError::RecordNotFound(record_id.to_string()))?;

        let config = match self.load_routing(subject_id).await? {
            Routing::Configured(config) => Some(config),
            Routing::Unconfigured => None,
        };
        let tasks = self.tasks.record_tasks(record_id).await?;

        Ok(RoutingProgress::from_tasks(&record, config.as_ref(), tasks))
    }
}

fn warn_if_not_applicable<T>(result: &Result<T>) {
    if let Err(e) = result {
        if e.kind() == ErrorKind::Resolution {
            warn!(error = %e, "action does not apply to record");
        }
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`WorkflowEngine`].
#[derive(Default)]
pub struct WorkflowEngineBuilder {
    configs: Option<Arc<dyn ConfigStore>>,
    tasks: Option<Arc<dyn TaskStore>>,
    records: Option<Arc<dyn RecordStore>>,
    settings: EngineSettings,
}

impl WorkflowEngineBuilder {
    /// Creates a new empty builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses one backend for configs, tasks and records.
    pub fn store<S: WorkflowStore + 'static>(mut self, store: S) -> Self {
        let shared = Arc::new(store);
        self.configs = Some(Arc::clone(&shared) as Arc<dyn ConfigStore>);
        self.tasks = Some(Arc::clone(&shared) as Arc<dyn TaskStore>);
        self.records = Some(shared as Arc<dyn RecordStore>);
        self
    }

    /// Sets the config store.
    pub fn config_store(mut self, store: impl ConfigStore + 'static) -> Self {
        self.configs = Some(Arc::new(store));
        self
    }

    /// Sets the task store.
    pub fn task_store(mut self, store: impl TaskStore + 'static) -> Self {
        self.tasks = Some(Arc::new(store));
        self
    }

    /// Sets the record store.
    pub fn record_store(mut self, store: impl RecordStore + 'static) -> Self {
        self.records = Some(Arc::new(store));
        self
    }

    /// Replaces the settings.
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// [`FlowError::InvalidEngine`] if a store is missing or the settings
    /// fail validation.
    pub fn build(self) -> Result<WorkflowEngine> {
        self.settings.validate()?;

        let configs = self
            .configs
            .ok_or_else(|| FlowError::InvalidEngine("config store required".to_string()))?;
        let tasks = self
            .tasks
            .ok_or_else(|| FlowError::InvalidEngine("task store required".to_string()))?;
        let records = self
            .records
            .ok_or_else(|| FlowError::InvalidEngine("record store required".to_string()))?;

        let (event_tx, _) = broadcast::channel(self.settings.event_capacity);

        Ok(WorkflowEngine {
            configs,
            tasks,
            records,
            settings: self.settings,
            gate: RecordGate::new(),
            event_tx,
        })
    }
}

impl std::fmt::Debug for WorkflowEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngineBuilder")
            .field("has_config_store", &self.configs.is_some())
            .field("has_task_store", &self.tasks.is_some())
            .field("has_record_store", &self.records.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}
