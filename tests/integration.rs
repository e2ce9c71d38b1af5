//! Integration tests for the formflow routing engine.
//!
//! These tests drive complete routings through the public API:
//! - Multi-node chains under `all` and `any` completion
//! - Rejection and cancellation across the whole record
//! - The unconfigured (ad-hoc task) path
//! - Concurrent approvals on one record
//! - Event streaming and progress reporting
//! - Store persistence (Memory and SQLite)

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Barrier;

use formflow::{
    ActionRequest, ErrorKind, FlowError, MemoryStore, NewTask, NodeCompletion, NodeMode,
    NodeState, Record, RecordStatus, RecordStore, Result, Task, TaskAction, TaskQuery, TaskStatus,
    TaskStore, WorkflowConfig, WorkflowEngine, WorkflowEvent, WorkflowNode,
};

/// The manager-then-director chain used throughout.
fn leave_chain() -> WorkflowConfig {
    WorkflowConfig::from_json(serde_json::json!({
        "nodes": [
            {"code": "mgr", "assignees": ["alice", "bob"], "mode": "all"},
            {"code": "dir", "assignees": ["carol"], "mode": "all"}
        ]
    }))
    .unwrap()
}

async fn engine_with(config: Option<WorkflowConfig>) -> (WorkflowEngine, MemoryStore) {
    let store = MemoryStore::new();
    store.insert_record(Record::draft("rec-1", "leave")).await;
    let engine = WorkflowEngine::builder()
        .store(store.clone())
        .build()
        .unwrap();
    if let Some(config) = config {
        engine.save_config("leave", None, &config).await.unwrap();
    }
    (engine, store)
}

fn by(operator: &str) -> ActionRequest {
    ActionRequest::new().operator(operator)
}

async fn record_status(store: &dyn RecordStore) -> RecordStatus {
    store
        .get_record("rec-1", "leave")
        .await
        .unwrap()
        .unwrap()
        .status
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn test_manager_director_chain_with_memory_store() {
    let (engine, store) = engine_with(Some(leave_chain())).await;

    engine
        .submit("leave", "rec-1", &by("dave"))
        .await
        .unwrap();
    assert_eq!(record_status(&store).await, RecordStatus::Submitted);
    assert_eq!(
        store.find_pending_tasks("rec-1", "mgr").await.unwrap().len(),
        2
    );

    let outcome = engine
        .approve("leave", "rec-1", &by("alice"))
        .await
        .unwrap();
    assert!(outcome.completed_node.is_none());
    assert_eq!(record_status(&store).await, RecordStatus::Submitted);
    assert!(store
        .find_pending_task("rec-1", "mgr", "bob")
        .await
        .unwrap()
        .is_some());

    let outcome = engine.approve("leave", "rec-1", &by("bob")).await.unwrap();
    assert_eq!(outcome.completed_node.as_deref(), Some("mgr"));
    assert_eq!(outcome.next_node.as_deref(), Some("dir"));
    assert!(store
        .find_pending_task("rec-1", "dir", "carol")
        .await
        .unwrap()
        .is_some());

    let outcome = engine
        .approve("leave", "rec-1", &by("carol"))
        .await
        .unwrap();
    assert_eq!(outcome.record_status, Some(RecordStatus::Approved));
    assert_eq!(record_status(&store).await, RecordStatus::Approved);

    let tasks = store.record_tasks("rec-1").await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.action == TaskAction::Approve));

    let record = store.get_record("rec-1", "leave").await.unwrap().unwrap();
    assert_eq!(record.updated_by.as_deref(), Some("carol"));
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_manager_director_chain_with_sqlite_store() {
    use formflow::SqliteStore;

    let store = SqliteStore::open_in_memory().await.unwrap();
    store
        .insert_record(Record::draft("rec-1", "leave"))
        .await
        .unwrap();

    let engine = WorkflowEngine::builder()
        .store(store.clone())
        .build()
        .unwrap();
    engine.save_config("leave", Some("Leave"), &leave_chain()).await.unwrap();

    engine.submit("leave", "rec-1", &by("dave")).await.unwrap();
    engine.approve("leave", "rec-1", &by("alice")).await.unwrap();
    assert_eq!(record_status(&store).await, RecordStatus::Submitted);

    engine.approve("leave", "rec-1", &by("bob")).await.unwrap();
    engine.approve("leave", "rec-1", &by("carol")).await.unwrap();
    assert_eq!(record_status(&store).await, RecordStatus::Approved);

    let inbox = engine
        .list_tasks(&TaskQuery::all().assignee("carol"))
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].node_code, "dir");
    assert_eq!(inbox[0].status, TaskStatus::Done);

    let entry = engine.get_config("leave").await.unwrap();
    assert_eq!(entry.config, leave_chain());
}

#[tokio::test]
async fn test_submit_activates_only_first_node() {
    let config = WorkflowConfig::new(vec![
        WorkflowNode::new("review").with_assignees(["alice", "bob"]),
        WorkflowNode::new("publish").with_assignees(["carol"]),
    ]);
    let (engine, store) = engine_with(Some(config)).await;

    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();

    let tasks = store.record_tasks("rec-1").await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.node_code == "review"));
}

#[tokio::test]
async fn test_all_mode_waits_for_every_assignee() {
    let config = WorkflowConfig::new(vec![
        WorkflowNode::new("panel").with_assignees(["a1", "a2", "a3", "a4"])
    ]);
    let (engine, store) = engine_with(Some(config)).await;
    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();

    for who in ["a1", "a2", "a3"] {
        engine.approve("leave", "rec-1", &by(who)).await.unwrap();
        assert_eq!(record_status(&store).await, RecordStatus::Submitted);
    }
    assert_eq!(store.count_pending_tasks("rec-1", "panel").await.unwrap(), 1);

    let last = engine.approve("leave", "rec-1", &by("a4")).await.unwrap();
    assert_eq!(last.completed_node.as_deref(), Some("panel"));
    assert_eq!(record_status(&store).await, RecordStatus::Approved);
}

#[tokio::test]
async fn test_any_mode_first_approval_advances() {
    let config = WorkflowConfig::new(vec![
        WorkflowNode::new("mgr")
            .with_assignees(["alice", "bob", "erin"])
            .with_mode(NodeMode::Any),
        WorkflowNode::new("dir").with_assignees(["carol"]),
    ]);
    let (engine, store) = engine_with(Some(config)).await;
    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();

    let mut events = engine.subscribe();
    let outcome = engine.approve("leave", "rec-1", &by("erin")).await.unwrap();
    assert_eq!(outcome.completed_node.as_deref(), Some("mgr"));
    assert_eq!(outcome.next_node.as_deref(), Some("dir"));

    let mgr: Vec<Task> = store
        .record_tasks("rec-1")
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.node_code == "mgr")
        .collect();
    let cancelled = mgr
        .iter()
        .filter(|t| t.action == TaskAction::Cancelled)
        .count();
    assert_eq!(cancelled, 2);
    assert!(mgr.iter().all(|t| t.status == TaskStatus::Done));

    let events = drain(&mut events);
    assert!(events.contains(&WorkflowEvent::TasksCancelled {
        record_id: "rec-1".to_string(),
        node: Some("mgr".to_string()),
        count: 2,
    }));
}

#[tokio::test]
async fn test_mode_is_case_insensitive() {
    let config = WorkflowConfig::from_json(serde_json::json!({
        "nodes": [{"code": "mgr", "assignees": ["alice", "bob"], "mode": "ANY"}]
    }))
    .unwrap();
    let (engine, store) = engine_with(Some(config)).await;
    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();

    engine.approve("leave", "rec-1", &by("alice")).await.unwrap();
    assert_eq!(record_status(&store).await, RecordStatus::Approved);
}

#[tokio::test]
async fn test_reject_cancels_tasks_at_every_node() {
    let (engine, store) = engine_with(Some(leave_chain())).await;
    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();

    // A stray task at a later node must be swept too.
    store
        .insert_task(&NewTask::pending("rec-1", "leave", "dir", Some("carol".into())))
        .await
        .unwrap();

    let outcome = engine
        .reject("leave", "rec-1", &by("bob").comment("missing receipt"))
        .await
        .unwrap();
    assert_eq!(outcome.record_status, Some(RecordStatus::Rejected));
    assert_eq!(record_status(&store).await, RecordStatus::Rejected);

    let tasks = store.record_tasks("rec-1").await.unwrap();
    assert!(tasks.iter().all(|t| !t.is_pending()));
    let rejected: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.action == TaskAction::Reject)
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].assignee.as_deref(), Some("bob"));
    assert_eq!(
        tasks
            .iter()
            .filter(|t| t.action == TaskAction::Cancelled)
            .count(),
        2
    );

    let err = engine
        .approve("leave", "rec-1", &by("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NoActiveNode));
}

#[tokio::test]
async fn test_unconfigured_subject_path() {
    let (engine, store) = engine_with(None).await;

    let outcome = engine
        .submit(
            "leave",
            "rec-1",
            &ActionRequest::new().assignee("erin").comment("please"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(record_status(&store).await, RecordStatus::Submitted);

    let tasks = store.record_tasks("rec-1").await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].node_code, "submit");
    assert_eq!(tasks[0].assignee.as_deref(), Some("erin"));
    assert!(tasks[0].is_pending());

    let outcome = engine
        .approve("leave", "rec-1", &by("erin").assignee("erin"))
        .await
        .unwrap();
    assert_eq!(outcome.record_status, Some(RecordStatus::Approved));

    let tasks = store.record_tasks("rec-1").await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[1].node_code, "approve");
    assert_eq!(tasks[1].status, TaskStatus::Done);
    assert_eq!(tasks[1].action, TaskAction::Approve);
}

#[tokio::test]
async fn test_unconfigured_reject_uses_node_hint() {
    let (engine, store) = engine_with(None).await;

    engine
        .reject("leave", "rec-1", &by("erin").node("legal"))
        .await
        .unwrap();

    let tasks = store.record_tasks("rec-1").await.unwrap();
    assert_eq!(tasks[0].node_code, "legal");
    assert_eq!(tasks[0].action, TaskAction::Reject);
    assert_eq!(record_status(&store).await, RecordStatus::Rejected);
}

#[tokio::test]
async fn test_second_approval_of_same_task_fails() {
    let (engine, store) = engine_with(Some(leave_chain())).await;
    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();
    engine.approve("leave", "rec-1", &by("alice")).await.unwrap();
    engine.approve("leave", "rec-1", &by("bob")).await.unwrap();

    let request = by("carol").node("mgr");
    let err = engine.approve("leave", "rec-1", &request).await.unwrap_err();
    assert!(matches!(err, FlowError::NoPendingTask));
    assert_eq!(err.kind(), ErrorKind::Resolution);

    // The failed call changed nothing.
    assert_eq!(store.count_pending_tasks("rec-1", "dir").await.unwrap(), 1);
    assert_eq!(record_status(&store).await, RecordStatus::Submitted);
}

#[tokio::test]
async fn test_concurrent_any_approvals_advance_once() {
    let config = WorkflowConfig::new(vec![
        WorkflowNode::new("mgr")
            .with_assignees(["alice", "bob"])
            .with_mode(NodeMode::Any),
        WorkflowNode::new("dir").with_assignees(["carol"]),
    ]);
    let (engine, store) = engine_with(Some(config)).await;
    let engine = Arc::new(engine);
    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();

    let handles: Vec<_> = ["alice", "bob"]
        .into_iter()
        .map(|who| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .approve("leave", "rec-1", &by(who).node("mgr"))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, FlowError::NoPendingTask)),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(store.find_pending_tasks("rec-1", "dir").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_records_route_independently() {
    let (engine, store) = engine_with(Some(leave_chain())).await;
    store.insert_record(Record::draft("rec-2", "leave")).await;

    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();
    engine.submit("leave", "rec-2", &ActionRequest::new()).await.unwrap();

    engine.reject("leave", "rec-2", &by("alice")).await.unwrap();

    assert_eq!(store.count_pending_tasks("rec-1", "mgr").await.unwrap(), 2);
    assert_eq!(record_status(&store).await, RecordStatus::Submitted);
}

#[tokio::test]
async fn test_task_inbox() {
    let (engine, store) = engine_with(Some(leave_chain())).await;
    store.register_subject("expense").await;
    store.insert_record(Record::draft("exp-1", "expense")).await;
    engine
        .save_config(
            "expense",
            None,
            &WorkflowConfig::new(vec![WorkflowNode::new("fin").with_assignees(["alice"])]),
        )
        .await
        .unwrap();

    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();
    engine.submit("expense", "exp-1", &ActionRequest::new()).await.unwrap();

    let alice = engine
        .list_tasks(&TaskQuery::all().assignee("alice"))
        .await
        .unwrap();
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].subject_id, "expense");

    let leave_only = engine
        .list_tasks(&TaskQuery::all().assignee("alice").subject("leave"))
        .await
        .unwrap();
    assert_eq!(leave_only.len(), 1);

    let everything = engine.list_tasks(&TaskQuery::all()).await.unwrap();
    assert_eq!(everything.len(), 3);
}

#[tokio::test]
async fn test_event_streaming() {
    let (engine, _store) = engine_with(Some(leave_chain())).await;
    let mut events = engine.subscribe();

    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();
    for who in ["alice", "bob", "carol"] {
        engine.approve("leave", "rec-1", &by(who)).await.unwrap();
    }

    let events = drain(&mut events);
    assert!(events.iter().all(|e| e.record_id() == "rec-1"));

    let completed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::NodeCompleted { node, .. } => Some(node.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec!["mgr", "dir"]);

    assert!(events.last().is_some_and(|e| e.is_terminal()));
}

#[tokio::test]
async fn test_progress_display() {
    let (engine, _store) = engine_with(Some(leave_chain())).await;
    engine.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();
    engine
        .approve("leave", "rec-1", &by("alice").comment("fine by me"))
        .await
        .unwrap();

    let progress = engine.progress("leave", "rec-1").await.unwrap();
    assert_eq!(progress.node("mgr").unwrap().state, NodeState::Active);
    assert_eq!(progress.node("dir").unwrap().state, NodeState::Waiting);

    let display = progress.to_string();
    assert!(display.contains("rec-1"));
    assert!(display.contains("fine by me"));
    assert!(display.contains("Progress: 0%"));
}

/// A task store that delegates to a [`MemoryStore`], optionally failing
/// inserts or holding every approval at a shared barrier.
#[derive(Clone)]
struct HookedTasks {
    inner: MemoryStore,
    broken_inserts: bool,
    approve_barrier: Option<Arc<Barrier>>,
}

impl HookedTasks {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            broken_inserts: false,
            approve_barrier: None,
        }
    }

    fn broken_inserts(mut self) -> Self {
        self.broken_inserts = true;
        self
    }

    fn approve_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.approve_barrier = Some(barrier);
        self
    }
}

#[async_trait]
impl TaskStore for HookedTasks {
    async fn insert_task(&self, task: &NewTask) -> Result<i64> {
        if self.broken_inserts {
            return Err(FlowError::Store("disk full".to_string()));
        }
        self.inner.insert_task(task).await
    }
    async fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        self.inner.get_task(task_id).await
    }
    async fn find_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<Vec<i64>> {
        self.inner.find_pending_tasks(record_id, node_code).await
    }
    async fn find_pending_task(
        &self,
        record_id: &str,
        node_code: &str,
        assignee: &str,
    ) -> Result<Option<i64>> {
        self.inner.find_pending_task(record_id, node_code, assignee).await
    }
    async fn find_pending_task_by_assignee(
        &self,
        record_id: &str,
        assignee: &str,
    ) -> Result<Option<i64>> {
        self.inner.find_pending_task_by_assignee(record_id, assignee).await
    }
    async fn get_task_node_code(&self, task_id: i64) -> Result<Option<String>> {
        self.inner.get_task_node_code(task_id).await
    }
    async fn update_task(
        &self,
        task_id: i64,
        status: TaskStatus,
        action: TaskAction,
        comment: Option<&str>,
    ) -> Result<u64> {
        self.inner.update_task(task_id, status, action, comment).await
    }
    async fn approve_task(
        &self,
        task_id: i64,
        mode: NodeMode,
        comment: Option<&str>,
    ) -> Result<Option<NodeCompletion>> {
        if let Some(barrier) = &self.approve_barrier {
            barrier.wait().await;
        }
        self.inner.approve_task(task_id, mode, comment).await
    }
    async fn cancel_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<u64> {
        self.inner.cancel_pending_tasks(record_id, node_code).await
    }
    async fn cancel_all_pending_tasks(&self, record_id: &str) -> Result<u64> {
        self.inner.cancel_all_pending_tasks(record_id).await
    }
    async fn count_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<u64> {
        self.inner.count_pending_tasks(record_id, node_code).await
    }
    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        self.inner.list_tasks(query).await
    }
    async fn record_tasks(&self, record_id: &str) -> Result<Vec<Task>> {
        self.inner.record_tasks(record_id).await
    }
}

fn engine_over(store: &MemoryStore, tasks: HookedTasks) -> WorkflowEngine {
    WorkflowEngine::builder()
        .config_store(store.clone())
        .record_store(store.clone())
        .task_store(tasks)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_two_engines_over_one_store_advance_once() {
    for mode in [NodeMode::Any, NodeMode::All] {
        let store = MemoryStore::new();
        store.insert_record(Record::draft("rec-1", "leave")).await;
        let barrier = Arc::new(Barrier::new(2));
        let tasks = HookedTasks::new(store.clone()).approve_barrier(Arc::clone(&barrier));

        let first = engine_over(&store, tasks.clone());
        let second = engine_over(&store, tasks);
        let config = WorkflowConfig::new(vec![
            WorkflowNode::new("mgr")
                .with_assignees(["alice", "bob"])
                .with_mode(mode),
            WorkflowNode::new("dir").with_assignees(["carol"]),
        ]);
        first.save_config("leave", None, &config).await.unwrap();
        first.submit("leave", "rec-1", &ActionRequest::new()).await.unwrap();

        // Both approvers resolve their own task before either closes it.
        let (by_alice, by_bob) = (by("alice"), by("bob"));
        let (a, b) = tokio::join!(
            first.approve("leave", "rec-1", &by_alice),
            second.approve("leave", "rec-1", &by_bob),
        );

        let completed = [&a, &b]
            .into_iter()
            .filter(|r| matches!(r, Ok(outcome) if outcome.completed_node.is_some()))
            .count();
        assert_eq!(completed, 1, "mode {:?}", mode);
        assert_eq!(
            store.count_pending_tasks("rec-1", "dir").await.unwrap(),
            1,
            "mode {:?}",
            mode
        );

        match mode {
            NodeMode::Any => {
                let err = [a, b].into_iter().find_map(|r| r.err()).unwrap();
                assert!(matches!(err, FlowError::NoPendingTask));
            }
            NodeMode::All => assert!(a.is_ok() && b.is_ok()),
        }
    }
}

#[tokio::test]
async fn test_store_failures_propagate() {
    let store = MemoryStore::new();
    store.insert_record(Record::draft("rec-1", "leave")).await;

    let engine = WorkflowEngine::builder()
        .config_store(store.clone())
        .record_store(store.clone())
        .task_store(HookedTasks::new(store.clone()).broken_inserts())
        .build()
        .unwrap();

    let err = engine
        .submit("leave", "rec-1", &ActionRequest::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(!err.is_user_error());
    assert_eq!(err.to_string(), "Store error: disk full");
}
