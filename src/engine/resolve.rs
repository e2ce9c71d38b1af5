//! Node and task resolution, fan-out and completion checks.
//!
//! Every function here re-reads the task store; nothing is cached between
//! calls.

use tracing::debug;

use super::ActionRequest;
use crate::{FlowError, NewTask, NodeCompletion, Result, TaskStore, WorkflowConfig, WorkflowNode};

/// Finds the node an approve or reject applies to.
///
/// In order: the request's node hint, the node of the operator's own
/// pending task, then the first node in config order that has any pending
/// task. A hint or operator task naming a node outside the config resolves
/// to nothing.
pub(crate) async fn active_node<'c>(
    tasks: &dyn TaskStore,
    config: &'c WorkflowConfig,
    record_id: &str,
    request: &ActionRequest,
) -> Result<&'c WorkflowNode> {
    let mut code = request.node_hint().map(str::to_string);

    if code.is_none() {
        if let Some(operator) = request.operator_id() {
            if let Some(task_id) = tasks.find_pending_task_by_assignee(record_id, operator).await? {
                code = tasks.get_task_node_code(task_id).await?;
                debug!(operator, task_id, node = ?code, "resolved node from operator task");
            }
        }
    }

    if code.is_none() {
        for node in &config.nodes {
            if tasks.count_pending_tasks(record_id, &node.code).await? > 0 {
                debug!(node = %node.code, "resolved first node with pending tasks");
                code = Some(node.code.clone());
                break;
            }
        }
    }

    code.as_deref()
        .and_then(|c| config.find_node(c))
        .ok_or(FlowError::NoActiveNode)
}

/// Picks the pending task to close at `node`.
///
/// Prefers the task of the operator (or, without one, of the request's
/// assignee) and otherwise takes the first pending task the store returns.
pub(crate) async fn target_task(
    tasks: &dyn TaskStore,
    record_id: &str,
    node: &WorkflowNode,
    request: &ActionRequest,
) -> Result<i64> {
    if let Some(candidate) = request.acting_assignee() {
        if let Some(id) = tasks.find_pending_task(record_id, &node.code, candidate).await? {
            debug!(task_id = id, assignee = candidate, "resolved task by assignee");
            return Ok(id);
        }
    }

    let first = tasks
        .find_pending_tasks(record_id, &node.code)
        .await?
        .into_iter()
        .next();

    match first {
        Some(id) => {
            debug!(task_id = id, "resolved first pending task at node");
            Ok(id)
        }
        None => Err(FlowError::NoPendingTask),
    }
}

/// Creates the pending tasks of a node that just became active.
///
/// One task per distinct non-blank assignee; a node without assignees gets
/// a single task for `fallback_assignee`, or an unassigned one.
///
/// # Returns
///
/// The assignee of each created task, in creation order.
pub(crate) async fn create_tasks(
    tasks: &dyn TaskStore,
    subject_id: &str,
    record_id: &str,
    node: &WorkflowNode,
    fallback_assignee: Option<&str>,
) -> Result<Vec<Option<String>>> {
    let mut assignees: Vec<Option<String>> = node
        .fan_out_assignees()
        .into_iter()
        .map(|a| Some(a.to_string()))
        .collect();

    if assignees.is_empty() {
        let fallback = fallback_assignee
            .filter(|a| !a.trim().is_empty())
            .map(str::to_string);
        assignees.push(fallback);
    }

    for assignee in &assignees {
        tasks
            .insert_task(&NewTask::pending(
                record_id,
                subject_id,
                node.code.as_str(),
                assignee.clone(),
            ))
            .await?;
    }

    debug!(node = %node.code, count = assignees.len(), "created node tasks");
    Ok(assignees)
}

/// Approves `task_id` and applies the node's completion rule.
///
/// The store closes the task and settles the node in one atomic call, so
/// concurrent approvers at the same node (through this engine or another one
/// over the same store) see exactly one completion. Fails with
/// [`FlowError::NoPendingTask`] when the task was closed in the meantime.
pub(crate) async fn approve_task(
    tasks: &dyn TaskStore,
    node: &WorkflowNode,
    task_id: i64,
    comment: Option<&str>,
) -> Result<NodeCompletion> {
    let completion = tasks
        .approve_task(task_id, node.mode, comment)
        .await?
        .ok_or(FlowError::NoPendingTask)?;

    debug!(
        node = %node.code,
        complete = completion.complete,
        cancelled = completion.cancelled,
        "task approved"
    );
    Ok(completion)
}
