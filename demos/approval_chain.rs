//! Approval chain example.
//!
//! This example demonstrates:
//! - Saving a two-node workflow config for a subject
//! - Submitting records and approving them node by node
//! - `any` mode cancelling sibling tasks
//! - Rejection sweeping every open task
//! - Observing routing events and progress snapshots
//!
//! Run with: `cargo run --example approval_chain`
//! Set `RUST_LOG=formflow=debug` to see resolution decisions.

use formflow::{
    ActionRequest, MemoryStore, NodeMode, Record, Result, TaskQuery, WorkflowConfig,
    WorkflowEngine, WorkflowEvent, WorkflowNode,
};
use tracing_subscriber::EnvFilter;

fn describe(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::Submitted { record_id, .. } => format!("📨 {} submitted", record_id),
        WorkflowEvent::TasksCreated {
            node, assignees, ..
        } => {
            let names: Vec<&str> = assignees
                .iter()
                .map(|a| a.as_deref().unwrap_or("(unassigned)"))
                .collect();
            format!("📋 tasks at '{}' for {}", node, names.join(", "))
        }
        WorkflowEvent::TaskCompleted {
            node,
            task_id,
            action,
            ..
        } => format!("✍️  task #{} at '{}' closed: {}", task_id, node, action),
        WorkflowEvent::TasksCancelled { node, count, .. } => format!(
            "🧹 {} task(s) cancelled at {}",
            count,
            node.as_deref().unwrap_or("every node")
        ),
        WorkflowEvent::NodeCompleted { node, .. } => format!("✅ node '{}' complete", node),
        WorkflowEvent::RecordStatusChanged { record_id, status } => {
            format!("🏷️  {} is now {}", record_id, status)
        }
        other => format!("{:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("formflow=info")),
        )
        .init();

    println!("🏗️  Setting up the leave-request workflow\n");

    let store = MemoryStore::new();
    for id in ["leave-1", "leave-2", "leave-3"] {
        store.insert_record(Record::draft(id, "leave")).await;
    }

    let engine = WorkflowEngine::builder().store(store.clone()).build()?;

    let config = WorkflowConfig::new(vec![
        WorkflowNode::new("mgr")
            .with_name("Line managers")
            .with_assignees(["alice", "bob"]),
        WorkflowNode::new("hr")
            .with_name("HR desk")
            .with_assignees(["carol", "dave"])
            .with_mode(NodeMode::Any),
    ]);
    let config_id = engine.save_config("leave", Some("Leave request"), &config).await?;
    println!("Saved config #{} with {} nodes\n", config_id, config.nodes.len());

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("   {}", describe(&event));
        }
    });

    println!("▶️  leave-1: full approval");
    engine
        .submit("leave", "leave-1", &ActionRequest::new().operator("erin"))
        .await?;
    engine
        .approve("leave", "leave-1", &ActionRequest::new().operator("alice"))
        .await?;
    engine
        .approve("leave", "leave-1", &ActionRequest::new().operator("bob"))
        .await?;
    engine
        .approve(
            "leave",
            "leave-1",
            &ActionRequest::new().operator("dave").comment("enjoy"),
        )
        .await?;

    println!("\n▶️  leave-2: rejected by a manager");
    engine.submit("leave", "leave-2", &ActionRequest::new()).await?;
    engine
        .reject(
            "leave",
            "leave-2",
            &ActionRequest::new().operator("bob").comment("team is short-staffed"),
        )
        .await?;

    println!("\n▶️  leave-3: half way");
    engine.submit("leave", "leave-3", &ActionRequest::new()).await?;
    engine
        .approve("leave", "leave-3", &ActionRequest::new().operator("alice"))
        .await?;

    println!("\n▶️  leave-3: approving at 'hr' before it is active");
    let outcome = engine
        .approve("leave", "leave-3", &ActionRequest::new().operator("alice").node("hr"))
        .await;
    match outcome {
        Ok(_) => println!("   unexpected success"),
        Err(e) => println!("   ⚠️  {}", e),
    }

    // Give the printer a moment to drain.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    drop(engine);
    let _ = printer.await;

    let engine = WorkflowEngine::builder().store(store.clone()).build()?;
    for id in ["leave-1", "leave-2", "leave-3"] {
        println!("\n{}", engine.progress("leave", id).await?);
    }

    let inbox = engine
        .list_tasks(&TaskQuery::all().assignee("bob"))
        .await?;
    println!("📥 bob's inbox:");
    for task in inbox {
        println!(
            "   #{} {} at '{}' ({})",
            task.id, task.record_id, task.node_code, task.action
        );
    }

    Ok(())
}
