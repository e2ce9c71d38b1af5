//! Workflow configuration types.
//!
//! A [`WorkflowConfig`] is the ordered list of approval nodes owned by one
//! subject. Configs are checked with [`WorkflowConfig::validate`] when they
//! are saved and trusted afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

use crate::{FlowError, Result};

/// Completion policy for a node with several assignees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Every fan-out task must be approved.
    #[default]
    All,
    /// The first approval completes the node and cancels the rest.
    Any,
}

impl NodeMode {
    /// Parses a mode leniently: `any` in any case selects [`NodeMode::Any`],
    /// everything else (including blank) falls back to [`NodeMode::All`].
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("any") {
            Self::Any
        } else {
            Self::All
        }
    }

    /// Returns the lowercase name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }
}

impl<'de> Deserialize<'de> for NodeMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Self::parse(&s)).unwrap_or_default())
    }
}

/// One approval step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Identifier, unique within its config.
    #[serde(default)]
    pub code: String,

    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Subjects that receive a task when the node becomes active.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub assignees: Vec<String>,

    /// Completion policy.
    #[serde(default)]
    pub mode: NodeMode,
}

impl WorkflowNode {
    /// Creates a node in `all` mode with no assignees.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            assignees: Vec::new(),
            mode: NodeMode::All,
        }
    }

    /// Sets the assignees.
    pub fn with_assignees<I, S>(mut self, assignees: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assignees = assignees.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the completion mode.
    pub fn with_mode(mut self, mode: NodeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the display label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the assignees in config order with blanks and repeats removed.
    pub fn fan_out_assignees(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.assignees
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty() && seen.insert(*a))
            .collect()
    }
}

/// The ordered node list owned by a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Approval nodes in routing order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nodes: Vec<WorkflowNode>,
}

impl WorkflowConfig {
    /// Creates a config from nodes.
    pub fn new(nodes: Vec<WorkflowNode>) -> Self {
        Self { nodes }
    }

    /// Parses a config from a JSON value as submitted by a client.
    ///
    /// A value of the wrong shape is the caller's mistake and fails with
    /// [`FlowError::InvalidConfig`].
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| FlowError::InvalidConfig(e.to_string()))
    }

    /// Checks that the config can be routed.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidConfig`] when there are no nodes, a node
    /// code is blank, or a node code repeats.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(FlowError::InvalidConfig("workflow nodes required".into()));
        }

        let mut codes = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if node.code.trim().is_empty() {
                return Err(FlowError::InvalidConfig("node code required".into()));
            }
            if !codes.insert(node.code.as_str()) {
                return Err(FlowError::InvalidConfig(format!(
                    "duplicate node code: {}",
                    node.code
                )));
            }
        }

        Ok(())
    }

    /// Returns true if the config has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the first node.
    pub fn first_node(&self) -> Option<&WorkflowNode> {
        self.nodes.first()
    }

    /// Finds a node by code. Blank codes never match.
    pub fn find_node(&self, code: &str) -> Option<&WorkflowNode> {
        if code.trim().is_empty() {
            return None;
        }
        self.nodes.iter().find(|n| n.code == code)
    }

    /// Returns the node positioned right after `code`, if any.
    pub fn next_node(&self, code: &str) -> Option<&WorkflowNode> {
        let index = self.nodes.iter().position(|n| n.code == code)?;
        self.nodes.get(index + 1)
    }
}

/// A persisted configuration together with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Store-assigned identifier.
    pub id: i64,
    /// The owning subject.
    pub subject_id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// The node list.
    pub config: WorkflowConfig,
    /// When the config was last saved.
    pub updated_at: DateTime<Utc>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
