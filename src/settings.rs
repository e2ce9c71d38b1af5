//! Engine settings.
//!
//! The engine is configured with a small serde struct. Every field has a
//! default, so an empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::{FlowError, Result};

/// Default capacity for the event broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Tunables for [`WorkflowEngine`](crate::WorkflowEngine).
///
/// The node codes name the single task written by actions on an
/// unconfigured subject when the caller gives no node hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Node code for the unconfigured submit task.
    pub submit_node: String,
    /// Node code for the unconfigured approve task.
    pub approve_node: String,
    /// Node code for the unconfigured reject task.
    pub reject_node: String,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            submit_node: "submit".to_string(),
            approve_node: "approve".to_string(),
            reject_node: "reject".to_string(),
            event_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineSettings {
    /// Parses settings from a JSON document and validates them.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that node codes are non-blank and the channel has capacity.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("submit_node", &self.submit_node),
            ("approve_node", &self.approve_node),
            ("reject_node", &self.reject_node),
        ] {
            if value.trim().is_empty() {
                return Err(FlowError::InvalidEngine(format!("{} must not be blank", field)));
            }
        }

        if self.event_capacity == 0 {
            return Err(FlowError::InvalidEngine(
                "event_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
