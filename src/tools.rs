//! Remote tool invocation lifecycle.
//!
//! DESIGN
//! ======
//! A `tool_use` event creates a [`ToolActivity`] in the running state and
//! appends it to the timeline as a tool entry. The next `tool_result`
//! finalizes that same entry in place. The tracker only remembers the id of
//! the running entry, so at most one activity is running at a time:
//! - a result with nothing running is dropped;
//! - a second `tool_use` while one is running first closes the earlier one
//!   without a result, so no entry is left running forever.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::timeline::{Timeline, local_id};

/// Characters of a shell command shown in a description.
const COMMAND_PREVIEW_CHARS: usize = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Complete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolActivity {
    pub id: String,
    pub tool: String,
    pub input: Map<String, Value>,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolActivity {
    #[must_use]
    pub fn new(tool: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            id: local_id(),
            tool: tool.into(),
            input,
            status: ToolStatus::Running,
            result: None,
            is_error: None,
        }
    }

    /// One-line summary for display, phrased by status.
    #[must_use]
    pub fn describe(&self) -> String {
        let path = self.input_str("file_path").unwrap_or_else(|| "file".to_owned());
        let pattern = self.input_str("pattern").unwrap_or_default();
        let command = self.input_str("command").unwrap_or_default();
        let preview: String = command.chars().take(COMMAND_PREVIEW_CHARS).collect();
        let clipped = command.chars().count() > COMMAND_PREVIEW_CHARS;

        match (self.status, self.tool.as_str()) {
            (ToolStatus::Running, "Read") => format!("Reading {path}..."),
            (ToolStatus::Running, "Bash") => format!("Running: {preview}..."),
            (ToolStatus::Running, "Edit") => format!("Editing {path}..."),
            (ToolStatus::Running, "Write") => format!("Writing {path}..."),
            (ToolStatus::Running, "Glob") => format!("Searching: {pattern}..."),
            (ToolStatus::Running, "Grep") => format!("Searching for: {pattern}..."),
            (ToolStatus::Running, tool) => format!("{tool}..."),
            (ToolStatus::Complete, "Read") => format!("Read {path}"),
            (ToolStatus::Complete, "Bash") => {
                format!("Ran: {preview}{}", if clipped { "..." } else { "" })
            }
            (ToolStatus::Complete, "Edit") => format!("Edited {path}"),
            (ToolStatus::Complete, "Write") => format!("Wrote {path}"),
            (ToolStatus::Complete, "Glob") => format!("Found: {pattern}"),
            (ToolStatus::Complete, "Grep") => format!("Searched: {pattern}"),
            (ToolStatus::Complete, tool) => format!("{tool} complete"),
        }
    }

    /// Input field as display text; empty strings and nulls count as absent.
    fn input_str(&self, key: &str) -> Option<String> {
        match self.input.get(key)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

// =============================================================================
// TRACKER
// =============================================================================

#[derive(Clone, Debug, Default)]
pub struct ToolActivityTracker {
    running: Option<String>,
}

impl ToolActivityTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the running activity, if any.
    #[must_use]
    pub fn running(&self) -> Option<&str> {
        self.running.as_deref()
    }

    /// Record a new invocation and return its id.
    pub fn start(&mut self, timeline: &mut Timeline, tool: &str, input: Map<String, Value>) -> String {
        if let Some(previous) = self.running.take() {
            warn!(%previous, %tool, "tools: new invocation while one is running; closing it");
            if let Some(activity) = timeline.tool_activity_mut(&previous) {
                activity.status = ToolStatus::Complete;
            }
        }
        let activity = ToolActivity::new(tool, input);
        let id = activity.id.clone();
        debug!(%id, %tool, "tools: started");
        timeline.push_tool(activity);
        self.running = Some(id.clone());
        id
    }

    /// Finalize the running invocation. Returns false, touching nothing, when
    /// no invocation is running.
    pub fn finish(&mut self, timeline: &mut Timeline, content: &str, is_error: bool) -> bool {
        let Some(id) = self.running.take() else {
            debug!("tools: result with no running invocation");
            return false;
        };
        let Some(activity) = timeline.tool_activity_mut(&id) else {
            debug!(%id, "tools: running invocation no longer in timeline");
            return false;
        };
        activity.status = ToolStatus::Complete;
        activity.result = Some(content.to_owned());
        activity.is_error = Some(is_error);
        true
    }

    /// Forget the running invocation without touching the timeline.
    pub fn reset(&mut self) {
        self.running = None;
    }
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;
