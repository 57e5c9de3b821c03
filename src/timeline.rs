//! Conversation timeline for the live editor.
//!
//! Entries are kept in insertion order and never re-sorted. Tool entries are
//! the only ones mutated after insertion, and only by the tool tracker.

use rand::Rng;
use serde::Serialize;

use crate::state::now_ms;
use crate::tools::ToolActivity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_activity: Option<ToolActivity>,
}

#[derive(Clone, Debug, Default)]
pub struct Timeline {
    messages: Vec<ChatMessage>,
}

impl Timeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.push(ChatRole::User, content.into())
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.push(ChatRole::Assistant, content.into())
    }

    /// Insert a tool entry. The message shares the activity's id.
    pub fn push_tool(&mut self, activity: ToolActivity) -> &ChatMessage {
        self.messages.push(ChatMessage {
            id: activity.id.clone(),
            role: ChatRole::Tool,
            content: String::new(),
            timestamp: now_ms(),
            tool_activity: Some(activity),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub(crate) fn tool_activity_mut(&mut self, id: &str) -> Option<&mut ToolActivity> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.id == id)
            .and_then(|m| m.tool_activity.as_mut())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn push(&mut self, role: ChatRole, content: String) -> &ChatMessage {
        self.messages.push(ChatMessage { id: local_id(), role, content, timestamp: now_ms(), tool_activity: None });
        &self.messages[self.messages.len() - 1]
    }
}

/// Short random id for client-side entries. Never sent to the backend.
pub(crate) fn local_id() -> String {
    format!("{:016x}", rand::rng().random::<u64>())
}

#[cfg(test)]
#[path = "timeline_test.rs"]
mod tests;
