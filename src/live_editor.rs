//! Live editor chat: instructions out, streamed text and tool activity in.
//!
//! DESIGN
//! ======
//! One `LiveEditor` drives one chat against a project on disk. Assistant
//! text arrives as `chunk` events and accumulates in a stream buffer; the
//! buffer becomes a timeline message on `complete`, and also right before a
//! `tool_use` so the text and tool entries keep the order they streamed in.
//! The session identity lives in [`SessionState`]; it is attached to an
//! instruction only when valid and replaced only by a valid `complete`.

use frames::{CloseKind, EditInstruction, LiveEditorEvent};
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, Inbound, SessionChannel};
use crate::selection::ElementSelectionSet;
use crate::state::SessionState;
use crate::storage::StorageError;
use crate::timeline::Timeline;
use crate::tools::ToolActivityTracker;

const NO_PROJECT_MESSAGE: &str = "Error: No project path configured. Please set a project path first.";
const CONNECTION_LOST_MESSAGE: &str = "Error: Connection to the live editor was lost.";

#[derive(Debug, thiserror::Error)]
pub enum LiveEditorError {
    #[error("no project path configured")]
    NoProjectPath,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default)]
pub struct LiveEditor {
    timeline: Timeline,
    tools: ToolActivityTracker,
    selection: ElementSelectionSet,
    streaming: bool,
    stream_buffer: String,
    status_line: Option<String>,
}

impl LiveEditor {
    #[must_use]
    pub fn new(max_selected: usize) -> Self {
        Self { selection: ElementSelectionSet::new(max_selected), ..Self::default() }
    }

    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    #[must_use]
    pub fn selection(&self) -> &ElementSelectionSet {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut ElementSelectionSet {
        &mut self.selection
    }

    #[must_use]
    pub fn tools(&self) -> &ToolActivityTracker {
        &self.tools
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Text received since the last flush.
    #[must_use]
    pub fn stream_buffer(&self) -> &str {
        &self.stream_buffer
    }

    /// Latest transient progress line. Never added to the timeline.
    #[must_use]
    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Record the user's message and build the instruction for it.
    ///
    /// # Errors
    ///
    /// [`LiveEditorError::NoProjectPath`] when no project is open; a visible
    /// error message is added to the timeline instead of the user message.
    pub fn prepare_message(&mut self, session: &SessionState, content: &str) -> Result<EditInstruction, LiveEditorError> {
        let Some(project_path) = session.project_path() else {
            self.timeline.push_assistant(NO_PROJECT_MESSAGE);
            return Err(LiveEditorError::NoProjectPath);
        };

        let element_context = self.selection.build_context();
        self.timeline.push_user(content);
        self.streaming = true;
        self.stream_buffer.clear();
        self.status_line = None;

        Ok(EditInstruction {
            message: content.to_owned(),
            project_path: project_path.to_owned(),
            element_context,
            session_id: session.session_id().map(ToString::to_string),
        })
    }

    /// Send a chat message. A send failure becomes a visible error message
    /// and ends the streaming state.
    ///
    /// # Errors
    ///
    /// See [`Self::prepare_message`], or the channel error of a failed send.
    pub async fn send_message(
        &mut self,
        session: &SessionState,
        channel: &mut SessionChannel<LiveEditorEvent>,
        content: &str,
    ) -> Result<(), LiveEditorError> {
        let instruction = self.prepare_message(session, content)?;
        if let Err(e) = channel.connect().await {
            debug!(error = %e, "live: connect failed, send will retry");
        }
        if let Err(e) = channel.send(&instruction).await {
            warn!(error = %e, "live: instruction not sent");
            self.streaming = false;
            self.timeline.push_assistant(format!("Error: {e}"));
            return Err(e.into());
        }
        Ok(())
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply one event. Returns true once the assistant's turn is over.
    pub fn apply(&mut self, session: &mut SessionState, event: LiveEditorEvent) -> bool {
        match event {
            LiveEditorEvent::Chunk { content } => {
                self.stream_buffer.push_str(&content);
                false
            }
            LiveEditorEvent::ToolUse { tool, input } => {
                self.flush_buffer();
                self.tools.start(&mut self.timeline, &tool, input);
                false
            }
            LiveEditorEvent::ToolResult { content, is_error } => {
                self.tools.finish(&mut self.timeline, &content, is_error);
                false
            }
            LiveEditorEvent::Complete { session_id } => {
                self.flush_buffer();
                self.end_turn();
                if let Some(raw) = session_id {
                    match session.set_session_id(&raw) {
                        Ok(id) => info!(session_id = %id, "live: session stored"),
                        Err(e) => warn!(error = %e, "live: ignoring session id from backend"),
                    }
                }
                true
            }
            LiveEditorEvent::Error { message } => {
                warn!(%message, "live: backend error");
                self.stream_buffer.clear();
                self.timeline.push_assistant(format!("Error: {message}"));
                self.end_turn();
                true
            }
            LiveEditorEvent::Status { message } => {
                debug!(%message, "live: status");
                self.status_line = Some(message);
                false
            }
        }
    }

    /// The stream closed. Only a closure in the middle of a turn is visible.
    pub fn on_closed(&mut self, kind: &CloseKind) {
        info!(?kind, "live: channel closed");
        if self.streaming {
            self.abort_turn(CONNECTION_LOST_MESSAGE.to_owned());
        }
    }

    pub fn on_channel_error(&mut self, err: &ChannelError) {
        warn!(error = %err, "live: channel failed");
        if self.streaming {
            self.abort_turn(format!("Error: {err}"));
        }
    }

    /// Pump the channel until the current turn ends or the stream fails.
    ///
    /// # Errors
    ///
    /// The transport error that ended the stream.
    pub async fn drive(
        &mut self,
        session: &mut SessionState,
        channel: &mut SessionChannel<LiveEditorEvent>,
    ) -> Result<(), LiveEditorError> {
        while self.streaming {
            match channel.recv().await {
                Ok(Inbound::Event(event)) => {
                    if self.apply(session, event) {
                        break;
                    }
                }
                Ok(Inbound::Closed(kind)) => {
                    self.on_closed(&kind);
                    break;
                }
                Err(e) => {
                    self.on_channel_error(&e);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    pub fn clear_messages(&mut self) {
        self.timeline.clear();
        self.stream_buffer.clear();
        self.tools.reset();
    }

    /// Start over: forget the session identity, the conversation and the
    /// selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be cleared from storage.
    pub fn new_session(&mut self, session: &mut SessionState) -> Result<(), LiveEditorError> {
        session.new_session()?;
        self.clear_messages();
        self.selection.clear();
        self.streaming = false;
        self.status_line = None;
        Ok(())
    }

    /// Point the editor at another project. The session identity belongs to
    /// the old project and is dropped with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the project cannot be persisted.
    pub fn set_project_path(&mut self, session: &mut SessionState, path: &str) -> Result<(), LiveEditorError> {
        session.set_project(path, None)?;
        Ok(())
    }

    fn flush_buffer(&mut self) {
        if !self.stream_buffer.is_empty() {
            let text = std::mem::take(&mut self.stream_buffer);
            self.timeline.push_assistant(text);
        }
    }

    fn end_turn(&mut self) {
        self.streaming = false;
        self.status_line = None;
    }

    fn abort_turn(&mut self, message: String) {
        self.flush_buffer();
        self.tools.reset();
        self.timeline.push_assistant(message);
        self.end_turn();
    }
}

#[cfg(test)]
#[path = "live_editor_test.rs"]
mod tests;
