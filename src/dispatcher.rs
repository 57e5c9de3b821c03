//! Generation dispatcher: one user intent, one commit, one request.
//!
//! DESIGN
//! ======
//! `generate` creates the commit, points the head at it and sends a single
//! [`GenerationRequest`]. It returns a [`GenerationContext`] naming the
//! request and its commit. Every inbound event for that request is routed
//! through [`GenerationDispatcher::apply`] together with the context, so
//! there are no per-request closures: an event whose context is no longer the
//! active one (after cancel, failure or a newer request) is ignored.
//!
//! OUTCOMES
//! ========
//! - close `1000`: complete, commit kept, phase `CodeReady`.
//! - close `4333` (user cancel): a root commit resets the whole project; any
//!   other commit must be the head leaf, is removed, and the head reverts to
//!   its parent.
//! - backend `error` event, close `4332`, any other code or a transport
//!   failure: surfaced in `last_error`, commit kept for inspection.

use frames::{
    CloseKind, GenerationEvent, GenerationRequest, GenerationSettings, GenerationType, InputMode, PromptContent,
    Stack, USER_CLOSE_CODE,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::{ChannelError, Inbound, SessionChannel};
use crate::commits::{CommitError, CommitHash, CommitKind, CommitSpec, CommitStore, VariantStatus};
use crate::state::{AppPhase, AppState, ProjectState};

/// Appended to an update instruction when an element is selected.
const ELEMENT_REFERENCE: &str = " referring to this element specifically: ";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no current version is set")]
    MissingHead,
    #[error("version history is invalid")]
    InvalidHistory(#[source] CommitError),
    #[error("only the first version can be regenerated")]
    NotRegenerable,
    #[error("please include some instructions for AI on what to update")]
    EmptyInstruction,
    #[error("at least one reference image is required")]
    MissingReferenceImage,
    #[error("a generation is already in progress")]
    Busy,
    #[error("select and edit is not available for {}", .0.as_str())]
    SelectionUnsupported(Stack),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Everything `generate` needs besides the configured settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationParams {
    pub generation_type: GenerationType,
    pub input_mode: InputMode,
    pub prompt: PromptContent,
    /// Full instruction history, newest last. Updates only.
    pub history: Option<Vec<PromptContent>>,
    pub is_imported_from_code: bool,
}

/// Identity of one in-flight request and the commit it writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationContext {
    pub request_id: Uuid,
    pub commit: CommitHash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rollback {
    /// The cancelled commit was the root; the project is empty again.
    Reset,
    /// The cancelled commit was removed and the head moved to its parent.
    RevertedTo(CommitHash),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Event applied; the generation continues.
    Pending,
    /// Event belongs to a request that is no longer active.
    Ignored,
    Completed,
    Cancelled(Rollback),
    Failed(String),
}

impl Outcome {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled(_) | Self::Failed(_))
    }
}

pub struct GenerationDispatcher {
    settings: GenerationSettings,
    variant_capacity: usize,
    active: Option<GenerationContext>,
}

impl GenerationDispatcher {
    #[must_use]
    pub fn new(settings: GenerationSettings, variant_capacity: usize) -> Self {
        Self { settings, variant_capacity, active: None }
    }

    #[must_use]
    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn set_stack(&mut self, stack: Stack) {
        self.settings.generated_code_config = stack;
    }

    #[must_use]
    pub fn active(&self) -> Option<&GenerationContext> {
        self.active.as_ref()
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Create the commit for `params`, make it the head, and build the
    /// request. Nothing is sent.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Busy`] while another generation is active and
    /// [`DispatchError::MissingHead`] for an update with no head.
    pub fn begin(
        &mut self,
        state: &mut AppState,
        params: GenerationParams,
    ) -> Result<(GenerationContext, GenerationRequest), DispatchError> {
        if self.active.is_some() {
            return Err(DispatchError::Busy);
        }

        let spec = match params.generation_type {
            GenerationType::Create => CommitSpec::ai_create(params.prompt.clone(), self.variant_capacity),
            GenerationType::Update => {
                let parent = state.project.commits.head().cloned().ok_or(DispatchError::MissingHead)?;
                let inputs = params
                    .history
                    .as_ref()
                    .and_then(|h| h.last())
                    .cloned()
                    .unwrap_or_default();
                CommitSpec::ai_edit(parent, inputs, self.variant_capacity)
            }
        };
        let commit = CommitStore::create_commit(spec);
        let hash = commit.hash.clone();
        state.project.commits.add_commit(commit)?;
        state.project.commits.set_head(&hash)?;

        state.project.execution_consoles.clear();
        state.project.last_error = None;
        state.project.phase = AppPhase::Coding;

        let request = GenerationRequest {
            generation_type: params.generation_type,
            input_mode: params.input_mode,
            prompt: params.prompt,
            history: params.history,
            is_imported_from_code: params.is_imported_from_code,
            settings: self.settings.clone(),
            session_id: state.session.session_id().map(ToString::to_string),
            project_path: state.session.project_path().map(str::to_owned),
        };
        let ctx = GenerationContext { request_id: Uuid::new_v4(), commit: hash };
        info!(
            request_id = %ctx.request_id,
            commit = %ctx.commit,
            kind = ?params.generation_type,
            "dispatch: generation started"
        );
        self.active = Some(ctx.clone());
        Ok((ctx, request))
    }

    /// Begin a generation and send its request. A send failure is surfaced
    /// in the project state and ends the generation; the commit stays.
    ///
    /// # Errors
    ///
    /// Any error of [`Self::begin`], or the channel error of a failed send.
    pub async fn generate(
        &mut self,
        state: &mut AppState,
        channel: &mut SessionChannel<GenerationEvent>,
        params: GenerationParams,
    ) -> Result<GenerationContext, DispatchError> {
        let (ctx, request) = self.begin(state, params)?;
        if let Err(e) = channel.connect().await {
            warn!(error = %e, "dispatch: connect failed, send will retry");
        }
        if let Err(e) = channel.send(&request).await {
            error!(request_id = %ctx.request_id, error = %e, "dispatch: request not sent");
            self.fail(&mut state.project, format!("Error connecting to the backend: {e}"));
            return Err(e.into());
        }
        Ok(ctx)
    }

    /// Start a fresh tree from a text prompt.
    ///
    /// # Errors
    ///
    /// See [`Self::generate`].
    pub async fn create_from_text(
        &mut self,
        state: &mut AppState,
        channel: &mut SessionChannel<GenerationEvent>,
        text: &str,
    ) -> Result<GenerationContext, DispatchError> {
        self.ensure_idle()?;
        state.project.reset();
        state.project.input_mode = InputMode::Text;
        state.project.initial_prompt = text.to_owned();
        let params = GenerationParams {
            generation_type: GenerationType::Create,
            input_mode: InputMode::Text,
            prompt: PromptContent::text(text),
            history: None,
            is_imported_from_code: false,
        };
        self.generate(state, channel, params).await
    }

    /// Start a fresh tree from screenshots or a screen recording. Only the
    /// first image is sent as the prompt.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingReferenceImage`] when `images` is empty, else
    /// see [`Self::generate`].
    pub async fn create_from_images(
        &mut self,
        state: &mut AppState,
        channel: &mut SessionChannel<GenerationEvent>,
        images: Vec<String>,
        mode: InputMode,
    ) -> Result<GenerationContext, DispatchError> {
        self.ensure_idle()?;
        let Some(first) = images.first().cloned() else {
            return Err(DispatchError::MissingReferenceImage);
        };
        state.project.reset();
        state.project.reference_images = images;
        state.project.input_mode = mode;
        let params = GenerationParams {
            generation_type: GenerationType::Create,
            input_mode: mode,
            prompt: PromptContent::image(first),
            history: None,
            is_imported_from_code: false,
        };
        self.generate(state, channel, params).await
    }

    /// Edit the head with a new instruction. The request carries the whole
    /// instruction history of the head's branch plus the new instruction.
    ///
    /// # Errors
    ///
    /// [`DispatchError::EmptyInstruction`], [`DispatchError::MissingHead`],
    /// [`DispatchError::InvalidHistory`], [`DispatchError::SelectionUnsupported`]
    /// when an element is given for a stack without select-and-edit, else see
    /// [`Self::generate`].
    pub async fn update(
        &mut self,
        state: &mut AppState,
        channel: &mut SessionChannel<GenerationEvent>,
        instruction: &str,
        selected_element_html: Option<&str>,
        images: Vec<String>,
    ) -> Result<GenerationContext, DispatchError> {
        self.ensure_idle()?;
        if instruction.trim().is_empty() {
            return Err(DispatchError::EmptyInstruction);
        }
        let stack = self.settings.generated_code_config;
        if selected_element_html.is_some() && !stack.supports_select_and_edit() {
            warn!(stack = stack.as_str(), "dispatch: selected element on a stack without select-and-edit");
            return Err(DispatchError::SelectionUnsupported(stack));
        }
        let head = state.project.commits.head().cloned().ok_or(DispatchError::MissingHead)?;
        let mut history = state.project.commits.extract_history(&head).map_err(|e| {
            error!(%head, error = %e, "dispatch: cannot rebuild history");
            DispatchError::InvalidHistory(e)
        })?;

        let text = match selected_element_html {
            Some(html) => format!("{instruction}{ELEMENT_REFERENCE}{html}"),
            None => instruction.to_owned(),
        };
        history.push(PromptContent { text, images });

        let project = &state.project;
        let prompt = match project.input_mode {
            InputMode::Text => PromptContent::text(project.initial_prompt.clone()),
            InputMode::Image | InputMode::Video => PromptContent {
                text: String::new(),
                images: project.reference_images.first().cloned().into_iter().collect(),
            },
        };
        let params = GenerationParams {
            generation_type: GenerationType::Update,
            input_mode: project.input_mode,
            prompt,
            history: Some(history),
            is_imported_from_code: project.is_imported_from_code,
        };
        self.generate(state, channel, params).await
    }

    /// Re-run the create that produced the head. Only valid while the head
    /// is the first AI version.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingHead`], [`DispatchError::NotRegenerable`],
    /// else see [`Self::generate`].
    pub async fn regenerate(
        &mut self,
        state: &mut AppState,
        channel: &mut SessionChannel<GenerationEvent>,
    ) -> Result<GenerationContext, DispatchError> {
        let head = state.project.commits.head_commit().ok_or(DispatchError::MissingHead)?;
        if head.kind != CommitKind::AiCreate {
            return Err(DispatchError::NotRegenerable);
        }
        match state.project.input_mode {
            InputMode::Text => {
                let text = state.project.initial_prompt.clone();
                self.create_from_text(state, channel, &text).await
            }
            mode @ (InputMode::Image | InputMode::Video) => {
                let images = state.project.reference_images.clone();
                self.create_from_images(state, channel, images, mode).await
            }
        }
    }

    /// Replace the project with existing code as a single complete version.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Busy`] while a generation is active.
    pub fn import_from_code(
        &mut self,
        state: &mut AppState,
        code: &str,
        stack: Stack,
    ) -> Result<CommitHash, DispatchError> {
        self.ensure_idle()?;
        state.project.reset();
        state.project.is_imported_from_code = true;
        self.set_stack(stack);

        let commit = CommitStore::create_commit(CommitSpec::code_create(code));
        let hash = commit.hash.clone();
        let commits = &mut state.project.commits;
        commits.add_commit(commit)?;
        commits.update_variant_status(&hash, 0, VariantStatus::Complete);
        commits.set_head(&hash)?;
        state.project.phase = AppPhase::CodeReady;
        info!(commit = %hash, stack = stack.as_str(), "dispatch: imported code");
        Ok(hash)
    }

    /// Ask the backend to stop by closing with the user-cancel code. The
    /// rollback happens when the closure is observed.
    pub async fn cancel(&mut self, channel: &mut SessionChannel<GenerationEvent>) {
        let Some(ctx) = &self.active else {
            debug!("dispatch: cancel with no active generation");
            return;
        };
        info!(request_id = %ctx.request_id, "dispatch: cancelling generation");
        channel.close(USER_CLOSE_CODE, "user cancelled").await;
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply one stream event to the commit named by `ctx`.
    pub fn apply(&mut self, state: &mut AppState, ctx: &GenerationContext, event: GenerationEvent) -> Outcome {
        if self.active.as_ref() != Some(ctx) {
            debug!(request_id = %ctx.request_id, "dispatch: event for inactive request");
            return Outcome::Ignored;
        }
        let hash = &ctx.commit;
        let commits = &mut state.project.commits;

        match event {
            GenerationEvent::Chunk { value, variant_index } => {
                commits.append_commit_code(hash, variant_index, &value);
            }
            GenerationEvent::SetCode { value, variant_index } => {
                commits.set_commit_code(hash, variant_index, &value);
            }
            GenerationEvent::Status { value, variant_index } => {
                state.project.append_console(variant_index, value);
            }
            GenerationEvent::VariantComplete { variant_index } => {
                debug!(commit = %hash, variant_index, "dispatch: variant complete");
                commits.update_variant_status(hash, variant_index, VariantStatus::Complete);
            }
            GenerationEvent::VariantError { variant_index, value } => {
                warn!(commit = %hash, variant_index, error = %value, "dispatch: variant failed");
                commits.update_variant_status(hash, variant_index, VariantStatus::Error { message: value });
            }
            GenerationEvent::VariantCount { value } => {
                let allocated = commits.get(hash).map_or(0, |c| c.variants.len());
                if value != allocated {
                    info!(commit = %hash, allocated, reported = value, "dispatch: resizing variants");
                    commits.resize_variants(hash, value);
                }
            }
            GenerationEvent::SessionUpdate { value } => match state.session.set_session_id(&value) {
                Ok(id) => info!(session_id = %id, "dispatch: session updated"),
                Err(e) => warn!(error = %e, "dispatch: ignoring session update"),
            },
            GenerationEvent::Error { value } => {
                error!(commit = %hash, error = %value, "dispatch: backend reported an error");
                self.fail(&mut state.project, value.clone());
                return Outcome::Failed(value);
            }
        }
        Outcome::Pending
    }

    /// Resolve the generation when its stream closes.
    ///
    /// # Errors
    ///
    /// A cancel rollback that finds the tree in an unexpected shape: the
    /// commit missing, not the head, or with children.
    pub fn on_closed(
        &mut self,
        state: &mut AppState,
        ctx: &GenerationContext,
        kind: CloseKind,
    ) -> Result<Outcome, DispatchError> {
        if self.active.as_ref() != Some(ctx) {
            debug!(request_id = %ctx.request_id, ?kind, "dispatch: closure for inactive request");
            return Ok(Outcome::Ignored);
        }
        self.active = None;

        match kind {
            CloseKind::Normal => {
                info!(commit = %ctx.commit, "dispatch: generation complete");
                state.project.phase = AppPhase::CodeReady;
                Ok(Outcome::Completed)
            }
            CloseKind::UserCancelled => Ok(Outcome::Cancelled(rollback(&mut state.project, &ctx.commit)?)),
            CloseKind::ServerError => {
                let message = "The backend reported an error during generation.".to_owned();
                self.fail(&mut state.project, message.clone());
                Ok(Outcome::Failed(message))
            }
            CloseKind::Abnormal { code } => {
                let message = match code {
                    Some(code) => format!("Connection closed unexpectedly (code {code})."),
                    None => "Connection closed unexpectedly.".to_owned(),
                };
                warn!(commit = %ctx.commit, ?code, "dispatch: stream closed abnormally");
                self.fail(&mut state.project, message.clone());
                Ok(Outcome::Failed(message))
            }
        }
    }

    /// Resolve the generation after a transport failure.
    pub fn on_channel_error(&mut self, state: &mut AppState, ctx: &GenerationContext, err: &ChannelError) -> Outcome {
        if self.active.as_ref() != Some(ctx) {
            return Outcome::Ignored;
        }
        warn!(commit = %ctx.commit, error = %err, "dispatch: channel failed");
        let message = format!("Connection error: {err}");
        self.fail(&mut state.project, message.clone());
        Outcome::Failed(message)
    }

    /// Pump the channel until the generation named by `ctx` resolves.
    ///
    /// # Errors
    ///
    /// See [`Self::on_closed`].
    pub async fn drive(
        &mut self,
        state: &mut AppState,
        channel: &mut SessionChannel<GenerationEvent>,
        ctx: &GenerationContext,
    ) -> Result<Outcome, DispatchError> {
        loop {
            match channel.recv().await {
                Ok(Inbound::Event(event)) => {
                    let outcome = self.apply(state, ctx, event);
                    if outcome.is_terminal() {
                        channel.disconnect().await;
                        return Ok(outcome);
                    }
                }
                Ok(Inbound::Closed(kind)) => return self.on_closed(state, ctx, kind),
                Err(e) => return Ok(self.on_channel_error(state, ctx, &e)),
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), DispatchError> {
        if self.active.is_some() {
            return Err(DispatchError::Busy);
        }
        Ok(())
    }

    fn fail(&mut self, project: &mut ProjectState, message: String) {
        self.active = None;
        project.last_error = Some(message);
        project.phase = AppPhase::CodeReady;
    }
}

/// Undo a cancelled generation.
fn rollback(project: &mut ProjectState, hash: &CommitHash) -> Result<Rollback, DispatchError> {
    let commit = project
        .commits
        .get(hash)
        .ok_or_else(|| CommitError::UnknownCommit(hash.clone()))?;

    let Some(parent) = commit.parent_hash.clone() else {
        info!(commit = %hash, "dispatch: cancelled first version, resetting project");
        project.reset();
        return Ok(Rollback::Reset);
    };
    if project.commits.head() != Some(hash) {
        return Err(CommitError::NotHead(hash.clone()).into());
    }
    project.commits.remove_commit(hash)?;
    project.commits.set_head(&parent)?;
    project.phase = AppPhase::CodeReady;
    info!(commit = %hash, %parent, "dispatch: cancelled edit, reverted to parent");
    Ok(Rollback::RevertedTo(parent))
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
