//! Explicit state containers.
//!
//! DESIGN
//! ======
//! [`ProjectState`] holds everything about the code currently being
//! generated: the version tree, the app phase, the original inputs and the
//! per-variant execution consoles. [`SessionState`] holds what survives
//! between runs: the project path, the recent-project list and the live
//! session identity, written through to a [`KeyValueStore`]. Both are passed
//! by `&mut` to the dispatcher and live editor; there is no global access.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use frames::InputMode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::commits::CommitStore;
use crate::identity::{self, IdentityError, SessionId};
use crate::storage::{
    KeyValueStore, LAST_SAVED_FILE_KEY, PROJECT_PATH_KEY, RECENT_PROJECTS_KEY, StorageError, THEME_KEY,
};

/// Recent projects kept in the session container.
pub const MAX_RECENT_PROJECTS: usize = 10;

// =============================================================================
// PROJECT
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppPhase {
    #[default]
    Initial,
    Coding,
    CodeReady,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectState {
    pub commits: CommitStore,
    pub phase: AppPhase,
    pub input_mode: InputMode,
    /// Images the current tree was created from.
    pub reference_images: Vec<String>,
    /// Text prompt the current tree was created from.
    pub initial_prompt: String,
    pub is_imported_from_code: bool,
    /// Status lines per variant index for the running generation.
    pub execution_consoles: BTreeMap<usize, Vec<String>>,
    /// Last user-visible failure, cleared when a generation starts.
    pub last_error: Option<String>,
}

impl ProjectState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the tree and its inputs and return to the initial phase.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn append_console(&mut self, variant_index: usize, line: impl Into<String>) {
        self.execution_consoles.entry(variant_index).or_default().push(line.into());
    }

    #[must_use]
    pub fn console(&self, variant_index: usize) -> &[String] {
        self.execution_consoles.get(&variant_index).map_or(&[], Vec::as_slice)
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveMode {
    #[default]
    ScreenshotToCode,
    LiveEditor,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentProject {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_server_url: Option<String>,
    /// Unix epoch milliseconds.
    pub last_opened: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemePreference {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Light, Self::Dark, Self::System].into_iter().find(|t| t.as_str() == name)
    }
}

/// Persistent session container. Every mutation that must survive a restart
/// is written through to the backing store before returning.
pub struct SessionState {
    store: Box<dyn KeyValueStore + Send>,
    project_path: Option<String>,
    project_name: Option<String>,
    dev_server_url: Option<String>,
    session_id: Option<SessionId>,
    active_mode: ActiveMode,
    recent_projects: Vec<RecentProject>,
}

impl SessionState {
    /// Restore the container from `store`. A malformed session identifier is
    /// cleared; an unreadable recent-project list is dropped.
    pub fn load(mut store: Box<dyn KeyValueStore + Send>) -> Self {
        let session_id = identity::load(store.as_mut());
        let project_path = store.get(PROJECT_PATH_KEY).filter(|p| !p.trim().is_empty());
        let recent_projects: Vec<RecentProject> = match store.get(RECENT_PROJECTS_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "session: discarding unreadable recent projects");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let dev_server_url = project_path.as_deref().and_then(|path| {
            recent_projects
                .iter()
                .find(|p| p.path == path)
                .and_then(|p| p.dev_server_url.clone())
        });

        Self {
            store,
            project_name: project_path.as_deref().map(project_name),
            project_path,
            dev_server_url,
            session_id,
            active_mode: ActiveMode::default(),
            recent_projects,
        }
    }

    #[must_use]
    pub fn project_path(&self) -> Option<&str> {
        self.project_path.as_deref()
    }

    #[must_use]
    pub fn project_name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    #[must_use]
    pub fn dev_server_url(&self) -> Option<&str> {
        self.dev_server_url.as_deref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    #[must_use]
    pub fn active_mode(&self) -> ActiveMode {
        self.active_mode
    }

    #[must_use]
    pub fn recent_projects(&self) -> &[RecentProject] {
        &self.recent_projects
    }

    pub fn switch_mode(&mut self, mode: ActiveMode) {
        self.active_mode = mode;
    }

    /// Open a project. The live session identity belongs to the previous
    /// project and is forgotten.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    pub fn set_project(&mut self, path: &str, dev_server_url: Option<String>) -> Result<(), StorageError> {
        let name = project_name(path);
        debug!(%path, %name, "session: opening project");

        self.recent_projects.retain(|p| p.path != path);
        self.recent_projects.insert(
            0,
            RecentProject {
                path: path.to_owned(),
                name: name.clone(),
                dev_server_url: dev_server_url.clone(),
                last_opened: now_ms(),
            },
        );
        self.recent_projects.truncate(MAX_RECENT_PROJECTS);

        self.project_path = Some(path.to_owned());
        self.project_name = Some(name);
        self.dev_server_url = dev_server_url;
        self.session_id = None;

        identity::clear(self.store.as_mut())?;
        self.store.set(PROJECT_PATH_KEY, path)?;
        self.persist_recent_projects()
    }

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    pub fn clear_project(&mut self) -> Result<(), StorageError> {
        self.project_path = None;
        self.project_name = None;
        self.dev_server_url = None;
        self.session_id = None;
        identity::clear(self.store.as_mut())?;
        self.store.remove(PROJECT_PATH_KEY)
    }

    /// Adopt a session identifier received from the backend. An invalid value
    /// leaves the current identity untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Invalid`] for a malformed value and
    /// [`IdentityError::Storage`] if it cannot be persisted.
    pub fn set_session_id(&mut self, raw: &str) -> Result<&SessionId, IdentityError> {
        let id = identity::store(self.store.as_mut(), raw)?;
        Ok(self.session_id.insert(id))
    }

    /// Forget the session identity so the next request starts fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    pub fn new_session(&mut self) -> Result<(), StorageError> {
        self.session_id = None;
        identity::clear(self.store.as_mut())
    }

    #[must_use]
    pub fn last_saved_file(&self) -> Option<String> {
        self.store.get(LAST_SAVED_FILE_KEY)
    }

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    pub fn record_saved_file(&mut self, path: &str) -> Result<(), StorageError> {
        self.store.set(LAST_SAVED_FILE_KEY, path)
    }

    /// Stored theme choice. Anything unrecognised reads as `System`.
    #[must_use]
    pub fn theme(&self) -> ThemePreference {
        self.store
            .get(THEME_KEY)
            .and_then(|raw| ThemePreference::from_name(&raw))
            .unwrap_or_default()
    }

    /// `System` is stored as the absence of a choice.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    pub fn set_theme(&mut self, theme: ThemePreference) -> Result<(), StorageError> {
        match theme {
            ThemePreference::System => self.store.remove(THEME_KEY),
            other => self.store.set(THEME_KEY, other.as_str()),
        }
    }

    /// Hand back the backing store, dropping the in-memory view.
    #[must_use]
    pub fn into_store(self) -> Box<dyn KeyValueStore + Send> {
        self.store
    }

    fn persist_recent_projects(&mut self) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&self.recent_projects)?;
        self.store.set(RECENT_PROJECTS_KEY, &raw)
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Both containers, handed to the dispatcher as one unit.
pub struct AppState {
    pub project: ProjectState,
    pub session: SessionState,
}

impl AppState {
    #[must_use]
    pub fn new(session: SessionState) -> Self {
        Self { project: ProjectState::new(), session }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Last non-empty path segment, or the whole path if it has none.
#[must_use]
pub fn project_name(path: &str) -> String {
    path.split(['/', '\\'])
        .rev()
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_owned()
}

pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
