//! Version tree of generated code.
//!
//! DESIGN
//! ======
//! Every generation or manual import produces one [`Commit`]. A commit points
//! at its parent (none for the root) and holds an ordered list of parallel
//! [`Variant`] attempts, one of which is selected for display. Commits are
//! built with [`CommitStore::create_commit`] (pure) and only become part of
//! the tree through [`CommitStore::add_commit`], which requires the parent to
//! already exist. Since a hash is fresh at insertion and its parent is older,
//! every parent chain is finite and acyclic.

mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use frames::PromptContent;
pub use store::{CommitError, CommitStore};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque, immutable commit identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHash(String);

impl CommitHash {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CommitHash {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// COMMIT
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    AiCreate,
    AiEdit,
    /// Manual import of existing code.
    CodeCreate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariantStatus {
    Generating,
    Complete,
    Error { message: String },
}

impl VariantStatus {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Generating)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub code: String,
    #[serde(flatten)]
    pub status: VariantStatus,
}

impl Variant {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into(), status: VariantStatus::Generating }
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            VariantStatus::Error { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: CommitHash,
    pub parent_hash: Option<CommitHash>,
    pub kind: CommitKind,
    /// Prompt that produced this commit; `None` for a manual import.
    pub inputs: Option<PromptContent>,
    pub variants: Vec<Variant>,
    pub selected_variant_index: usize,
}

impl Commit {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_hash.is_none()
    }

    #[must_use]
    pub fn selected_variant(&self) -> Option<&Variant> {
        self.variants.get(self.selected_variant_index)
    }

    /// True once no variant is still generating.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.variants.iter().all(|v| v.status.is_resolved())
    }
}

/// Construction parameters for [`CommitStore::create_commit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSpec {
    pub kind: CommitKind,
    pub parent_hash: Option<CommitHash>,
    pub inputs: Option<PromptContent>,
    /// Initial code of each variant; the length fixes the variant count.
    pub variants: Vec<String>,
}

impl CommitSpec {
    #[must_use]
    pub fn ai_create(inputs: PromptContent, capacity: usize) -> Self {
        Self {
            kind: CommitKind::AiCreate,
            parent_hash: None,
            inputs: Some(inputs),
            variants: vec![String::new(); capacity],
        }
    }

    #[must_use]
    pub fn ai_edit(parent: CommitHash, inputs: PromptContent, capacity: usize) -> Self {
        Self {
            kind: CommitKind::AiEdit,
            parent_hash: Some(parent),
            inputs: Some(inputs),
            variants: vec![String::new(); capacity],
        }
    }

    #[must_use]
    pub fn code_create(code: impl Into<String>) -> Self {
        Self { kind: CommitKind::CodeCreate, parent_hash: None, inputs: None, variants: vec![code.into()] }
    }
}
