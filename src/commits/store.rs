//! Commit map, head pointer and history reconstruction.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use super::{Commit, CommitHash, CommitSpec, PromptContent, Variant, VariantStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("commit {0} already exists")]
    DuplicateHash(CommitHash),
    #[error("commit {0} does not exist")]
    UnknownCommit(CommitHash),
    #[error("parent commit {0} does not exist")]
    MissingParent(CommitHash),
    #[error("commit {0} has children and cannot be removed")]
    HasChildren(CommitHash),
    #[error("commit {0} is not the current head")]
    NotHead(CommitHash),
    #[error("commit must have at least one variant")]
    NoVariants,
    #[error("variant {index} out of range for commit {hash} ({len} variants)")]
    VariantOutOfRange { hash: CommitHash, index: usize, len: usize },
    #[error("version history is invalid: {0}")]
    InvalidHistory(String),
}

/// Owner of the version tree. All mutation of commits goes through here.
#[derive(Clone, Debug, Default)]
pub struct CommitStore {
    commits: HashMap<CommitHash, Commit>,
    head: Option<CommitHash>,
}

impl CommitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a commit with a fresh hash. Does not touch any store.
    #[must_use]
    pub fn create_commit(spec: CommitSpec) -> Commit {
        Commit {
            hash: CommitHash::generate(),
            parent_hash: spec.parent_hash,
            kind: spec.kind,
            inputs: spec.inputs,
            variants: spec.variants.into_iter().map(Variant::new).collect(),
            selected_variant_index: 0,
        }
    }

    // =========================================================================
    // TREE
    // =========================================================================

    /// # Errors
    ///
    /// Rejects a hash collision, a missing parent, and an empty variant list.
    pub fn add_commit(&mut self, commit: Commit) -> Result<(), CommitError> {
        if self.commits.contains_key(&commit.hash) {
            return Err(CommitError::DuplicateHash(commit.hash));
        }
        if commit.variants.is_empty() {
            return Err(CommitError::NoVariants);
        }
        if let Some(parent) = &commit.parent_hash {
            if !self.commits.contains_key(parent) {
                return Err(CommitError::MissingParent(parent.clone()));
            }
        }
        self.commits.insert(commit.hash.clone(), commit);
        Ok(())
    }

    /// Remove a leaf commit. If it was the head, the head is cleared and the
    /// caller re-points it.
    ///
    /// # Errors
    ///
    /// Rejects unknown hashes and commits that still have children.
    pub fn remove_commit(&mut self, hash: &CommitHash) -> Result<Commit, CommitError> {
        if self.has_children(hash) {
            return Err(CommitError::HasChildren(hash.clone()));
        }
        let removed = self
            .commits
            .remove(hash)
            .ok_or_else(|| CommitError::UnknownCommit(hash.clone()))?;
        if self.head.as_ref() == Some(hash) {
            self.head = None;
        }
        Ok(removed)
    }

    /// Drop every commit and the head.
    pub fn reset(&mut self) {
        self.commits.clear();
        self.head = None;
    }

    #[must_use]
    pub fn get(&self, hash: &CommitHash) -> Option<&Commit> {
        self.commits.get(hash)
    }

    #[must_use]
    pub fn contains(&self, hash: &CommitHash) -> bool {
        self.commits.contains_key(hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    #[must_use]
    pub fn has_children(&self, hash: &CommitHash) -> bool {
        self.commits
            .values()
            .any(|c| c.parent_hash.as_ref() == Some(hash))
    }

    // =========================================================================
    // HEAD
    // =========================================================================

    #[must_use]
    pub fn head(&self) -> Option<&CommitHash> {
        self.head.as_ref()
    }

    #[must_use]
    pub fn head_commit(&self) -> Option<&Commit> {
        self.head.as_ref().and_then(|h| self.commits.get(h))
    }

    /// # Errors
    ///
    /// Returns [`CommitError::UnknownCommit`] if `hash` is not in the store.
    pub fn set_head(&mut self, hash: &CommitHash) -> Result<(), CommitError> {
        if !self.commits.contains_key(hash) {
            return Err(CommitError::UnknownCommit(hash.clone()));
        }
        self.head = Some(hash.clone());
        Ok(())
    }

    pub fn reset_head(&mut self) {
        self.head = None;
    }

    // =========================================================================
    // VARIANTS
    // =========================================================================
    //
    // Stream mutations return whether anything changed. A missing commit or
    // variant is a late event after cancellation or narrowing, not an error.

    pub fn append_commit_code(&mut self, hash: &CommitHash, index: usize, token: &str) -> bool {
        self.with_variant(hash, index, |v| v.code.push_str(token))
    }

    pub fn set_commit_code(&mut self, hash: &CommitHash, index: usize, code: &str) -> bool {
        self.with_variant(hash, index, |v| {
            v.code.clear();
            v.code.push_str(code);
        })
    }

    pub fn update_variant_status(&mut self, hash: &CommitHash, index: usize, status: VariantStatus) -> bool {
        self.with_variant(hash, index, |v| v.status = status)
    }

    /// Narrow (or widen) the variant list to `count`. Retained variants keep
    /// their code and status; the selection is clamped into range.
    pub fn resize_variants(&mut self, hash: &CommitHash, count: usize) -> bool {
        if count == 0 {
            debug!(%hash, "commits: ignoring resize to zero variants");
            return false;
        }
        let Some(commit) = self.commits.get_mut(hash) else {
            debug!(%hash, "commits: resize for unknown commit");
            return false;
        };
        let allocated = commit.variants.len();
        if count > allocated {
            info!(%hash, allocated, count, "commits: widening variants to the reported count");
        }
        commit.variants.truncate(count);
        while commit.variants.len() < count {
            commit.variants.push(Variant::new(""));
        }
        commit.selected_variant_index = commit.selected_variant_index.min(count - 1);
        true
    }

    /// # Errors
    ///
    /// Rejects unknown commits and indices past the current variant count.
    pub fn select_variant(&mut self, hash: &CommitHash, index: usize) -> Result<(), CommitError> {
        let commit = self
            .commits
            .get_mut(hash)
            .ok_or_else(|| CommitError::UnknownCommit(hash.clone()))?;
        if index >= commit.variants.len() {
            return Err(CommitError::VariantOutOfRange {
                hash: hash.clone(),
                index,
                len: commit.variants.len(),
            });
        }
        commit.selected_variant_index = index;
        Ok(())
    }

    fn with_variant(&mut self, hash: &CommitHash, index: usize, f: impl FnOnce(&mut Variant)) -> bool {
        let Some(commit) = self.commits.get_mut(hash) else {
            debug!(%hash, index, "commits: event for unknown commit");
            return false;
        };
        let Some(variant) = commit.variants.get_mut(index) else {
            debug!(%hash, index, "commits: event for variant out of range");
            return false;
        };
        f(variant);
        true
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// Prompt inputs from the root down to `hash`, oldest first. Commits
    /// without inputs (manual imports) contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::InvalidHistory`] if a commit on the chain is
    /// missing or the chain revisits a commit.
    pub fn extract_history(&self, hash: &CommitHash) -> Result<Vec<PromptContent>, CommitError> {
        let mut history = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(hash);

        while let Some(current) = cursor {
            if !seen.insert(current) {
                return Err(CommitError::InvalidHistory(format!("cycle at commit {current}")));
            }
            let commit = self
                .commits
                .get(current)
                .ok_or_else(|| CommitError::InvalidHistory(format!("missing commit {current}")))?;
            if let Some(inputs) = &commit.inputs {
                history.push(inputs.clone());
            }
            cursor = commit.parent_hash.as_ref();
        }

        history.reverse();
        Ok(history)
    }

    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, commit: Commit) {
        self.commits.insert(commit.hash.clone(), commit);
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
