//! Branch pointers and switching between them.

use crate::checkout::{Checkout, CheckoutSummary};
use crate::error::{Error, Result};
use crate::events::RepoEvent;
use crate::graph::CommitGraph;
use crate::models::{Branch, Snapshot};
use crate::repo::{validate_branch_name, Repository};
use crate::store::ContentStore;
use tracing::{info, warn};

/// A branch as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub branch: Branch,
    pub is_current: bool,
}

impl Repository {
    /// All branches sorted by name, marking the checked-out one.
    pub fn branches(&self) -> Result<Vec<BranchInfo>> {
        let _lock = self.read_lock()?;
        let current = self.current_branch_name()?;
        Ok(self
            .storage
            .list_branches()?
            .into_iter()
            .map(|branch| BranchInfo {
                is_current: branch.name == current,
                branch,
            })
            .collect())
    }

    /// Creates `name` pointing at the current head.
    pub fn create_branch(&mut self, name: &str) -> Result<Branch> {
        let _lock = self.write_lock()?;

        validate_branch_name(name)?;
        if self.storage.get_branch(name)?.is_some() {
            return Err(Error::BranchAlreadyExists(name.to_string()));
        }
        let head = self.current_branch()?.head.ok_or(Error::EmptyRepository)?;

        self.storage.put_branch(name, Some(&head))?;
        info!(branch = name, head = %head.short(), "created branch");
        self.emit(RepoEvent::BranchCreated {
            name: name.to_string(),
            head: head.clone(),
        });
        Ok(Branch {
            name: name.to_string(),
            head: Some(head),
        })
    }

    pub fn delete_branch(&mut self, name: &str) -> Result<()> {
        let _lock = self.write_lock()?;

        if self.current_branch_name()? == name {
            return Err(Error::CannotDeleteCurrentBranch(name.to_string()));
        }
        if !self.storage.delete_branch(name)? {
            return Err(Error::BranchNotFound(name.to_string()));
        }
        info!(branch = name, "deleted branch");
        self.emit(RepoEvent::BranchDeleted {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Makes `name` the current branch and the work tree a copy of its head.
    ///
    /// If a file cannot be written the error names it, HEAD stays where it
    /// was, and files handled before the failure keep their new content.
    pub fn switch_branch(&mut self, name: &str) -> Result<CheckoutSummary> {
        let _lock = self.write_lock()?;

        if self.storage.get_pending_merge()?.is_some() {
            return Err(Error::MergeInProgress);
        }
        let target = self
            .storage
            .get_branch(name)?
            .ok_or_else(|| Error::BranchNotFound(name.to_string()))?;
        let current = self.current_branch_name()?;

        let current_snapshot = self.head_snapshot()?;
        let changes = self.detector().scan(&current_snapshot)?;
        if !changes.is_empty() {
            warn!(paths = changes.len(), "switch refused: uncommitted changes");
            return Err(Error::UncommittedChanges(changes.paths()));
        }

        let target_snapshot = match &target.head {
            Some(id) => CommitGraph::new(&self.storage).get(id)?.snapshot,
            None => Snapshot::new(),
        };
        let summary = Checkout::new(&self.root, ContentStore::new(&self.storage))
            .apply(&current_snapshot, &target_snapshot)?;
        self.detector().reset_cache()?;
        self.storage.set_head(name)?;

        info!(from = %current, to = name, "switched branch");
        self.emit(RepoEvent::BranchSwitched {
            from: current,
            to: name.to_string(),
        });
        Ok(summary)
    }
}
