//! The commit graph.
//!
//! Commits are immutable. A commit's id hashes its parents, so a parent must
//! exist before its child can be written and no commit can reach itself.

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::models::{Commit, LogEntry, Snapshot};
use crate::storage::Storage;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

pub struct CommitGraph<'a> {
    storage: &'a Storage,
}

impl<'a> CommitGraph<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub fn get(&self, id: &ObjectId) -> Result<Commit> {
        self.storage
            .get_commit(id)?
            .ok_or_else(|| Error::CommitNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &ObjectId) -> Result<bool> {
        self.storage.has_commit(id)
    }

    /// Appends a commit node. Blobs referenced by `snapshot` must already be stored.
    pub fn append(
        &self,
        parents: Vec<ObjectId>,
        snapshot: Snapshot,
        message: &str,
        author: &str,
    ) -> Result<Commit> {
        let mut generation = 0;
        for parent in &parents {
            let parent_commit = self.storage.get_commit(parent)?.ok_or_else(|| {
                Error::GraphInconsistency(format!("parent commit {parent} does not exist"))
            })?;
            generation = generation.max(parent_commit.generation);
        }
        for (path, blob) in &snapshot {
            if !self.storage.has_blob(blob)? {
                return Err(Error::BlobNotFound(format!("{blob} (for {path})")));
            }
        }

        let timestamp = Utc::now();
        let sequence = self.storage.next_sequence()?;
        let id = Commit::compute_id(&parents, &snapshot, message, author, &timestamp, sequence);
        let commit = Commit {
            id,
            parents,
            snapshot,
            message: message.to_string(),
            author: author.to_string(),
            timestamp,
            sequence,
            generation: generation + 1,
        };

        self.storage.insert_commit(&commit)?;
        debug!(commit = %commit.id.short(), parents = commit.parents.len(), "appended commit");
        Ok(commit)
    }

    /// Breadth-first walk over `start` and everything it descends from.
    pub fn ancestors(&self, start: &ObjectId) -> Ancestors<'a> {
        Ancestors {
            storage: self.storage,
            queue: VecDeque::from([start.clone()]),
            seen: HashSet::from([start.clone()]),
        }
    }

    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool> {
        for commit in self.ancestors(descendant) {
            if commit?.id == *ancestor {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Nearest shared ancestor of `a` and `b` (either may be the answer itself).
    ///
    /// Among all common ancestors the one with the greatest generation wins,
    /// then the newest timestamp, then the larger id. `None` means the two
    /// commits share no history.
    pub fn lowest_common_ancestor(&self, a: &ObjectId, b: &ObjectId) -> Result<Option<Commit>> {
        let mut reachable_from_a = HashSet::new();
        for commit in self.ancestors(a) {
            reachable_from_a.insert(commit?.id);
        }

        let mut best: Option<Commit> = None;
        for commit in self.ancestors(b) {
            let commit = commit?;
            if !reachable_from_a.contains(&commit.id) {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    (commit.generation, commit.timestamp, &commit.id)
                        > (current.generation, current.timestamp, &current.id)
                }
            };
            if better {
                best = Some(commit);
            }
        }

        debug!(
            a = %a.short(),
            b = %b.short(),
            base = ?best.as_ref().map(|c| c.id.short().to_string()),
            "lowest common ancestor"
        );
        Ok(best)
    }

    /// Paths whose blob differs from the first parent's snapshot.
    pub fn changed_paths(&self, commit: &Commit) -> Result<Vec<String>> {
        let parent_snapshot = match commit.first_parent() {
            Some(parent) => self.get(parent)?.snapshot,
            None => Snapshot::new(),
        };
        Ok(snapshot_delta(&parent_snapshot, &commit.snapshot))
    }

    pub fn log(&self, head: &ObjectId, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        for commit in self.ancestors(head).take(limit.unwrap_or(usize::MAX)) {
            let commit = commit?;
            let files = self.changed_paths(&commit)?;
            entries.push(LogEntry { commit, files });
        }
        Ok(entries)
    }
}

/// Sorted paths that were added, removed or changed between two snapshots.
pub fn snapshot_delta(from: &Snapshot, to: &Snapshot) -> Vec<String> {
    let mut paths: Vec<String> = to
        .iter()
        .filter(|(path, blob)| from.get(*path) != Some(*blob))
        .map(|(path, _)| path.clone())
        .chain(from.keys().filter(|p| !to.contains_key(*p)).cloned())
        .collect();
    paths.sort();
    paths
}

/// Lazy breadth-first ancestor iterator; each commit is yielded once.
pub struct Ancestors<'a> {
    storage: &'a Storage,
    queue: VecDeque<ObjectId>,
    seen: HashSet<ObjectId>,
}

impl Iterator for Ancestors<'_> {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        let commit = match self.storage.get_commit(&id) {
            Ok(Some(commit)) => commit,
            Ok(None) => {
                self.queue.clear();
                return Some(Err(Error::GraphInconsistency(format!(
                    "commit {id} is referenced but missing"
                ))));
            }
            Err(e) => {
                self.queue.clear();
                return Some(Err(e));
            }
        };

        for parent in &commit.parents {
            if self.seen.insert(parent.clone()) {
                self.queue.push_back(parent.clone());
            }
        }
        Some(Ok(commit))
    }
}
