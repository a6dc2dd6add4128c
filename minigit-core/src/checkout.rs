//! Materializing snapshots into the work tree.
//!
//! A checkout moves the work tree from one snapshot to another: paths only in
//! the old snapshot are removed, everything in the new snapshot is written
//! unless the old snapshot already had the same blob there. Each file is
//! replaced through a temporary file and a rename, so a single file is never
//! left half-written. A failure stops the checkout and names the path; files
//! processed before it keep their new state.

use crate::detector::worktree_path;
use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::models::Snapshot;
use crate::store::ContentStore;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutSummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

pub struct Checkout<'a> {
    root: &'a Path,
    store: ContentStore<'a>,
}

impl<'a> Checkout<'a> {
    pub fn new(root: &'a Path, store: ContentStore<'a>) -> Self {
        Self { root, store }
    }

    /// Makes the work tree, currently matching `from`, match `to`.
    pub fn apply(&self, from: &Snapshot, to: &Snapshot) -> Result<CheckoutSummary> {
        let mut summary = CheckoutSummary::default();

        for path in from.keys().filter(|p| !to.contains_key(*p)) {
            self.remove_file(path)?;
            summary.removed.push(path.clone());
        }

        for (path, blob) in to {
            let target = worktree_path(self.root, path);
            let present = target.is_file();
            if present && from.get(path) == Some(blob) {
                continue;
            }
            self.write_blob(path, blob)?;
            if present {
                summary.updated.push(path.clone());
            } else {
                summary.created.push(path.clone());
            }
        }

        debug!(
            created = summary.created.len(),
            updated = summary.updated.len(),
            removed = summary.removed.len(),
            "checkout applied"
        );
        Ok(summary)
    }

    /// Overwrites one work-tree file with a stored blob.
    pub fn write_blob(&self, rel: &str, blob: &ObjectId) -> Result<()> {
        let content = self.store.get(blob)?;
        self.write_bytes(rel, &content)
    }

    pub fn write_bytes(&self, rel: &str, content: &[u8]) -> Result<()> {
        let target = worktree_path(self.root, rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        if target.is_dir() {
            fs::remove_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        }
        replace_file(&target, content)?;
        trace!(path = rel, size = content.len(), "wrote work-tree file");
        Ok(())
    }

    pub fn remove_file(&self, rel: &str) -> Result<()> {
        let target = worktree_path(self.root, rel);
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&target, e)),
        }
        self.prune_empty_dirs(&target);
        Ok(())
    }

    /// Removes directories emptied by a deletion, stopping at the work-tree root.
    fn prune_empty_dirs(&self, removed: &Path) {
        let mut dir = removed.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

fn replace_file(target: &Path, content: &[u8]) -> Result<()> {
    let mut tmp_name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".minigit-tmp");
    let tmp = target.with_file_name(tmp_name);

    let mut file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    file.write_all(content).map_err(|e| Error::io(&tmp, e))?;
    file.sync_data().map_err(|e| Error::io(&tmp, e))?;
    drop(file);
    fs::rename(&tmp, target).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::io(target, e)
    })
}
