//! Work-tree change detection.
//!
//! Every scan compares the files on disk against the snapshot of the current
//! branch head. The work-tree cache only saves rehashing files whose size and
//! modification time are unchanged since they were last hashed.

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::ignore::IgnoreRules;
use crate::models::{ChangeSet, Snapshot};
use crate::storage::{CacheEntry, Storage};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Files modified this recently are never cached; coarse mtime resolution
/// could hide a second write with the same size.
const RACY_WINDOW: Duration = Duration::from_secs(2);

pub struct ChangeDetector<'a> {
    root: &'a Path,
    rules: &'a IgnoreRules,
    storage: &'a Storage,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(root: &'a Path, rules: &'a IgnoreRules, storage: &'a Storage) -> Self {
        Self {
            root,
            rules,
            storage,
        }
    }

    /// Classifies work-tree paths against `head`.
    pub fn scan(&self, head: &Snapshot) -> Result<ChangeSet> {
        let on_disk = self.digest_tree()?;
        let mut changes = ChangeSet::default();

        for (path, digest) in &on_disk {
            match head.get(path) {
                None => changes.added.push(path.clone()),
                Some(recorded) if recorded != digest => changes.modified.push(path.clone()),
                Some(_) => {}
            }
        }

        changes.deleted = head
            .keys()
            .filter(|path| !on_disk.contains_key(*path) && !self.rules.is_ignored(path))
            .cloned()
            .collect();

        debug!(
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            "scanned work tree"
        );
        Ok(changes)
    }

    /// Digest of every tracked-eligible file, keyed by relative path.
    pub fn digest_tree(&self) -> Result<BTreeMap<String, ObjectId>> {
        let mut digests = BTreeMap::new();
        let walker = WalkDir::new(self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !self
                        .rules
                        .is_ignored_name(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = entry.map_err(|e| walk_error(self.root, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative_path(self.root, entry.path()) else {
                warn!(path = %entry.path().display(), "skipping file with a non-UTF-8 name");
                continue;
            };
            if self.rules.is_ignored(&rel) {
                continue;
            }
            let metadata = entry.metadata().map_err(|e| walk_error(self.root, e))?;
            let digest = self.file_digest(&rel, entry.path(), &metadata)?;
            digests.insert(rel, digest);
        }

        Ok(digests)
    }

    /// Hash of a single work-tree file, or `None` if it does not exist.
    pub fn digest_path(&self, rel: &str) -> Result<Option<ObjectId>> {
        let full = self.root.join(rel);
        match std::fs::symlink_metadata(&full) {
            Ok(metadata) if metadata.is_file() => self.file_digest(rel, &full, &metadata).map(Some),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(full, e)),
        }
    }

    /// Drops every cached digest; the next scan rehashes from disk.
    pub fn reset_cache(&self) -> Result<()> {
        self.storage.cache_clear()
    }

    fn file_digest(&self, rel: &str, full: &Path, metadata: &Metadata) -> Result<ObjectId> {
        let size = metadata.len();
        let mtime = metadata.modified().ok();
        let mtime_ns = mtime.and_then(nanos_since_epoch);

        if let (Some(cached), Some(mtime_ns)) = (self.storage.cache_get(rel)?, mtime_ns) {
            if cached.size == size && cached.mtime_ns == mtime_ns {
                return Ok(cached.digest);
            }
        }

        let content = std::fs::read(full).map_err(|e| Error::io(full, e))?;
        let digest = ObjectId::of(&content);

        let settled = mtime
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .is_some_and(|age| age >= RACY_WINDOW);
        if let (true, Some(mtime_ns)) = (settled, mtime_ns) {
            self.storage.cache_put(&CacheEntry {
                path: rel.to_string(),
                digest: digest.clone(),
                size,
                mtime_ns,
            })?;
        }

        Ok(digest)
    }
}

/// Relative path with `/` separators, or `None` for non-UTF-8 names.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    let joined = parts?.join("/");
    (!joined.is_empty()).then_some(joined)
}

/// Checks that a snapshot path stays inside the work tree: `/`-separated,
/// relative, with no empty, `.` or `..` components and no NUL bytes.
pub fn validate_snapshot_path(path: &str) -> Result<()> {
    let valid = !path.is_empty()
        && !path.contains('\0')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    if valid {
        Ok(())
    } else {
        Err(Error::GraphInconsistency(format!(
            "snapshot path {path:?} is outside the work tree"
        )))
    }
}

/// Absolute location of a snapshot path inside the work tree.
pub fn worktree_path(root: &Path, rel: &str) -> PathBuf {
    rel.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
}

fn nanos_since_epoch(time: SystemTime) -> Option<i64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_nanos()).ok())
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"));
    Error::io(path, source)
}
