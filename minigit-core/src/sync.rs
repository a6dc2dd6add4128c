//! Whole-repository state exchange.
//!
//! A [`RepoState`] is everything a repository knows apart from its work tree:
//! blobs, commits, branches and the name of the checked-out branch. Importing
//! is a union. Nothing local is ever removed or rewound, and a branch whose
//! head differs on the two sides is reported back instead of being moved.

use crate::detector::validate_snapshot_path;
use crate::error::{Error, Result};
use crate::events::RepoEvent;
use crate::hash::ObjectId;
use crate::models::{Branch, Commit};
use crate::repo::{validate_branch_name, Repository, REMOTE_DIR};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const REMOTE_STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub id: ObjectId,
    #[serde(with = "hex_content")]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    pub blobs: Vec<BlobRecord>,
    /// Parents before children.
    pub commits: Vec<Commit>,
    pub branches: Vec<Branch>,
    pub head: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub commits: usize,
    pub blobs: usize,
    pub branches_created: Vec<String>,
    /// Local branches without commits that took the incoming head. When the
    /// checked-out branch is one of them, its files are still missing from the
    /// work tree; [`Repository::restore_missing`] writes them.
    pub adopted: Vec<String>,
    /// Branches present on both sides with different heads; left as they were.
    pub diverged: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    pub commits: usize,
    pub blobs: usize,
    pub branches: usize,
}

/// An external store that holds one serialized repository state.
pub trait Remote {
    fn push(&self, state: &RepoState) -> Result<()>;

    /// `None` when nothing has been pushed yet.
    fn fetch(&self) -> Result<Option<RepoState>>;
}

/// Remote kept as a JSON file inside a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    dir: PathBuf,
}

impl DirectoryRemote {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// The default remote of a work tree: `<root>/.minigit-remote`.
    pub fn beside(root: &Path) -> Self {
        Self::new(root.join(REMOTE_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(REMOTE_STATE_FILE)
    }
}

impl Remote for DirectoryRemote {
    fn push(&self, state: &RepoState) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.state_path();
        let tmp = self.dir.join(format!("{REMOTE_STATE_FILE}.tmp"));
        let body = serde_json::to_vec(state)?;
        fs::write(&tmp, body).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;
        debug!(path = %path.display(), "wrote remote state");
        Ok(())
    }

    fn fetch(&self) -> Result<Option<RepoState>> {
        let path = self.state_path();
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&path, e)),
        };
        Ok(Some(serde_json::from_slice(&body)?))
    }
}

impl Repository {
    pub fn export_state(&self) -> Result<RepoState> {
        let _lock = self.read_lock()?;
        self.collect_state()
    }

    fn collect_state(&self) -> Result<RepoState> {
        let blobs = self
            .storage
            .blob_ids()?
            .into_iter()
            .map(|id| {
                let content = self
                    .storage
                    .get_blob(&id)?
                    .ok_or_else(|| Error::BlobNotFound(id.to_string()))?;
                Ok(BlobRecord { id, content })
            })
            .collect::<Result<Vec<_>>>()?;

        let commits = self
            .storage
            .commit_ids()?
            .into_iter()
            .map(|id| {
                self.storage
                    .get_commit(&id)?
                    .ok_or_else(|| Error::CommitNotFound(id.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RepoState {
            blobs,
            commits,
            branches: self.storage.list_branches()?,
            head: self.storage.get_head()?,
        })
    }

    /// Merges `state` into this repository.
    ///
    /// Every blob, commit and snapshot path is verified before it is written;
    /// any mismatch rolls the whole import back. Branches missing locally (or local
    /// branches without commits) take the incoming head. HEAD and the work
    /// tree are never touched.
    pub fn import_state(&mut self, state: &RepoState) -> Result<ImportReport> {
        let _lock = self.write_lock()?;

        let mut commits: Vec<&Commit> = state.commits.iter().collect();
        commits.sort_by_key(|c| (c.generation, c.sequence));

        let report = self.storage.transaction(|storage| {
            let mut report = ImportReport::default();

            for blob in &state.blobs {
                if ObjectId::of(&blob.content) != blob.id {
                    return Err(Error::GraphInconsistency(format!(
                        "imported blob {} does not match its content",
                        blob.id
                    )));
                }
                if storage.insert_blob(&blob.id, &blob.content)? {
                    report.blobs += 1;
                }
            }

            for commit in commits {
                if storage.has_commit(&commit.id)? {
                    continue;
                }
                if !commit.verify_id() {
                    return Err(Error::GraphInconsistency(format!(
                        "imported commit {} does not match its content",
                        commit.id
                    )));
                }
                let mut generation = 0;
                for parent in &commit.parents {
                    let parent_commit = storage.get_commit(parent)?.ok_or_else(|| {
                        Error::GraphInconsistency(format!(
                            "imported commit {} references unknown parent {parent}",
                            commit.id
                        ))
                    })?;
                    generation = generation.max(parent_commit.generation);
                }
                for (path, blob) in &commit.snapshot {
                    validate_snapshot_path(path)?;
                    if !storage.has_blob(blob)? {
                        return Err(Error::BlobNotFound(blob.to_string()));
                    }
                }

                let mut local = commit.clone();
                local.generation = generation + 1;
                storage.insert_commit(&local)?;
                storage.observe_sequence(local.sequence)?;
                report.commits += 1;
            }

            for branch in &state.branches {
                let Some(head) = &branch.head else {
                    continue;
                };
                validate_branch_name(&branch.name)?;
                if !storage.has_commit(head)? {
                    return Err(Error::GraphInconsistency(format!(
                        "imported branch {} points at unknown commit {head}",
                        branch.name
                    )));
                }
                match storage.get_branch(&branch.name)? {
                    None => {
                        storage.put_branch(&branch.name, Some(head))?;
                        report.branches_created.push(branch.name.clone());
                    }
                    Some(Branch { head: None, .. }) => {
                        storage.put_branch(&branch.name, Some(head))?;
                        report.adopted.push(branch.name.clone());
                    }
                    Some(Branch {
                        head: Some(local), ..
                    }) if local != *head => {
                        report.diverged.push(branch.name.clone());
                    }
                    Some(_) => {}
                }
            }

            Ok(report)
        })?;

        if !report.diverged.is_empty() {
            warn!(branches = ?report.diverged, "imported branches diverge from local heads");
        }
        info!(
            commits = report.commits,
            blobs = report.blobs,
            "imported repository state"
        );
        self.emit(RepoEvent::StateImported {
            commits: report.commits,
            blobs: report.blobs,
            diverged: report.diverged.clone(),
        });
        Ok(report)
    }

    /// Replaces the remote's state with this repository's.
    pub fn push(&self, remote: &dyn Remote) -> Result<PushReport> {
        let state = self.export_state()?;
        remote.push(&state)?;
        let report = PushReport {
            commits: state.commits.len(),
            blobs: state.blobs.len(),
            branches: state.branches.len(),
        };
        info!(commits = report.commits, blobs = report.blobs, "pushed repository state");
        Ok(report)
    }

    /// Imports the remote's state; `None` if the remote is empty.
    pub fn pull(&mut self, remote: &dyn Remote) -> Result<Option<ImportReport>> {
        match remote.fetch()? {
            Some(state) => self.import_state(&state).map(Some),
            None => Ok(None),
        }
    }
}

mod hex_content {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepoConfig, Snapshot};
    use chrono::Utc;

    fn repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), RepoConfig::default()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_blob_content_is_hex_encoded() {
        let record = BlobRecord {
            id: ObjectId::of(b"hi"),
            content: b"hi".to_vec(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["content"], "6869");
        let back: BlobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_import_into_empty_repository_reproduces_history() {
        let (src_dir, mut src) = repo();
        fs::write(src_dir.path().join("a.txt"), "one").unwrap();
        let first = src.commit("first", Some("alice")).unwrap();
        fs::write(src_dir.path().join("a.txt"), "two").unwrap();
        let second = src.commit("second", Some("alice")).unwrap();
        src.create_branch("feature").unwrap();

        let (_dst_dir, mut dst) = repo();
        let report = dst.import_state(&src.export_state().unwrap()).unwrap();

        assert_eq!(report.commits, 2);
        assert_eq!(report.blobs, 2);
        assert_eq!(report.branches_created, vec!["feature"]);
        assert!(report.diverged.is_empty());
        assert_eq!(dst.get_commit(&first.id).unwrap(), first);
        assert_eq!(dst.resolve_commit("main").unwrap(), second.id);
    }

    #[test]
    fn test_import_is_idempotent_and_reports_divergence() {
        let (src_dir, mut src) = repo();
        fs::write(src_dir.path().join("a.txt"), "shared").unwrap();
        src.commit("shared", None).unwrap();
        let state = src.export_state().unwrap();

        let (dst_dir, mut dst) = repo();
        dst.import_state(&state).unwrap();
        let again = dst.import_state(&state).unwrap();
        assert_eq!(again, ImportReport::default());

        fs::write(dst_dir.path().join("local.txt"), "local").unwrap();
        dst.commit("local work", None).unwrap();
        fs::write(src_dir.path().join("a.txt"), "remote").unwrap();
        src.commit("remote work", None).unwrap();

        let report = dst.import_state(&src.export_state().unwrap()).unwrap();
        assert_eq!(report.commits, 1);
        assert_eq!(report.diverged, vec!["main"]);
    }

    #[test]
    fn test_import_rejects_tampered_commit() {
        let (src_dir, mut src) = repo();
        fs::write(src_dir.path().join("a.txt"), "x").unwrap();
        src.commit("honest", None).unwrap();
        let mut state = src.export_state().unwrap();
        state.commits[0].message = "forged".to_string();

        let (_dst_dir, mut dst) = repo();
        let result = dst.import_state(&state);
        assert!(matches!(result, Err(Error::GraphInconsistency(_))));
        assert_eq!(dst.export_state().unwrap().blobs.len(), 0);
    }

    #[test]
    fn test_import_rejects_paths_outside_work_tree() {
        let (src_dir, mut src) = repo();
        fs::write(src_dir.path().join("a.txt"), "payload").unwrap();
        let first = src.commit("first", None).unwrap();
        let mut state = src.export_state().unwrap();

        let snapshot: Snapshot = [("../escape.txt".to_string(), ObjectId::of(b"payload"))]
            .into_iter()
            .collect();
        let timestamp = Utc::now();
        let parents = vec![first.id.clone()];
        let id = Commit::compute_id(&parents, &snapshot, "escape", "mallory", &timestamp, 99);
        state.commits.push(Commit {
            id: id.clone(),
            parents,
            snapshot,
            message: "escape".to_string(),
            author: "mallory".to_string(),
            timestamp,
            sequence: 99,
            generation: 2,
        });
        state.branches.push(Branch {
            name: "escape".to_string(),
            head: Some(id),
        });

        let (dst_dir, mut dst) = repo();
        let result = dst.import_state(&state);
        assert!(matches!(result, Err(Error::GraphInconsistency(_))));
        assert!(dst.switch_branch("escape").is_err());
        assert_eq!(dst.export_state().unwrap().commits.len(), 0);
        assert!(!dst_dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn test_pull_into_fresh_repository_then_restore_missing() {
        let (src_dir, mut src) = repo();
        fs::create_dir(src_dir.path().join("docs")).unwrap();
        fs::write(src_dir.path().join("a.txt"), "a").unwrap();
        fs::write(src_dir.path().join("docs/b.txt"), "b").unwrap();
        src.commit("first", None).unwrap();

        let (dst_dir, mut dst) = repo();
        let report = dst.import_state(&src.export_state().unwrap()).unwrap();
        assert_eq!(report.adopted, vec!["main"]);
        assert_eq!(dst.changes().unwrap().deleted, vec!["a.txt", "docs/b.txt"]);

        fs::write(dst_dir.path().join("a.txt"), "local edit").unwrap();
        let restored = dst.restore_missing().unwrap();
        assert_eq!(restored, vec!["docs/b.txt"]);
        assert_eq!(fs::read_to_string(dst_dir.path().join("docs/b.txt")).unwrap(), "b");
        assert_eq!(fs::read_to_string(dst_dir.path().join("a.txt")).unwrap(), "local edit");
        assert_eq!(dst.changes().unwrap().modified, vec!["a.txt"]);
    }

    #[test]
    fn test_directory_remote_push_and_pull() {
        let (src_dir, mut src) = repo();
        let remote_dir = tempfile::tempdir().unwrap();
        let remote = DirectoryRemote::new(remote_dir.path().join("remote"));
        assert!(remote.fetch().unwrap().is_none());

        fs::write(src_dir.path().join("a.txt"), "pushed").unwrap();
        let commit = src.commit("pushed", None).unwrap();
        let pushed = src.push(&remote).unwrap();
        assert_eq!(pushed.commits, 1);

        let (_dst_dir, mut dst) = repo();
        let report = dst.pull(&remote).unwrap().unwrap();
        assert_eq!(report.commits, 1);
        assert_eq!(dst.head().unwrap(), Some(commit.id));
    }

    #[test]
    fn test_default_remote_is_ignored_by_scans() {
        let (dir, mut repo) = repo();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        repo.commit("first", None).unwrap();
        repo.push(&DirectoryRemote::beside(repo.root())).unwrap();
        assert!(repo.changes().unwrap().is_empty());
    }
}
