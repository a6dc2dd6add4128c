use crate::checkout::Checkout;
use crate::detector::{validate_snapshot_path, worktree_path, ChangeDetector};
use crate::diff::FileDiff;
use crate::error::{Error, Result};
use crate::events::{EventRecord, EventSink, NullSink, RepoEvent};
use crate::graph::{snapshot_delta, CommitGraph};
use crate::hash::ObjectId;
use crate::ignore::IgnoreRules;
use crate::lock::{RepoLock, DEFAULT_LOCK_TIMEOUT};
use crate::models::{
    author_or_anonymous, Branch, ChangeSet, Commit, LogEntry, RepoConfig, Snapshot, Status,
};
use crate::storage::Storage;
use crate::store::ContentStore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const REPO_DIR: &str = ".minigit";
pub const DB_FILE: &str = "minigit.db";
pub const REMOTE_DIR: &str = ".minigit-remote";

/// A work tree plus its `.minigit` database.
///
/// Methods that change repository state take `&mut self` and hold the
/// exclusive repository lock for their whole run; read-only methods take
/// `&self` and a shared lock.
pub struct Repository {
    pub(crate) root: PathBuf,
    pub(crate) storage: Storage,
    pub(crate) config: RepoConfig,
    pub(crate) rules: IgnoreRules,
    sink: Box<dyn EventSink>,
    lock_timeout: Duration,
}

impl Repository {
    pub fn init<P: AsRef<Path>>(root: P, config: RepoConfig) -> Result<Self> {
        Self::init_with_sink(root, config, Box::new(NullSink))
    }

    pub fn init_with_sink<P: AsRef<Path>>(
        root: P,
        config: RepoConfig,
        sink: Box<dyn EventSink>,
    ) -> Result<Self> {
        let root = canonical_root(root.as_ref())?;
        let repo_dir = root.join(REPO_DIR);
        if repo_dir.join(DB_FILE).exists() {
            return Err(Error::AlreadyInitialized(root));
        }
        validate_branch_name(&config.default_branch)?;
        std::fs::create_dir_all(&repo_dir).map_err(|e| Error::io(&repo_dir, e))?;

        let storage = Storage::new(repo_dir.join(DB_FILE))?;
        storage.transaction(|s| {
            s.set_config(&config)?;
            s.put_branch(&config.default_branch, None)?;
            s.set_head(&config.default_branch)
        })?;

        info!(root = %root.display(), branch = %config.default_branch, "initialized repository");
        let repo = Self::assemble(root, storage, config, sink);
        repo.emit(RepoEvent::RepositoryInitialized {
            branch: repo.config.default_branch.clone(),
        });
        Ok(repo)
    }

    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = canonical_root(root.as_ref())?;
        let db_path = root.join(REPO_DIR).join(DB_FILE);
        if !db_path.is_file() {
            return Err(Error::NotARepository(root));
        }

        let storage = Storage::new(&db_path)?;
        let config = storage.get_config()?.unwrap_or_default();
        if storage.get_head()?.is_none() {
            return Err(Error::GraphInconsistency("HEAD is not set".to_string()));
        }
        Ok(Self::assemble(root, storage, config, Box::new(NullSink)))
    }

    /// Opens the repository containing `start`, searching upwards.
    pub fn discover<P: AsRef<Path>>(start: P) -> Result<Self> {
        let start = canonical_root(start.as_ref())?;
        let found = start
            .ancestors()
            .find(|dir| dir.join(REPO_DIR).join(DB_FILE).is_file());
        match found {
            Some(root) => Self::open(root),
            None => Err(Error::NotARepository(start)),
        }
    }

    /// Removes the repository metadata, leaving the work tree alone.
    pub fn destroy<P: AsRef<Path>>(root: P) -> Result<()> {
        let root = canonical_root(root.as_ref())?;
        let repo_dir = root.join(REPO_DIR);
        if !repo_dir.join(DB_FILE).is_file() {
            return Err(Error::NotARepository(root));
        }
        let _lock = RepoLock::exclusive(&repo_dir, DEFAULT_LOCK_TIMEOUT)?;
        std::fs::remove_dir_all(&repo_dir).map_err(|e| Error::io(&repo_dir, e))?;
        info!(root = %root.display(), "removed repository");
        Ok(())
    }

    fn assemble(
        root: PathBuf,
        storage: Storage,
        config: RepoConfig,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let rules = IgnoreRules::new(&config.ignore_patterns);
        Self {
            root,
            storage,
            config,
            rules,
            sink,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_event_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.root.join(REPO_DIR)
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    // Internal helpers; none of these take the repository lock.

    pub(crate) fn write_lock(&self) -> Result<RepoLock> {
        RepoLock::exclusive(&self.repo_dir(), self.lock_timeout)
    }

    pub(crate) fn read_lock(&self) -> Result<RepoLock> {
        RepoLock::shared(&self.repo_dir(), self.lock_timeout)
    }

    pub(crate) fn emit(&self, event: RepoEvent) {
        debug!(event = event.name(), "emitting event");
        self.sink.emit(&EventRecord::now(event));
    }

    pub(crate) fn detector(&self) -> ChangeDetector<'_> {
        ChangeDetector::new(&self.root, &self.rules, &self.storage)
    }

    pub(crate) fn current_branch_name(&self) -> Result<String> {
        self.storage
            .get_head()?
            .ok_or_else(|| Error::GraphInconsistency("HEAD is not set".to_string()))
    }

    pub(crate) fn current_branch(&self) -> Result<Branch> {
        let name = self.current_branch_name()?;
        self.storage.get_branch(&name)?.ok_or_else(|| {
            Error::GraphInconsistency(format!("HEAD names missing branch {name}"))
        })
    }

    pub(crate) fn head_snapshot(&self) -> Result<Snapshot> {
        match self.current_branch()?.head {
            Some(id) => Ok(CommitGraph::new(&self.storage).get(&id)?.snapshot),
            None => Ok(Snapshot::new()),
        }
    }

    /// `base` with the work tree's changes applied; new content is stored as blobs.
    pub(crate) fn build_snapshot(&self, base: &Snapshot, changes: &ChangeSet) -> Result<Snapshot> {
        let store = ContentStore::new(&self.storage);
        let mut snapshot = base.clone();
        for path in &changes.deleted {
            snapshot.remove(path);
        }
        for path in changes.added.iter().chain(&changes.modified) {
            let full = worktree_path(&self.root, path);
            let content = std::fs::read(&full).map_err(|e| Error::io(&full, e))?;
            snapshot.insert(path.clone(), store.put(&content)?);
        }
        Ok(snapshot)
    }

    /// Appends a commit and advances the current branch in one transaction.
    pub(crate) fn record_commit(
        &self,
        parents: Vec<ObjectId>,
        snapshot: Snapshot,
        message: &str,
        author: &str,
        finishes_merge: bool,
    ) -> Result<Commit> {
        let branch = self.current_branch_name()?;
        let previous = self
            .current_branch()?
            .head
            .map(|id| CommitGraph::new(&self.storage).get(&id))
            .transpose()?
            .map(|c| c.snapshot)
            .unwrap_or_default();

        let commit = self.storage.transaction(|storage| {
            let commit = CommitGraph::new(storage).append(parents, snapshot, message, author)?;
            storage.put_branch(&branch, Some(&commit.id))?;
            if finishes_merge {
                storage.clear_pending_merge()?;
            }
            Ok(commit)
        })?;

        info!(commit = %commit.id.short(), branch = %branch, "created commit");
        self.emit(RepoEvent::CommitCreated {
            id: commit.id.clone(),
            branch,
            parents: commit.parents.clone(),
            files: snapshot_delta(&previous, &commit.snapshot).len(),
        });
        Ok(commit)
    }

    // Queries

    pub fn current_branch_label(&self) -> Result<String> {
        let _lock = self.read_lock()?;
        self.current_branch_name()
    }

    pub fn head(&self) -> Result<Option<ObjectId>> {
        let _lock = self.read_lock()?;
        Ok(self.current_branch()?.head)
    }

    pub fn get_commit(&self, id: &ObjectId) -> Result<Commit> {
        let _lock = self.read_lock()?;
        CommitGraph::new(&self.storage).get(id)
    }

    /// Resolves a branch name, a full commit id or a unique id prefix.
    pub fn resolve_commit(&self, rev: &str) -> Result<ObjectId> {
        let _lock = self.read_lock()?;

        if let Some(branch) = self.storage.get_branch(rev)? {
            return branch.head.ok_or(Error::EmptyRepository);
        }
        if let Some(id) = ObjectId::parse(rev) {
            if self.storage.has_commit(&id)? {
                return Ok(id);
            }
        }
        if rev.len() >= 4 {
            let matches: Vec<ObjectId> = self
                .storage
                .commit_ids()?
                .into_iter()
                .filter(|id| id.as_str().starts_with(rev))
                .collect();
            if let [only] = matches.as_slice() {
                return Ok(only.clone());
            }
        }
        Err(Error::CommitNotFound(rev.to_string()))
    }

    /// Work-tree differences against the current head.
    pub fn changes(&self) -> Result<ChangeSet> {
        let _lock = self.read_lock()?;
        self.detector().scan(&self.head_snapshot()?)
    }

    pub fn status(&self) -> Result<Status> {
        let _lock = self.read_lock()?;
        let branch = self.current_branch()?;
        let snapshot = self.head_snapshot()?;
        Ok(Status {
            branch: branch.name,
            head: branch.head,
            changes: self.detector().scan(&snapshot)?,
            pending_merge: self.storage.get_pending_merge()?,
        })
    }

    /// History reachable from the current head, newest first (breadth-first).
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        let _lock = self.read_lock()?;
        match self.current_branch()?.head {
            Some(head) => CommitGraph::new(&self.storage).log(&head, limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn ancestors_of(&self, id: &ObjectId) -> Result<Vec<Commit>> {
        let _lock = self.read_lock()?;
        CommitGraph::new(&self.storage).ancestors(id).collect()
    }

    pub fn lowest_common_ancestor(&self, a: &ObjectId, b: &ObjectId) -> Result<Option<Commit>> {
        let _lock = self.read_lock()?;
        CommitGraph::new(&self.storage).lowest_common_ancestor(a, b)
    }

    /// Blob content of a stored object.
    pub fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let _lock = self.read_lock()?;
        ContentStore::new(&self.storage).get(id)
    }

    /// Diff of the working file at `path` against the head (or `against`).
    ///
    /// A side that does not have the path counts as empty.
    pub fn diff_worktree(&self, path: &str, against: Option<&ObjectId>) -> Result<FileDiff> {
        let _lock = self.read_lock()?;

        let snapshot = match against {
            Some(id) => CommitGraph::new(&self.storage).get(id)?.snapshot,
            None => self.head_snapshot()?,
        };
        let stored_blob = snapshot.get(path).cloned();
        let stored = match &stored_blob {
            Some(blob) => ContentStore::new(&self.storage).get(blob)?,
            None => Vec::new(),
        };

        let full = worktree_path(&self.root, path);
        let working = match std::fs::read(&full) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::io(&full, e)),
        };
        if stored_blob.is_none() && working.is_none() {
            return Err(Error::PathNotTracked(path.to_string()));
        }
        let working_blob = working.as_deref().map(ObjectId::of);
        let working = working.unwrap_or_default();

        Ok(FileDiff::new(
            path,
            stored_blob,
            working_blob,
            &String::from_utf8_lossy(&stored),
            &String::from_utf8_lossy(&working),
        ))
    }

    /// Per-path diffs between two commits, for every path that differs.
    pub fn diff_commits(&self, from: &ObjectId, to: &ObjectId) -> Result<Vec<FileDiff>> {
        let _lock = self.read_lock()?;
        let graph = CommitGraph::new(&self.storage);
        let store = ContentStore::new(&self.storage);
        let old = graph.get(from)?.snapshot;
        let new = graph.get(to)?.snapshot;

        snapshot_delta(&old, &new)
            .into_iter()
            .map(|path| {
                let old_blob = old.get(&path).cloned();
                let new_blob = new.get(&path).cloned();
                let old_text = match &old_blob {
                    Some(id) => store.get(id)?,
                    None => Vec::new(),
                };
                let new_text = match &new_blob {
                    Some(id) => store.get(id)?,
                    None => Vec::new(),
                };
                Ok(FileDiff::new(
                    path,
                    old_blob,
                    new_blob,
                    &String::from_utf8_lossy(&old_text),
                    &String::from_utf8_lossy(&new_text),
                ))
            })
            .collect()
    }

    // Mutations

    /// Records the work tree as a new commit on the current branch.
    pub fn commit(&mut self, message: &str, author: Option<&str>) -> Result<Commit> {
        let _lock = self.write_lock()?;
        let changes = self.detector().scan(&self.head_snapshot()?)?;
        self.commit_changes(message, author, &changes)
    }

    /// Commits a change set computed by an earlier scan.
    ///
    /// Paths listed as added or modified are read from the work tree again.
    pub fn create_commit(
        &mut self,
        message: &str,
        author: Option<&str>,
        changes: &ChangeSet,
    ) -> Result<Commit> {
        let _lock = self.write_lock()?;
        self.commit_changes(message, author, changes)
    }

    fn commit_changes(
        &self,
        message: &str,
        author: Option<&str>,
        changes: &ChangeSet,
    ) -> Result<Commit> {
        if self.storage.get_pending_merge()?.is_some() {
            return Err(Error::MergeInProgress);
        }
        if changes.is_empty() {
            return Err(Error::NothingToCommit);
        }
        for path in changes.paths() {
            validate_snapshot_path(&path)?;
        }

        let branch = self.current_branch()?;
        let head_snapshot = self.head_snapshot()?;
        let snapshot = self.build_snapshot(&head_snapshot, changes)?;
        let parents = branch.head.into_iter().collect();
        self.record_commit(parents, snapshot, message, &author_or_anonymous(author), false)
    }

    /// Writes every file the current head tracks that is missing from the
    /// work tree. Files already present, modified or not, are left alone.
    pub fn restore_missing(&mut self) -> Result<Vec<String>> {
        let _lock = self.write_lock()?;

        let head_snapshot = self.head_snapshot()?;
        let changes = self.detector().scan(&head_snapshot)?;
        let checkout = Checkout::new(&self.root, ContentStore::new(&self.storage));

        let mut restored = Vec::new();
        for path in changes.deleted {
            let Some(blob) = head_snapshot.get(&path) else {
                continue;
            };
            checkout.write_blob(&path, blob)?;
            self.emit(RepoEvent::FileReverted {
                path: path.clone(),
                blob: blob.clone(),
            });
            restored.push(path);
        }
        self.detector().reset_cache()?;

        info!(files = restored.len(), "restored missing files");
        Ok(restored)
    }

    /// Restores one work-tree file to the version recorded by the current head.
    pub fn revert(&mut self, path: &str) -> Result<()> {
        let _lock = self.write_lock()?;

        let blob = self
            .head_snapshot()?
            .get(path)
            .cloned()
            .ok_or_else(|| Error::PathNotTracked(path.to_string()))?;
        Checkout::new(&self.root, ContentStore::new(&self.storage)).write_blob(path, &blob)?;

        info!(path, blob = %blob.short(), "reverted file");
        self.emit(RepoEvent::FileReverted {
            path: path.to_string(),
            blob,
        });
        Ok(())
    }
}

fn canonical_root(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| Error::io(path, e))
}

/// Branch names: no whitespace or control characters, no `..`, and no
/// leading `-` or `/`.
pub fn validate_branch_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('-')
        || name.starts_with('/')
        || name.ends_with('/')
        || name.contains("..")
        || name.chars().any(|c| c.is_whitespace() || c.is_control());
    if invalid {
        return Err(Error::InvalidBranchName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use std::fs;

    fn init() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), RepoConfig::default()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_init_and_open() {
        let (dir, repo) = init();
        assert_eq!(repo.current_branch_label().unwrap(), "main");
        assert!(repo.head().unwrap().is_none());
        drop(repo);

        let reopened = Repository::open(dir.path()).unwrap();
        assert_eq!(reopened.config(), &RepoConfig::default());
        assert!(matches!(
            Repository::init(dir.path(), RepoConfig::default()),
            Err(Error::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_open_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Repository::open(dir.path()),
            Err(Error::NotARepository(_))
        ));
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let (dir, _repo) = init();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let found = Repository::discover(&nested).unwrap();
        assert_eq!(found.root(), fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_commit_nothing_to_commit() {
        let (_dir, mut repo) = init();
        assert!(matches!(
            repo.commit("empty", None),
            Err(Error::NothingToCommit)
        ));
        assert_eq!(repo.storage.commit_count().unwrap(), 0);
        assert!(repo.head().unwrap().is_none());
    }

    #[test]
    fn test_commit_records_full_snapshot() {
        let (dir, mut repo) = init();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        let first = repo.commit("first", Some("alice")).unwrap();
        assert_eq!(first.author, "alice");
        assert!(first.parents.is_empty());

        fs::remove_file(dir.path().join("b.txt")).unwrap();
        fs::write(dir.path().join("a.txt"), "a2").unwrap();
        let second = repo.commit("second", None).unwrap();

        assert_eq!(second.parents, vec![first.id.clone()]);
        assert_eq!(second.author, "anonymous");
        assert_eq!(second.snapshot.len(), 1);
        assert_eq!(second.snapshot["a.txt"], ObjectId::of(b"a2"));
        assert_eq!(repo.head().unwrap(), Some(second.id));
    }

    #[test]
    fn test_events_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let mut repo =
            Repository::init_with_sink(dir.path(), RepoConfig::default(), Box::new(sink.clone()))
                .unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let commit = repo.commit("first", None).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            RepoEvent::CommitCreated {
                id: commit.id,
                branch: "main".into(),
                parents: vec![],
                files: 1,
            }
        );
    }

    #[test]
    fn test_revert_restores_head_content() {
        let (dir, mut repo) = init();
        fs::write(dir.path().join("a.txt"), "original").unwrap();
        repo.commit("first", None).unwrap();

        fs::write(dir.path().join("a.txt"), "scribbles").unwrap();
        repo.revert("a.txt").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "original");
        assert!(repo.changes().unwrap().is_empty());

        assert!(matches!(
            repo.revert("unknown.txt"),
            Err(Error::PathNotTracked(_))
        ));
    }

    #[test]
    fn test_resolve_commit_by_prefix_and_branch() {
        let (dir, mut repo) = init();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let commit = repo.commit("first", None).unwrap();

        assert_eq!(repo.resolve_commit("main").unwrap(), commit.id);
        assert_eq!(repo.resolve_commit(commit.id.short()).unwrap(), commit.id);
        assert_eq!(repo.resolve_commit(commit.id.as_str()).unwrap(), commit.id);
        assert!(repo.resolve_commit("zz").is_err());
    }

    #[test]
    fn test_diff_worktree_missing_everywhere() {
        let (_dir, repo) = init();
        assert!(matches!(
            repo.diff_worktree("nothing.txt", None),
            Err(Error::PathNotTracked(_))
        ));
    }

    #[test]
    fn test_destroy_removes_metadata() {
        let (dir, repo) = init();
        fs::write(dir.path().join("keep.txt"), "k").unwrap();
        drop(repo);
        Repository::destroy(dir.path()).unwrap();
        assert!(!dir.path().join(REPO_DIR).exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_branch_name_validation() {
        assert!(validate_branch_name("feature/login").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name("-flag").is_err());
        assert!(validate_branch_name("a..b").is_err());
    }
}
