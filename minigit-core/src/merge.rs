//! Three-way merge.
//!
//! The merge base is the lowest common ancestor of the two branch heads.
//! Every path is resolved against the base: a side that did not touch a
//! path yields to the side that did, identical changes collapse, and changes
//! that overlap in the base's line ranges become conflict regions written to
//! the work tree between markers. Nothing is committed while any conflict
//! remains; the pending merge is finished by [`Repository::resolve_and_commit`]
//! (keeping both parents) or dropped by [`Repository::abort_merge`].

use crate::checkout::Checkout;
use crate::detector::worktree_path;
use crate::diff::{edits, split_lines, Edit};
use crate::error::{Error, Result};
use crate::events::RepoEvent;
use crate::graph::CommitGraph;
use crate::hash::ObjectId;
use crate::models::{author_or_anonymous, Commit, PendingMerge, Snapshot};
use crate::repo::Repository;
use crate::store::ContentStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

pub const MARKER_OURS: &str = "<<<<<<<";
pub const MARKER_SEPARATOR: &str = "=======";
pub const MARKER_THEIRS: &str = ">>>>>>>";

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Clean(Commit),
    Conflicted(Vec<FileConflict>),
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, MergeOutcome::Clean(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Ours,
    Theirs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Both sides edited overlapping lines.
    Content,
    /// One side deleted the path, the other modified it.
    DeleteModify { deleted_by: Side },
    /// Both sides changed non-text content differently.
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRegion {
    /// 1-based line in the base version where the region starts.
    pub base_line: usize,
    pub base: Vec<String>,
    pub ours: Vec<String>,
    pub theirs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConflict {
    pub path: String,
    pub kind: ConflictKind,
    pub regions: Vec<ConflictRegion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMerge {
    pub content: String,
    pub conflicts: Vec<ConflictRegion>,
}

/// Result of resolving every path of a merge.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    /// Clean paths with their merged blobs; conflicted paths keep the side
    /// that should sit in the work tree underneath the markers.
    pub snapshot: Snapshot,
    pub conflicts: Vec<FileConflict>,
    /// Marker-annotated content for conflicted text files.
    pub marked_files: BTreeMap<String, String>,
}

/// Labels written after the conflict markers.
#[derive(Debug, Clone, Copy)]
pub struct MergeLabels<'a> {
    pub ours: &'a str,
    pub theirs: &'a str,
}

struct Group {
    start: usize,
    end: usize,
    ours: Vec<Edit>,
    theirs: Vec<Edit>,
}

impl Group {
    fn overlaps(&self, edit: &Edit) -> bool {
        edit.base.start < self.end || edit.base.start == self.start
    }
}

/// Line-based three-way merge of `ours` and `theirs` against `base`.
pub fn merge_text(base: &str, ours: &str, theirs: &str, labels: MergeLabels<'_>) -> TextMerge {
    let base_lines = split_lines(base);
    let our_lines = split_lines(ours);
    let their_lines = split_lines(theirs);

    let mut tagged: Vec<(Side, Edit)> = edits(&base_lines, &our_lines)
        .into_iter()
        .map(|e| (Side::Ours, e))
        .chain(
            edits(&base_lines, &their_lines)
                .into_iter()
                .map(|e| (Side::Theirs, e)),
        )
        .collect();
    tagged.sort_by_key(|(_, e)| (e.base.start, e.base.end));

    let mut groups: Vec<Group> = Vec::new();
    for (side, edit) in tagged {
        if !groups.last().is_some_and(|g| g.overlaps(&edit)) {
            groups.push(Group {
                start: edit.base.start,
                end: edit.base.end,
                ours: Vec::new(),
                theirs: Vec::new(),
            });
        }
        let Some(group) = groups.last_mut() else {
            continue;
        };
        group.end = group.end.max(edit.base.end);
        match side {
            Side::Ours => group.ours.push(edit),
            Side::Theirs => group.theirs.push(edit),
        }
    }

    let mut content = String::with_capacity(base.len().max(ours.len()).max(theirs.len()));
    let mut conflicts = Vec::new();
    let mut cursor = 0;

    for group in &groups {
        push_lines(&mut content, &base_lines[cursor..group.start]);
        let our_version = apply_edits(&base_lines, &our_lines, group.start, group.end, &group.ours);
        let their_version =
            apply_edits(&base_lines, &their_lines, group.start, group.end, &group.theirs);

        if group.theirs.is_empty() || our_version == their_version {
            push_lines(&mut content, &our_version);
        } else if group.ours.is_empty() {
            push_lines(&mut content, &their_version);
        } else {
            push_section(&mut content, &format!("{MARKER_OURS} {}\n", labels.ours), &our_version);
            push_section(&mut content, &format!("{MARKER_SEPARATOR}\n"), &their_version);
            content.push_str(&format!("{MARKER_THEIRS} {}\n", labels.theirs));
            conflicts.push(ConflictRegion {
                base_line: group.start + 1,
                base: display(&base_lines[group.start..group.end]),
                ours: display(&our_version),
                theirs: display(&their_version),
            });
        }
        cursor = group.end;
    }
    push_lines(&mut content, &base_lines[cursor..]);

    TextMerge { content, conflicts }
}

/// One side's rendering of base lines `start..end` with its edits applied.
fn apply_edits<'t>(
    base: &[&'t str],
    side: &[&'t str],
    start: usize,
    end: usize,
    edits: &[Edit],
) -> Vec<&'t str> {
    let mut out = Vec::new();
    let mut cursor = start;
    for edit in edits {
        out.extend_from_slice(&base[cursor..edit.base.start]);
        out.extend_from_slice(&side[edit.other.clone()]);
        cursor = edit.base.end;
    }
    out.extend_from_slice(&base[cursor..end]);
    out
}

fn push_lines(content: &mut String, lines: &[&str]) {
    for line in lines {
        content.push_str(line);
    }
}

fn push_section(content: &mut String, header: &str, lines: &[&str]) {
    content.push_str(header);
    push_lines(content, lines);
    if lines.last().is_some_and(|l| !l.ends_with('\n')) {
        content.push('\n');
    }
}

fn display(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.trim_end_matches('\n').trim_end_matches('\r').to_string())
        .collect()
}

/// Whether text still carries a full set of conflict markers.
pub fn has_conflict_markers(text: &str) -> bool {
    let mut seen_ours = false;
    let mut seen_separator = false;
    for line in text.lines() {
        if line.starts_with(MARKER_OURS) {
            seen_ours = true;
        } else if seen_ours && line == MARKER_SEPARATOR {
            seen_separator = true;
        } else if seen_separator && line.starts_with(MARKER_THEIRS) {
            return true;
        }
    }
    false
}

/// Path-level merge driver.
pub struct MergeCoordinator<'a> {
    store: ContentStore<'a>,
    store_merged: bool,
}

impl<'a> MergeCoordinator<'a> {
    pub fn new(store: ContentStore<'a>) -> Self {
        Self {
            store,
            store_merged: true,
        }
    }

    /// A coordinator that only reads; cleanly merged text is hashed but not
    /// written to the store.
    pub fn preview(store: ContentStore<'a>) -> Self {
        Self {
            store,
            store_merged: false,
        }
    }

    pub fn plan(
        &self,
        base: &Snapshot,
        ours: &Snapshot,
        theirs: &Snapshot,
        labels: MergeLabels<'_>,
    ) -> Result<MergePlan> {
        let paths: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
        let mut plan = MergePlan::default();

        for path in paths {
            let b = base.get(path);
            let o = ours.get(path);
            let t = theirs.get(path);

            let resolved = if o == t || t == b {
                o
            } else if o == b {
                t
            } else {
                self.merge_both_changed(&mut plan, path, b, o, t, labels)?;
                continue;
            };
            if let Some(blob) = resolved {
                plan.snapshot.insert(path.clone(), blob.clone());
            }
        }

        Ok(plan)
    }

    fn merge_both_changed(
        &self,
        plan: &mut MergePlan,
        path: &str,
        base: Option<&ObjectId>,
        ours: Option<&ObjectId>,
        theirs: Option<&ObjectId>,
        labels: MergeLabels<'_>,
    ) -> Result<()> {
        let (ours, theirs) = match (ours, theirs) {
            (Some(o), Some(t)) => (o, t),
            (None, Some(kept)) | (Some(kept), None) => {
                let deleted_by = if ours.is_none() { Side::Ours } else { Side::Theirs };
                plan.snapshot.insert(path.to_string(), kept.clone());
                plan.conflicts.push(FileConflict {
                    path: path.to_string(),
                    kind: ConflictKind::DeleteModify { deleted_by },
                    regions: Vec::new(),
                });
                return Ok(());
            }
            (None, None) => return Ok(()),
        };

        let base_bytes = match base {
            Some(id) => self.store.get(id)?,
            None => Vec::new(),
        };
        let our_bytes = self.store.get(ours)?;
        let their_bytes = self.store.get(theirs)?;

        let texts = (
            String::from_utf8(base_bytes),
            String::from_utf8(our_bytes),
            String::from_utf8(their_bytes),
        );
        let (Ok(base_text), Ok(our_text), Ok(their_text)) = texts else {
            plan.snapshot.insert(path.to_string(), ours.clone());
            plan.conflicts.push(FileConflict {
                path: path.to_string(),
                kind: ConflictKind::Binary,
                regions: Vec::new(),
            });
            return Ok(());
        };

        let merged = merge_text(&base_text, &our_text, &their_text, labels);
        if merged.conflicts.is_empty() {
            let blob = if self.store_merged {
                self.store.put(merged.content.as_bytes())?
            } else {
                ObjectId::of(merged.content.as_bytes())
            };
            plan.snapshot.insert(path.to_string(), blob);
        } else {
            plan.snapshot.insert(path.to_string(), ours.clone());
            plan.marked_files.insert(path.to_string(), merged.content);
            plan.conflicts.push(FileConflict {
                path: path.to_string(),
                kind: ConflictKind::Content,
                regions: merged.conflicts,
            });
        }
        Ok(())
    }
}

struct MergeHeads {
    current: String,
    ours: Commit,
    theirs: Commit,
    base: Commit,
}

impl Repository {
    fn merge_heads(&self, source: &str) -> Result<MergeHeads> {
        let current = self.current_branch_name()?;
        let source_branch = self
            .storage
            .get_branch(source)?
            .ok_or_else(|| Error::BranchNotFound(source.to_string()))?;

        let graph = CommitGraph::new(&self.storage);
        let ours = match self.current_branch()?.head {
            Some(id) => graph.get(&id)?,
            None => return Err(Error::EmptyRepository),
        };
        let theirs = match source_branch.head {
            Some(id) => graph.get(&id)?,
            None => return Err(Error::EmptyRepository),
        };
        let base = graph
            .lowest_common_ancestor(&ours.id, &theirs.id)?
            .ok_or_else(|| {
                Error::GraphInconsistency(format!(
                    "branches {current} and {source} share no common ancestor"
                ))
            })?;

        Ok(MergeHeads {
            current,
            ours,
            theirs,
            base,
        })
    }

    /// Conflicts that merging `source` into the current branch would produce.
    /// Neither the work tree nor the repository is changed.
    pub fn detect_conflicts(&self, source: &str) -> Result<Vec<FileConflict>> {
        let _lock = self.read_lock()?;

        let heads = self.merge_heads(source)?;
        let labels = MergeLabels {
            ours: &heads.current,
            theirs: source,
        };
        let plan = MergeCoordinator::preview(ContentStore::new(&self.storage)).plan(
            &heads.base.snapshot,
            &heads.ours.snapshot,
            &heads.theirs.snapshot,
            labels,
        )?;
        debug!(source, conflicts = plan.conflicts.len(), "detected merge conflicts");
        Ok(plan.conflicts)
    }

    /// Merges `source` into the current branch.
    ///
    /// A clean merge writes the merged tree before recording the merge
    /// commit. If writing fails the branch head is not moved; files written
    /// before the failure stay and show up as uncommitted changes.
    pub fn merge(&mut self, source: &str, author: Option<&str>) -> Result<MergeOutcome> {
        let _lock = self.write_lock()?;

        if self.storage.get_pending_merge()?.is_some() {
            return Err(Error::MergeInProgress);
        }
        let MergeHeads {
            current,
            ours,
            theirs,
            base,
        } = self.merge_heads(source)?;

        let changes = self.detector().scan(&ours.snapshot)?;
        if !changes.is_empty() {
            warn!(paths = changes.len(), "merge refused: uncommitted changes");
            return Err(Error::UncommittedChanges(changes.paths()));
        }

        info!(
            ours = %ours.id.short(),
            theirs = %theirs.id.short(),
            base = %base.id.short(),
            "merging {source} into {current}"
        );

        let labels = MergeLabels {
            ours: &current,
            theirs: source,
        };
        let plan = MergeCoordinator::new(ContentStore::new(&self.storage)).plan(
            &base.snapshot,
            &ours.snapshot,
            &theirs.snapshot,
            labels,
        )?;

        if plan.conflicts.is_empty() {
            Checkout::new(&self.root, ContentStore::new(&self.storage))
                .apply(&ours.snapshot, &plan.snapshot)?;
            self.detector().reset_cache()?;

            let mut parents = vec![ours.id.clone()];
            if theirs.id != ours.id {
                parents.push(theirs.id.clone());
            }
            let message = format!("Merge branch '{source}' into {current}");
            let commit = self.record_commit(
                parents,
                plan.snapshot,
                &message,
                &author_or_anonymous(author),
                false,
            )?;

            self.emit(RepoEvent::MergeCompleted {
                source: source.to_string(),
                into: current,
                commit: commit.id.clone(),
            });
            return Ok(MergeOutcome::Clean(commit));
        }

        let checkout = Checkout::new(&self.root, ContentStore::new(&self.storage));
        checkout.apply(&ours.snapshot, &plan.snapshot)?;
        for (path, content) in &plan.marked_files {
            checkout.write_bytes(path, content.as_bytes())?;
        }
        self.detector().reset_cache()?;

        let conflicted_paths: Vec<String> = plan.conflicts.iter().map(|c| c.path.clone()).collect();
        self.storage.set_pending_merge(&PendingMerge {
            source_branch: source.to_string(),
            source_head: theirs.id.clone(),
            base: base.id.clone(),
            conflicted_paths: conflicted_paths.clone(),
        })?;

        warn!(paths = conflicted_paths.len(), "merge stopped on conflicts");
        self.emit(RepoEvent::MergeConflicted {
            source: source.to_string(),
            into: current,
            paths: conflicted_paths,
        });
        Ok(MergeOutcome::Conflicted(plan.conflicts))
    }

    pub fn pending_merge(&self) -> Result<Option<PendingMerge>> {
        let _lock = self.read_lock()?;
        self.storage.get_pending_merge()
    }

    /// Commits the resolved work tree as a merge of the current head and the
    /// pending source head.
    pub fn resolve_and_commit(&mut self, message: &str, author: Option<&str>) -> Result<Commit> {
        let _lock = self.write_lock()?;

        let pending = self
            .storage
            .get_pending_merge()?
            .ok_or(Error::NoMergeInProgress)?;

        let mut unresolved = Vec::new();
        for path in &pending.conflicted_paths {
            let full = worktree_path(&self.root, path);
            // A deleted file counts as resolved.
            let marked = match std::fs::read(&full) {
                Ok(bytes) => has_conflict_markers(&String::from_utf8_lossy(&bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(Error::io(&full, e)),
            };
            if marked {
                unresolved.push(path.clone());
            }
        }
        if !unresolved.is_empty() {
            return Err(Error::UnresolvedConflicts(unresolved));
        }

        let head = self.current_branch()?.head.ok_or(Error::EmptyRepository)?;
        let head_snapshot = CommitGraph::new(&self.storage).get(&head)?.snapshot;
        let changes = self.detector().scan(&head_snapshot)?;
        let snapshot = self.build_snapshot(&head_snapshot, &changes)?;

        let commit = self.record_commit(
            vec![head, pending.source_head.clone()],
            snapshot,
            message,
            &author_or_anonymous(author),
            true,
        )?;
        self.detector().reset_cache()?;

        self.emit(RepoEvent::MergeCompleted {
            source: pending.source_branch,
            into: self.current_branch_name()?,
            commit: commit.id.clone(),
        });
        Ok(commit)
    }

    /// Drops a pending merge and restores the work tree to the current head.
    pub fn abort_merge(&mut self) -> Result<()> {
        let _lock = self.write_lock()?;

        let pending = self
            .storage
            .get_pending_merge()?
            .ok_or(Error::NoMergeInProgress)?;

        let head_snapshot = self.head_snapshot()?;
        let on_disk = self.detector().digest_tree()?;
        Checkout::new(&self.root, ContentStore::new(&self.storage)).apply(&on_disk, &head_snapshot)?;
        self.storage.clear_pending_merge()?;
        self.detector().reset_cache()?;

        self.emit(RepoEvent::MergeAborted {
            source: pending.source_branch,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepoConfig;
    use crate::storage::Storage;
    use std::fs;

    const LABELS: MergeLabels<'static> = MergeLabels {
        ours: "main",
        theirs: "feature",
    };

    #[test]
    fn test_merge_text_non_overlapping_edits() {
        let base = "a\nb\nc\nd\ne\n";
        let ours = "A\nb\nc\nd\ne\n";
        let theirs = "a\nb\nc\nd\nE\n";
        let merged = merge_text(base, ours, theirs, LABELS);
        assert!(merged.conflicts.is_empty());
        assert_eq!(merged.content, "A\nb\nc\nd\nE\n");
    }

    #[test]
    fn test_merge_text_same_line_conflicts() {
        let merged = merge_text("hello\n", "hello main\n", "hello feature\n", LABELS);
        assert_eq!(merged.conflicts.len(), 1);
        let region = &merged.conflicts[0];
        assert_eq!(region.base_line, 1);
        assert_eq!(region.ours, vec!["hello main"]);
        assert_eq!(region.theirs, vec!["hello feature"]);
        assert_eq!(
            merged.content,
            "<<<<<<< main\nhello main\n=======\nhello feature\n>>>>>>> feature\n"
        );
        assert!(has_conflict_markers(&merged.content));
    }

    #[test]
    fn test_merge_text_identical_changes_collapse() {
        let merged = merge_text("x\ny\n", "x\nY\n", "x\nY\n", LABELS);
        assert!(merged.conflicts.is_empty());
        assert_eq!(merged.content, "x\nY\n");
    }

    #[test]
    fn test_merge_text_only_one_side_changed() {
        let merged = merge_text("1\n2\n3\n", "1\n2\n3\n", "1\ntwo\n3\n4\n", LABELS);
        assert!(merged.conflicts.is_empty());
        assert_eq!(merged.content, "1\ntwo\n3\n4\n");
    }

    #[test]
    fn test_merge_text_insertions_at_same_point_conflict() {
        let merged = merge_text("a\nz\n", "a\nours\nz\n", "a\ntheirs\nz\n", LABELS);
        assert_eq!(merged.conflicts.len(), 1);
        assert!(merged.conflicts[0].base.is_empty());
        assert!(merged.content.starts_with("a\n<<<<<<< main\nours\n"));
        assert!(merged.content.ends_with(">>>>>>> feature\nz\n"));
    }

    #[test]
    fn test_merge_text_empty_base_both_added() {
        let merged = merge_text("", "one\n", "two\n", LABELS);
        assert_eq!(merged.conflicts.len(), 1);
        let same = merge_text("", "one\n", "one\n", LABELS);
        assert!(same.conflicts.is_empty());
        assert_eq!(same.content, "one\n");
    }

    #[test]
    fn test_markers_terminate_lines_without_newline() {
        let merged = merge_text("v", "ours", "theirs", LABELS);
        assert_eq!(
            merged.content,
            "<<<<<<< main\nours\n=======\ntheirs\n>>>>>>> feature\n"
        );
    }

    #[test]
    fn test_has_conflict_markers_requires_full_set() {
        assert!(!has_conflict_markers("<<<<<<< main\nonly the start\n"));
        assert!(!has_conflict_markers("=======\n"));
        assert!(!has_conflict_markers("plain text\n"));
    }

    fn snap(store: &ContentStore, entries: &[(&str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), store.put(c.as_bytes()).unwrap()))
            .collect()
    }

    #[test]
    fn test_plan_path_rules() {
        let storage = Storage::in_memory().unwrap();
        let store = ContentStore::new(&storage);
        let base = snap(&store, &[("keep", "k"), ("ours_edit", "o"), ("theirs_del", "t"), ("both_del", "b")]);
        let ours = snap(&store, &[("keep", "k"), ("ours_edit", "O"), ("theirs_del", "t"), ("new_ours", "n")]);
        let theirs = snap(&store, &[("keep", "k"), ("ours_edit", "o"), ("new_theirs", "m")]);

        let plan = MergeCoordinator::new(ContentStore::new(&storage))
            .plan(&base, &ours, &theirs, LABELS)
            .unwrap();

        assert!(plan.conflicts.is_empty());
        let paths: Vec<&str> = plan.snapshot.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["keep", "new_ours", "new_theirs", "ours_edit"]);
        assert_eq!(plan.snapshot["ours_edit"], ObjectId::of(b"O"));
    }

    #[test]
    fn test_plan_delete_modify_conflict() {
        let storage = Storage::in_memory().unwrap();
        let store = ContentStore::new(&storage);
        let base = snap(&store, &[("f", "v1\n")]);
        let ours = Snapshot::new();
        let theirs = snap(&store, &[("f", "v2\n")]);

        let plan = MergeCoordinator::new(ContentStore::new(&storage))
            .plan(&base, &ours, &theirs, LABELS)
            .unwrap();

        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(
            plan.conflicts[0].kind,
            ConflictKind::DeleteModify {
                deleted_by: Side::Ours
            }
        );
        assert_eq!(plan.snapshot["f"], ObjectId::of(b"v2\n"));
    }

    #[test]
    fn test_plan_merges_text_cleanly() {
        let storage = Storage::in_memory().unwrap();
        let store = ContentStore::new(&storage);
        let base = snap(&store, &[("f", "1\n2\n3\n")]);
        let ours = snap(&store, &[("f", "one\n2\n3\n")]);
        let theirs = snap(&store, &[("f", "1\n2\nthree\n")]);

        let plan = MergeCoordinator::new(ContentStore::new(&storage))
            .plan(&base, &ours, &theirs, LABELS)
            .unwrap();

        assert!(plan.conflicts.is_empty());
        let merged = store.get(&plan.snapshot["f"]).unwrap();
        assert_eq!(merged, b"one\n2\nthree\n");
    }

    #[test]
    fn test_plan_binary_conflict() {
        let storage = Storage::in_memory().unwrap();
        let store = ContentStore::new(&storage);
        let base = Snapshot::from([("bin".to_string(), store.put(&[0xff, 0x00]).unwrap())]);
        let ours = Snapshot::from([("bin".to_string(), store.put(&[0xff, 0x01]).unwrap())]);
        let theirs = Snapshot::from([("bin".to_string(), store.put(&[0xff, 0x02]).unwrap())]);

        let plan = MergeCoordinator::new(ContentStore::new(&storage))
            .plan(&base, &ours, &theirs, LABELS)
            .unwrap();
        assert_eq!(plan.conflicts[0].kind, ConflictKind::Binary);
        assert!(plan.marked_files.is_empty());
    }

    /// Repository where `main` and `feature` both edited `a.txt` since `base`.
    fn diverged_repo(ours: &str, theirs: &str) -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path(), RepoConfig::default()).unwrap();
        fs::write(dir.path().join("a.txt"), "1\n2\n3\n").unwrap();
        repo.commit("base", None).unwrap();
        repo.create_branch("feature").unwrap();

        repo.switch_branch("feature").unwrap();
        fs::write(dir.path().join("a.txt"), theirs).unwrap();
        repo.commit("feature edit", None).unwrap();

        repo.switch_branch("main").unwrap();
        fs::write(dir.path().join("a.txt"), ours).unwrap();
        repo.commit("main edit", None).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_detect_conflicts_leaves_repository_untouched() {
        let (dir, repo) = diverged_repo("main\n2\n3\n", "feature\n2\n3\n");
        let head = repo.head().unwrap();

        let conflicts = repo.detect_conflicts("feature").unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "a.txt");
        assert_eq!(conflicts[0].kind, ConflictKind::Content);
        assert_eq!(conflicts[0].regions[0].ours, vec!["main"]);
        assert_eq!(conflicts[0].regions[0].theirs, vec!["feature"]);

        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "main\n2\n3\n");
        assert_eq!(repo.head().unwrap(), head);
        assert!(repo.pending_merge().unwrap().is_none());
    }

    #[test]
    fn test_detect_conflicts_clean_merge_stores_nothing() {
        let (_dir, repo) = diverged_repo("one\n2\n3\n", "1\n2\nthree\n");

        assert!(repo.detect_conflicts("feature").unwrap().is_empty());
        let merged = ObjectId::of(b"one\n2\nthree\n");
        assert!(!ContentStore::new(&repo.storage).contains(&merged).unwrap());

        assert!(matches!(
            repo.detect_conflicts("missing"),
            Err(Error::BranchNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_reports_unreadable_conflicted_path() {
        let (dir, mut repo) = diverged_repo("main\n2\n3\n", "feature\n2\n3\n");
        assert!(!repo.merge("feature", None).unwrap().is_clean());

        fs::remove_file(dir.path().join("a.txt")).unwrap();
        fs::create_dir(dir.path().join("a.txt")).unwrap();

        assert!(matches!(
            repo.resolve_and_commit("resolved", None),
            Err(Error::IoFailure { .. })
        ));
        assert!(repo.pending_merge().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_merge_checkout_failure_keeps_head() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path(), RepoConfig::default()).unwrap();
        let root = repo.root().to_path_buf();
        fs::write(root.join("a.txt"), "a").unwrap();
        let base = repo.commit("base", None).unwrap();
        repo.create_branch("feature").unwrap();

        repo.switch_branch("feature").unwrap();
        fs::create_dir(root.join("blocked")).unwrap();
        fs::write(root.join("blocked/new.txt"), "new").unwrap();
        repo.commit("add blocked/new.txt", None).unwrap();
        repo.switch_branch("main").unwrap();
        assert!(!root.join("blocked").exists());

        // Symlinks are not tracked, so the tree still counts as clean.
        std::os::unix::fs::symlink(root.join("a.txt"), root.join("blocked")).unwrap();

        let err = repo.merge("feature", None).unwrap_err();
        assert!(matches!(&err, Error::IoFailure { path, .. } if *path == root.join("blocked")));
        assert_eq!(repo.head().unwrap(), Some(base.id));
        assert_eq!(repo.log(None).unwrap().len(), 1);
        assert!(repo.pending_merge().unwrap().is_none());
    }
}
