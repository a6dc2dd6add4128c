use crate::hash::ObjectId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete tree state of a commit: relative path -> blob id.
pub type Snapshot = BTreeMap<String, ObjectId>;

pub const ANONYMOUS_AUTHOR: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: ObjectId,
    pub parents: Vec<ObjectId>,
    pub snapshot: Snapshot,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub generation: u64,
}

#[derive(Serialize)]
struct CommitPayload<'a> {
    parents: &'a [ObjectId],
    snapshot: &'a Snapshot,
    message: &'a str,
    author: &'a str,
    timestamp: String,
    sequence: u64,
}

impl Commit {
    /// Commit id over everything that makes the commit what it is.
    ///
    /// `generation` is derived from the parents and stays out of the hash.
    pub fn compute_id(
        parents: &[ObjectId],
        snapshot: &Snapshot,
        message: &str,
        author: &str,
        timestamp: &DateTime<Utc>,
        sequence: u64,
    ) -> ObjectId {
        let payload = CommitPayload {
            parents,
            snapshot,
            message,
            author,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            sequence,
        };
        // Serializing borrowed strings and a BTreeMap cannot fail.
        let bytes = serde_json::to_vec(&payload).unwrap_or_default();
        ObjectId::of(&bytes)
    }

    pub fn verify_id(&self) -> bool {
        Self::compute_id(
            &self.parents,
            &self.snapshot,
            &self.message,
            &self.author,
            &self.timestamp,
            self.sequence,
        ) == self.id
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Normalizes an optional author identity.
pub fn author_or_anonymous(author: Option<&str>) -> String {
    match author.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ANONYMOUS_AUTHOR.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub head: Option<ObjectId>,
}

/// Work-tree differences relative to a snapshot, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// All touched paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub commit: Commit,
    /// Paths that differ from the first parent (every path for a root commit).
    pub files: Vec<String>,
}

/// A conflicted merge waiting for `resolve_and_commit` or `abort_merge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMerge {
    pub source_branch: String,
    pub source_head: ObjectId,
    pub base: ObjectId,
    pub conflicted_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub branch: String,
    pub head: Option<ObjectId>,
    pub changes: ChangeSet,
    pub pending_merge: Option<PendingMerge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub default_branch: String,
    pub ignore_patterns: Vec<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            ignore_patterns: vec![
                ".git".to_string(),
                "target".to_string(),
                "node_modules".to_string(),
            ],
        }
    }
}

impl RepoConfig {
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    pub fn with_default_branch(mut self, name: impl Into<String>) -> Self {
        self.default_branch = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(entries: &[(&str, &[u8])]) -> Snapshot {
        entries
            .iter()
            .map(|(path, content)| (path.to_string(), ObjectId::of(content)))
            .collect()
    }

    #[test]
    fn test_commit_id_is_pure() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let snap = snapshot(&[("a.txt", b"hello")]);

        let a = Commit::compute_id(&[], &snap, "initial", "alice", &ts, 1);
        let b = Commit::compute_id(&[], &snap, "initial", "alice", &ts, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_commit_id_covers_sequence_and_parents() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let snap = snapshot(&[("a.txt", b"hello")]);
        let base = Commit::compute_id(&[], &snap, "m", "alice", &ts, 1);

        assert_ne!(base, Commit::compute_id(&[], &snap, "m", "alice", &ts, 2));
        assert_ne!(
            base,
            Commit::compute_id(&[base.clone()], &snap, "m", "alice", &ts, 1)
        );
        assert_ne!(base, Commit::compute_id(&[], &snap, "m", "bob", &ts, 1));
    }

    #[test]
    fn test_author_normalization() {
        assert_eq!(author_or_anonymous(None), ANONYMOUS_AUTHOR);
        assert_eq!(author_or_anonymous(Some("  ")), ANONYMOUS_AUTHOR);
        assert_eq!(author_or_anonymous(Some("alice")), "alice");
    }

    #[test]
    fn test_change_set_paths() {
        let changes = ChangeSet {
            added: vec!["c.txt".into()],
            modified: vec!["a.txt".into()],
            deleted: vec!["b.txt".into()],
        };
        assert_eq!(changes.len(), 3);
        assert_eq!(changes.paths(), vec!["a.txt", "b.txt", "c.txt"]);
        assert!(ChangeSet::default().is_empty());
    }
}
