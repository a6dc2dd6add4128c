use crate::error::Result;
use crate::hash::ObjectId;
use crate::models::{Branch, Commit, PendingMerge, RepoConfig, Snapshot};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SCHEMA_VERSION: i32 = 1;

const META_HEAD: &str = "head";
const META_SEQUENCE: &str = "sequence";
const META_PENDING_MERGE: &str = "pending_merge";

/// Advisory record of the last observed state of a work-tree file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: String,
    pub digest: ObjectId,
    pub size: u64,
    pub mtime_ns: i64,
}

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.busy_timeout(std::time::Duration::from_secs(5))?;
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                content BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS commits (
                id TEXT PRIMARY KEY,
                message TEXT NOT NULL,
                author TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                generation INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS commit_parents (
                commit_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                parent_id TEXT NOT NULL,
                PRIMARY KEY (commit_id, position),
                FOREIGN KEY (commit_id) REFERENCES commits(id),
                FOREIGN KEY (parent_id) REFERENCES commits(id)
            );

            CREATE TABLE IF NOT EXISTS snapshot_entries (
                commit_id TEXT NOT NULL,
                path TEXT NOT NULL,
                blob_id TEXT NOT NULL,
                PRIMARY KEY (commit_id, path),
                FOREIGN KEY (commit_id) REFERENCES commits(id),
                FOREIGN KEY (blob_id) REFERENCES blobs(id)
            );

            CREATE TABLE IF NOT EXISTS branches (
                name TEXT PRIMARY KEY,
                head TEXT,
                FOREIGN KEY (head) REFERENCES commits(id)
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                body TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS worktree_cache (
                path TEXT PRIMARY KEY,
                digest TEXT NOT NULL,
                size INTEGER NOT NULL,
                mtime_ns INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_commit_parents_parent ON commit_parents(parent_id);
            CREATE INDEX IF NOT EXISTS idx_commits_generation ON commits(generation);
            "#,
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(())
    }

    /// Runs `f` inside one SQLite transaction; any error rolls everything back.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    // Blob operations
    /// Returns true when the blob was newly written.
    pub fn insert_blob(&self, id: &ObjectId, content: &[u8]) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO blobs (id, size, content) VALUES (?1, ?2, ?3)",
            params![id.as_str(), content.len() as i64, content],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_blob(&self, id: &ObjectId) -> Result<Option<Vec<u8>>> {
        let content = self
            .conn
            .query_row(
                "SELECT content FROM blobs WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    pub fn has_blob(&self, id: &ObjectId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM blobs WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn blob_size(&self, id: &ObjectId) -> Result<Option<u64>> {
        let size: Option<i64> = self
            .conn
            .query_row(
                "SELECT size FROM blobs WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(size.map(|s| s as u64))
    }

    pub fn blob_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn blob_ids(&self) -> Result<Vec<ObjectId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM blobs ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| object_id(row, 0))?
            .collect::<rusqlite::Result<Vec<ObjectId>>>()?;
        Ok(ids)
    }

    // Commit operations
    pub fn insert_commit(&self, commit: &Commit) -> Result<()> {
        self.conn.execute(
            "INSERT INTO commits (id, message, author, timestamp, sequence, generation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                commit.id.as_str(),
                commit.message,
                commit.author,
                commit.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                commit.sequence as i64,
                commit.generation as i64,
            ],
        )?;

        for (position, parent) in commit.parents.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO commit_parents (commit_id, position, parent_id) VALUES (?1, ?2, ?3)",
                params![commit.id.as_str(), position as i64, parent.as_str()],
            )?;
        }

        let mut stmt = self.conn.prepare(
            "INSERT INTO snapshot_entries (commit_id, path, blob_id) VALUES (?1, ?2, ?3)",
        )?;
        for (path, blob_id) in &commit.snapshot {
            stmt.execute(params![commit.id.as_str(), path, blob_id.as_str()])?;
        }

        Ok(())
    }

    pub fn get_commit(&self, id: &ObjectId) -> Result<Option<Commit>> {
        let header = self
            .conn
            .query_row(
                "SELECT id, message, author, timestamp, sequence, generation
                 FROM commits WHERE id = ?1",
                params![id.as_str()],
                commit_from_row,
            )
            .optional()?;

        let Some(mut commit) = header else {
            return Ok(None);
        };
        commit.parents = self.get_parents(id)?;
        commit.snapshot = self.get_snapshot(id)?;
        Ok(Some(commit))
    }

    pub fn has_commit(&self, id: &ObjectId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM commits WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Every commit id, parents before children.
    pub fn commit_ids(&self) -> Result<Vec<ObjectId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM commits ORDER BY generation ASC, sequence ASC, id ASC")?;
        let ids = stmt
            .query_map([], |row| object_id(row, 0))?
            .collect::<rusqlite::Result<Vec<ObjectId>>>()?;
        Ok(ids)
    }

    pub fn commit_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn get_parents(&self, id: &ObjectId) -> Result<Vec<ObjectId>> {
        let mut stmt = self.conn.prepare(
            "SELECT parent_id FROM commit_parents WHERE commit_id = ?1 ORDER BY position ASC",
        )?;
        let parents = stmt
            .query_map(params![id.as_str()], |row| object_id(row, 0))?
            .collect::<rusqlite::Result<Vec<ObjectId>>>()?;
        Ok(parents)
    }

    fn get_snapshot(&self, id: &ObjectId) -> Result<Snapshot> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, blob_id FROM snapshot_entries WHERE commit_id = ?1")?;
        let entries = stmt
            .query_map(params![id.as_str()], |row| {
                let path: String = row.get(0)?;
                Ok((path, object_id(row, 1)?))
            })?
            .collect::<rusqlite::Result<Snapshot>>()?;
        Ok(entries)
    }

    /// Reserves the next commit sequence number.
    pub fn next_sequence(&self) -> Result<u64> {
        let current = self
            .get_meta(META_SEQUENCE)?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        self.set_meta(META_SEQUENCE, &next.to_string())?;
        Ok(next)
    }

    /// Keeps the sequence counter ahead of imported commits.
    pub fn observe_sequence(&self, sequence: u64) -> Result<()> {
        let current = self
            .get_meta(META_SEQUENCE)?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        if sequence > current {
            self.set_meta(META_SEQUENCE, &sequence.to_string())?;
        }
        Ok(())
    }

    // Branch operations
    pub fn get_branch(&self, name: &str) -> Result<Option<Branch>> {
        let branch = self
            .conn
            .query_row(
                "SELECT name, head FROM branches WHERE name = ?1",
                params![name],
                branch_from_row,
            )
            .optional()?;
        Ok(branch)
    }

    pub fn put_branch(&self, name: &str, head: Option<&ObjectId>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO branches (name, head) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET head = excluded.head",
            params![name, head.map(ObjectId::as_str)],
        )?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM branches WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }

    pub fn list_branches(&self) -> Result<Vec<Branch>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, head FROM branches ORDER BY name ASC")?;
        let branches = stmt
            .query_map([], branch_from_row)?
            .collect::<rusqlite::Result<Vec<Branch>>>()?;
        Ok(branches)
    }

    // HEAD and pending merge
    pub fn get_head(&self) -> Result<Option<String>> {
        self.get_meta(META_HEAD)
    }

    pub fn set_head(&self, branch: &str) -> Result<()> {
        self.set_meta(META_HEAD, branch)
    }

    pub fn get_pending_merge(&self) -> Result<Option<PendingMerge>> {
        match self.get_meta(META_PENDING_MERGE)? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    pub fn set_pending_merge(&self, pending: &PendingMerge) -> Result<()> {
        let body = serde_json::to_string(pending)?;
        self.set_meta(META_PENDING_MERGE, &body)
    }

    pub fn clear_pending_merge(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM meta WHERE key = ?1", params![META_PENDING_MERGE])?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // Configuration
    pub fn get_config(&self) -> Result<Option<RepoConfig>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM config WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    pub fn set_config(&self, config: &RepoConfig) -> Result<()> {
        let body = serde_json::to_string(config)?;
        self.conn.execute(
            "INSERT INTO config (id, body) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
            params![body],
        )?;
        Ok(())
    }

    // Work-tree cache
    pub fn cache_get(&self, path: &str) -> Result<Option<CacheEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT path, digest, size, mtime_ns FROM worktree_cache WHERE path = ?1",
                params![path],
                cache_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn cache_put(&self, entry: &CacheEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO worktree_cache (path, digest, size, mtime_ns) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET digest = excluded.digest,
                 size = excluded.size, mtime_ns = excluded.mtime_ns",
            params![
                entry.path,
                entry.digest.as_str(),
                entry.size as i64,
                entry.mtime_ns
            ],
        )?;
        Ok(())
    }

    pub fn cache_clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM worktree_cache", [])?;
        Ok(())
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn object_id(row: &Row, idx: usize) -> rusqlite::Result<ObjectId> {
    let raw: String = row.get(idx)?;
    ObjectId::parse(&raw).ok_or_else(|| conversion_error(idx, format!("invalid object id {raw:?}")))
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp {raw:?}: {e}")))
}

fn commit_from_row(row: &Row) -> rusqlite::Result<Commit> {
    let sequence: i64 = row.get(4)?;
    let generation: i64 = row.get(5)?;

    Ok(Commit {
        id: object_id(row, 0)?,
        parents: Vec::new(),
        snapshot: Snapshot::new(),
        message: row.get(1)?,
        author: row.get(2)?,
        timestamp: timestamp(row, 3)?,
        sequence: sequence as u64,
        generation: generation as u64,
    })
}

fn branch_from_row(row: &Row) -> rusqlite::Result<Branch> {
    let head: Option<String> = row.get(1)?;
    let head = match head {
        Some(raw) => Some(
            ObjectId::parse(&raw)
                .ok_or_else(|| conversion_error(1, format!("invalid branch head {raw:?}")))?,
        ),
        None => None,
    };
    Ok(Branch {
        name: row.get(0)?,
        head,
    })
}

fn cache_from_row(row: &Row) -> rusqlite::Result<CacheEntry> {
    let size: i64 = row.get(2)?;
    Ok(CacheEntry {
        path: row.get(0)?,
        digest: object_id(row, 1)?,
        size: size as u64,
        mtime_ns: row.get(3)?,
    })
}
