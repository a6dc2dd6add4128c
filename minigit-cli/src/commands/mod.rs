pub mod branch;
pub mod cleanup;
pub mod commit;
pub mod diff;
pub mod init;
pub mod log;
pub mod merge;
pub mod revert;
pub mod status;
pub mod switch;
pub mod sync;

use anyhow::{Context, Result};
use minigit_core::{EventRecord, EventSink, Repository, REPO_DIR};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const EVENT_LOG_FILE: &str = "events.log";

pub fn get_repo_root(custom_path: Option<PathBuf>) -> Result<PathBuf> {
    match custom_path {
        Some(path) => Ok(path),
        None => std::env::current_dir().context("Cannot determine the current directory"),
    }
}

/// Opens the repository containing the work tree, with events going to
/// `.minigit/events.log`.
pub fn open_repo(custom_path: Option<PathBuf>) -> Result<Repository> {
    let start = get_repo_root(custom_path)?;
    let repo = Repository::discover(&start)
        .with_context(|| format!("No minigit repository at {}", start.display()))?;
    let sink = EventLog::new(repo.root());
    Ok(repo.with_event_sink(Box::new(sink)))
}

pub fn short(id: &minigit_core::ObjectId) -> String {
    id.short().to_string()
}

/// Appends every event as one JSON line.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(REPO_DIR).join(EVENT_LOG_FILE),
        }
    }

    fn append(&self, record: &EventRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl EventSink for EventLog {
    fn emit(&self, record: &EventRecord) {
        if let Err(e) = self.append(record) {
            tracing::warn!(path = %self.path.display(), "failed to write event log: {}", e);
        }
    }
}
