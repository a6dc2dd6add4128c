//! Structured events emitted by repository operations.
//!
//! The core never prints or writes logs on its own behalf; front ends decide
//! what to do with these by installing an [`EventSink`].

use crate::hash::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RepoEvent {
    RepositoryInitialized {
        branch: String,
    },
    CommitCreated {
        id: ObjectId,
        branch: String,
        parents: Vec<ObjectId>,
        files: usize,
    },
    BranchCreated {
        name: String,
        head: ObjectId,
    },
    BranchDeleted {
        name: String,
    },
    BranchSwitched {
        from: String,
        to: String,
    },
    MergeCompleted {
        source: String,
        into: String,
        commit: ObjectId,
    },
    MergeConflicted {
        source: String,
        into: String,
        paths: Vec<String>,
    },
    MergeAborted {
        source: String,
    },
    FileReverted {
        path: String,
        blob: ObjectId,
    },
    StateImported {
        commits: usize,
        blobs: usize,
        diverged: Vec<String>,
    },
}

impl RepoEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RepoEvent::RepositoryInitialized { .. } => "repository_initialized",
            RepoEvent::CommitCreated { .. } => "commit_created",
            RepoEvent::BranchCreated { .. } => "branch_created",
            RepoEvent::BranchDeleted { .. } => "branch_deleted",
            RepoEvent::BranchSwitched { .. } => "branch_switched",
            RepoEvent::MergeCompleted { .. } => "merge_completed",
            RepoEvent::MergeConflicted { .. } => "merge_conflicted",
            RepoEvent::MergeAborted { .. } => "merge_aborted",
            RepoEvent::FileReverted { .. } => "file_reverted",
            RepoEvent::StateImported { .. } => "state_imported",
        }
    }
}

/// An event together with when it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RepoEvent,
}

impl EventRecord {
    pub fn now(event: RepoEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, record: &EventRecord);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _record: &EventRecord) {}
}

/// Keeps events in memory; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<RepoEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RepoEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, record: &EventRecord) {
        if let Ok(mut events) = self.events.lock() {
            events.push(record.event.clone());
        }
    }
}
