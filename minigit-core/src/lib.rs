//! # minigit-core
//!
//! Core library for minigit - a local, single-user version-control engine.
//!
//! Work-tree states are recorded as immutable, content-addressed snapshots in
//! a commit graph with named branch pointers. Everything is reached through
//! [`Repository`]; the other modules are its building blocks and are public
//! for tools that need lower-level access.

pub mod branch;
pub mod checkout;
pub mod detector;
pub mod diff;
pub mod error;
pub mod events;
pub mod graph;
pub mod hash;
pub mod ignore;
pub mod lock;
pub mod merge;
pub mod models;
pub mod repo;
pub mod storage;
pub mod store;
pub mod sync;

pub use branch::BranchInfo;
pub use checkout::CheckoutSummary;
pub use diff::{DiffKind, DiffLine, FileDiff};
pub use error::{Error, Result};
pub use events::{EventRecord, EventSink, NullSink, RecordingSink, RepoEvent};
pub use hash::ObjectId;
pub use merge::{ConflictKind, ConflictRegion, FileConflict, MergeOutcome, Side};
pub use models::{Branch, ChangeSet, Commit, LogEntry, PendingMerge, RepoConfig, Snapshot, Status};
pub use repo::{Repository, REPO_DIR};
pub use storage::Storage;
pub use sync::{DirectoryRemote, ImportReport, PushReport, Remote, RepoState};
