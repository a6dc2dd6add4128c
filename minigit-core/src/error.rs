use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O failure at {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a minigit repository: {0}")]
    NotARepository(PathBuf),

    #[error("Repository already initialized at: {0}")]
    AlreadyInitialized(PathBuf),

    #[error("Nothing to commit, working tree clean")]
    NothingToCommit,

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Branch already exists: {0}")]
    BranchAlreadyExists(String),

    #[error("Invalid branch name: {0:?}")]
    InvalidBranchName(String),

    #[error("Cannot delete the checked-out branch: {0}")]
    CannotDeleteCurrentBranch(String),

    #[error("Uncommitted changes in {} path(s): {}", .0.len(), .0.join(", "))]
    UncommittedChanges(Vec<String>),

    #[error("Repository has no commits yet")]
    EmptyRepository,

    #[error("A merge is in progress; resolve it or abort it first")]
    MergeInProgress,

    #[error("No merge in progress")]
    NoMergeInProgress,

    #[error("Unresolved conflicts in: {}", .0.join(", "))]
    UnresolvedConflicts(Vec<String>),

    #[error("Path not tracked by the current head: {0}")]
    PathNotTracked(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Commit graph inconsistency: {0}")]
    GraphInconsistency(String),

    #[error("Repository lock unavailable at {0}")]
    LockUnavailable(PathBuf),
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::IoFailure {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for errors that mean the repository data itself is damaged.
    ///
    /// These halt the operation and must be reported apart from errors
    /// caused by user input.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::BlobNotFound(_) | Error::CommitNotFound(_) | Error::GraphInconsistency(_)
        )
    }
}
