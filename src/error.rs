use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::library::BookId;

/// Failures raised by the local library store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("book {0} not found")]
    BookNotFound(BookId),

    #[error("bookmark {0} not found")]
    BookmarkNotFound(i64),

    #[error("goal {0} not found")]
    GoalNotFound(i64),

    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    #[error("stored value is malformed: {0}")]
    Malformed(String),
}

/// Failures while turning a file or pasted text into a document
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("document contains no words")]
    Empty,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("a tick is already scheduled; cancel it before scheduling another")]
    AlreadyPending,
}
