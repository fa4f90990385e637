use std::sync::mpsc::Sender;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::library::BookId;
use crate::session::SessionRecord;

/// A finished session as handed to the statistics store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub book_id: BookId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub words_read: u64,
    pub average_wpm: u32,
}

pub trait ProgressStore {
    fn update_progress(
        &mut self,
        book_id: BookId,
        position: usize,
        completed: bool,
    ) -> Result<(), StoreError>;
}

pub trait SessionStore {
    fn create_session(&mut self, entry: &SessionEntry) -> Result<(), StoreError>;
}

pub trait BookmarkStore {
    fn add_bookmark(
        &mut self,
        book_id: BookId,
        word_position: usize,
        note: Option<&str>,
    ) -> Result<i64, StoreError>;
}

impl<T: ProgressStore + ?Sized> ProgressStore for &mut T {
    fn update_progress(
        &mut self,
        book_id: BookId,
        position: usize,
        completed: bool,
    ) -> Result<(), StoreError> {
        (**self).update_progress(book_id, position, completed)
    }
}

impl<T: SessionStore + ?Sized> SessionStore for &mut T {
    fn create_session(&mut self, entry: &SessionEntry) -> Result<(), StoreError> {
        (**self).create_session(entry)
    }
}

impl<T: BookmarkStore + ?Sized> BookmarkStore for &mut T {
    fn add_bookmark(
        &mut self,
        book_id: BookId,
        word_position: usize,
        note: Option<&str>,
    ) -> Result<i64, StoreError> {
        (**self).add_bookmark(book_id, word_position, note)
    }
}

/// Everything a reading surface writes to
pub trait ReaderBackend: ProgressStore + SessionStore + BookmarkStore {}

impl<T: ProgressStore + SessionStore + BookmarkStore> ReaderBackend for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Short, non-blocking message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait NotificationSink {
    fn notify(&mut self, notice: Notice);
}

impl NotificationSink for Vec<Notice> {
    fn notify(&mut self, notice: Notice) {
        self.push(notice);
    }
}

impl NotificationSink for Sender<Notice> {
    fn notify(&mut self, notice: Notice) {
        // A gone receiver means nobody is left to show it
        let _ = self.send(notice);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
    Failed(String),
}

impl WriteOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, WriteOutcome::Failed(_))
    }
}

/// Result of one flush; the two writes succeed or fail independently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub session: WriteOutcome,
    pub progress: WriteOutcome,
}

impl FlushReport {
    pub fn skipped() -> Self {
        Self {
            session: WriteOutcome::Skipped,
            progress: WriteOutcome::Skipped,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.session.is_failed() || self.progress.is_failed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRequest {
    pub book_id: BookId,
    pub position: usize,
    pub completed: bool,
    pub session: SessionRecord,
    pub wpm: u32,
    pub ended_at: DateTime<Utc>,
}

/// Writes closed sessions and reading positions out to the stores.
pub struct PersistenceBridge<B> {
    backend: B,
    sink: Box<dyn NotificationSink>,
}

impl<B: ReaderBackend> PersistenceBridge<B> {
    pub fn new(backend: B, sink: Box<dyn NotificationSink>) -> Self {
        Self { backend, sink }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn notify(&mut self, notice: Notice) {
        self.sink.notify(notice);
    }

    /// Persist a closed session (when it read anything) and the current position.
    ///
    /// Neither write blocks the other. Failures are logged and sent to the sink; the
    /// caller's in-memory state is never rolled back.
    pub fn flush(&mut self, request: FlushRequest) -> FlushReport {
        let session = if request.session.is_empty() {
            WriteOutcome::Skipped
        } else {
            let entry = SessionEntry {
                book_id: request.book_id,
                started_at: request.session.started_at,
                ended_at: request.ended_at,
                words_read: request.session.words_read,
                average_wpm: request.wpm,
            };
            match self.backend.create_session(&entry) {
                Ok(()) => WriteOutcome::Written,
                Err(err) => {
                    tracing::error!(
                        book_id = request.book_id,
                        %err,
                        "failed to save reading session"
                    );
                    self.sink
                        .notify(Notice::error(format!("Could not save session: {err}")));
                    WriteOutcome::Failed(err.to_string())
                }
            }
        };

        let progress = match self.backend.update_progress(
            request.book_id,
            request.position,
            request.completed,
        ) {
            Ok(()) => WriteOutcome::Written,
            Err(err) => {
                tracing::error!(
                    book_id = request.book_id,
                    %err,
                    "failed to save reading position"
                );
                self.sink
                    .notify(Notice::error(format!("Could not save position: {err}")));
                WriteOutcome::Failed(err.to_string())
            }
        };

        tracing::info!(
            book_id = request.book_id,
            position = request.position,
            completed = request.completed,
            words_read = request.session.words_read,
            ?session,
            ?progress,
            "flushed reading state"
        );

        FlushReport { session, progress }
    }
}
