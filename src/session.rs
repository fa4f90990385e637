use chrono::{DateTime, Utc};

/// Finalized summary of one reading session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub started_at: DateTime<Utc>,
    pub words_read: u64,
}

impl SessionRecord {
    /// A record with no words has nothing worth persisting
    pub fn is_empty(&self) -> bool {
        self.words_read == 0
    }
}

/// Tracks the active session of one reading surface.
#[derive(Debug, Clone, Default)]
pub struct SessionAccumulator {
    started_at: Option<DateTime<Utc>>,
    words_read: u64,
}

impl SessionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a session at `now` unless one is already running. Returns true if a new one began.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        self.words_read = 0;
        true
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn words_read(&self) -> u64 {
        self.words_read
    }

    pub fn increment_words_read(&mut self) {
        if self.started_at.is_some() {
            self.words_read += 1;
        }
    }

    /// Close the session and reset. Without an active session the record is empty and
    /// stamped with `now`.
    pub fn end(&mut self, now: DateTime<Utc>) -> SessionRecord {
        let record = SessionRecord {
            started_at: self.started_at.take().unwrap_or(now),
            words_read: self.words_read,
        };
        self.words_read = 0;
        record
    }
}
