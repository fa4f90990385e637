use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::error::StoreError;
use crate::goals::{GoalKind, GoalPeriod, NewGoal, ReadingGoal};
use crate::persistence::{BookmarkStore, ProgressStore, SessionEntry, SessionStore};

pub type BookId = i64;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        file_type TEXT NOT NULL,
        content TEXT NOT NULL,
        word_count INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS reading_progress (
        book_id INTEGER PRIMARY KEY REFERENCES books(id) ON DELETE CASCADE,
        current_position INTEGER NOT NULL DEFAULT 0,
        completed BOOLEAN NOT NULL DEFAULT 0,
        last_read_at TEXT
    );

    CREATE TABLE IF NOT EXISTS reading_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        words_read INTEGER NOT NULL,
        average_wpm INTEGER NOT NULL,
        session_duration INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_reading_sessions_start ON reading_sessions(start_time);

    CREATE TABLE IF NOT EXISTS user_statistics (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        total_words_read INTEGER NOT NULL DEFAULT 0,
        total_books_completed INTEGER NOT NULL DEFAULT 0,
        total_reading_time INTEGER NOT NULL DEFAULT 0,
        average_wpm INTEGER NOT NULL DEFAULT 0,
        current_streak INTEGER NOT NULL DEFAULT 0,
        longest_streak INTEGER NOT NULL DEFAULT 0,
        last_read_date TEXT
    );

    INSERT OR IGNORE INTO user_statistics (id) VALUES (1);

    CREATE TABLE IF NOT EXISTS bookmarks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
        word_position INTEGER NOT NULL,
        note TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS reading_goals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        goal_type TEXT NOT NULL,
        target_value INTEGER NOT NULL,
        current_value INTEGER NOT NULL DEFAULT 0,
        period TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        completed BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub file_type: String,
    pub content: String,
}

/// A stored book together with its reading progress
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub file_type: String,
    pub content: String,
    pub word_count: usize,
    pub current_position: usize,
    pub completed: bool,
    pub last_read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookSummary {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub word_count: usize,
    pub current_position: usize,
    pub completed: bool,
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSession {
    pub id: i64,
    pub book_id: BookId,
    pub book_title: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub words_read: u64,
    pub average_wpm: u32,
    pub duration_secs: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStatistics {
    pub total_words_read: u64,
    pub total_books_completed: u64,
    pub total_reading_secs: i64,
    pub average_wpm: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_read_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub id: i64,
    pub book_id: BookId,
    pub word_position: usize,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SessionCsvRow<'a> {
    book_id: BookId,
    book_title: &'a str,
    start_time: String,
    end_time: String,
    words_read: u64,
    average_wpm: u32,
    duration_secs: i64,
}

/// Local store for books, progress, sessions, statistics, bookmarks and goals
#[derive(Debug)]
pub struct Library {
    conn: Connection,
}

impl Library {
    /// Open (creating if needed) the library database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Library { conn })
    }

    pub fn add_book(&mut self, book: &NewBook) -> Result<BookId, StoreError> {
        let word_count = book.content.split_whitespace().count();
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO books (title, author, file_type, content, word_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                book.title,
                book.author,
                book.file_type,
                book.content,
                word_count,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO reading_progress (book_id, current_position, completed) VALUES (?1, 0, 0)",
            [id],
        )?;
        tx.commit()?;

        tracing::info!(book_id = id, title = %book.title, word_count, "added book");
        Ok(id)
    }

    pub fn get_book(&self, id: BookId) -> Result<Book, StoreError> {
        self.conn
            .query_row(
                r#"
                SELECT b.id, b.title, b.author, b.file_type, b.content, b.word_count, b.created_at,
                       rp.current_position, rp.completed, rp.last_read_at
                FROM books b
                LEFT JOIN reading_progress rp ON rp.book_id = b.id
                WHERE b.id = ?1
                "#,
                [id],
                |row| {
                    Ok(Book {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        author: row.get(2)?,
                        file_type: row.get(3)?,
                        content: row.get(4)?,
                        word_count: row.get(5)?,
                        created_at: timestamp_at(row, 6)?,
                        current_position: row.get::<_, Option<usize>>(7)?.unwrap_or(0),
                        completed: row.get::<_, Option<bool>>(8)?.unwrap_or(false),
                        last_read_at: optional_timestamp_at(row, 9)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::BookNotFound(id))
    }

    /// Books ordered by most recently read, then newest added
    pub fn list_books(&self) -> Result<Vec<BookSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT b.id, b.title, b.author, b.word_count,
                   rp.current_position, rp.completed, rp.last_read_at
            FROM books b
            LEFT JOIN reading_progress rp ON rp.book_id = b.id
            ORDER BY rp.last_read_at DESC NULLS LAST, b.created_at DESC, b.id DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(BookSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                author: row.get(2)?,
                word_count: row.get(3)?,
                current_position: row.get::<_, Option<usize>>(4)?.unwrap_or(0),
                completed: row.get::<_, Option<bool>>(5)?.unwrap_or(false),
                last_read_at: optional_timestamp_at(row, 6)?,
            })
        })?;

        let mut books = Vec::new();
        for book in rows {
            books.push(book?);
        }
        Ok(books)
    }

    /// Delete a book along with its progress, sessions and bookmarks
    pub fn delete_book(&mut self, id: BookId) -> Result<(), StoreError> {
        let changed = self.conn.execute("DELETE FROM books WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::BookNotFound(id));
        }
        Ok(())
    }

    pub fn statistics(&self) -> Result<UserStatistics, StoreError> {
        let stats = self.conn.query_row(
            r#"
            SELECT total_words_read, total_books_completed, total_reading_time, average_wpm,
                   current_streak, longest_streak, last_read_date
            FROM user_statistics WHERE id = 1
            "#,
            [],
            |row| {
                let last_read_date: Option<String> = row.get(6)?;
                Ok((
                    UserStatistics {
                        total_words_read: row.get(0)?,
                        total_books_completed: row.get(1)?,
                        total_reading_secs: row.get(2)?,
                        average_wpm: row.get(3)?,
                        current_streak: row.get(4)?,
                        longest_streak: row.get(5)?,
                        last_read_date: None,
                    },
                    last_read_date,
                ))
            },
        )?;

        let (mut stats, last_read_date) = stats;
        stats.last_read_date = last_read_date
            .map(|d| {
                NaiveDate::parse_from_str(&d, DATE_FORMAT)
                    .map_err(|_| StoreError::Malformed(format!("last_read_date {d:?}")))
            })
            .transpose()?;
        Ok(stats)
    }

    /// Most recent sessions first
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<ReadingSession>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT rs.id, rs.book_id, b.title, rs.start_time, rs.end_time,
                   rs.words_read, rs.average_wpm, rs.session_duration
            FROM reading_sessions rs
            JOIN books b ON rs.book_id = b.id
            ORDER BY rs.start_time DESC, rs.id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit], session_from_row)?;
        let mut sessions = Vec::new();
        for session in rows {
            sessions.push(session?);
        }
        Ok(sessions)
    }

    pub fn bookmarks(&self, book_id: BookId) -> Result<Vec<Bookmark>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, book_id, word_position, note, created_at
            FROM bookmarks
            WHERE book_id = ?1
            ORDER BY word_position, id
            "#,
        )?;

        let rows = stmt.query_map([book_id], bookmark_from_row)?;
        let mut bookmarks = Vec::new();
        for bookmark in rows {
            bookmarks.push(bookmark?);
        }
        Ok(bookmarks)
    }

    pub fn get_bookmark(&self, id: i64) -> Result<Bookmark, StoreError> {
        self.conn
            .query_row(
                "SELECT id, book_id, word_position, note, created_at FROM bookmarks WHERE id = ?1",
                [id],
                bookmark_from_row,
            )
            .optional()?
            .ok_or(StoreError::BookmarkNotFound(id))
    }

    pub fn delete_bookmark(&mut self, id: i64) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM bookmarks WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::BookmarkNotFound(id));
        }
        Ok(())
    }

    pub fn create_goal(&mut self, goal: &NewGoal) -> Result<i64, StoreError> {
        if goal.target_value == 0 {
            return Err(StoreError::InvalidGoal("target must be above zero".into()));
        }
        if goal.end_date < goal.start_date {
            return Err(StoreError::InvalidGoal(format!(
                "ends {} before it starts {}",
                goal.end_date, goal.start_date
            )));
        }

        self.conn.execute(
            r#"
            INSERT INTO reading_goals
            (goal_type, target_value, period, start_date, end_date, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                goal.kind.to_string(),
                goal.target_value,
                goal.period.to_string(),
                goal.start_date.format(DATE_FORMAT).to_string(),
                goal.end_date.format(DATE_FORMAT).to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(goal_id = id, kind = %goal.kind, target = goal.target_value, "goal created");
        Ok(id)
    }

    /// Newest goals first
    pub fn goals(&self) -> Result<Vec<ReadingGoal>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, goal_type, target_value, current_value, period,
                   start_date, end_date, completed, created_at
            FROM reading_goals
            ORDER BY created_at DESC, id DESC
            "#,
        )?;

        let rows = stmt.query_map([], goal_from_row)?;
        let mut goals = Vec::new();
        for goal in rows {
            goals.push(goal?);
        }
        Ok(goals)
    }

    pub fn delete_goal(&mut self, id: i64) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM reading_goals WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::GoalNotFound(id));
        }
        Ok(())
    }

    /// Write every session as CSV, oldest first. Returns the number of rows written.
    pub fn export_sessions_csv<W: Write>(&self, writer: W) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT rs.id, rs.book_id, b.title, rs.start_time, rs.end_time,
                   rs.words_read, rs.average_wpm, rs.session_duration
            FROM reading_sessions rs
            JOIN books b ON rs.book_id = b.id
            ORDER BY rs.start_time, rs.id
            "#,
        )?;
        let rows = stmt.query_map([], session_from_row)?;

        let mut out = csv::Writer::from_writer(writer);
        let mut count = 0;
        for session in rows {
            let session = session?;
            out.serialize(SessionCsvRow {
                book_id: session.book_id,
                book_title: &session.book_title,
                start_time: session.started_at.to_rfc3339(),
                end_time: session.ended_at.to_rfc3339(),
                words_read: session.words_read,
                average_wpm: session.average_wpm,
                duration_secs: session.duration_secs,
            })?;
            count += 1;
        }
        out.flush()?;
        Ok(count)
    }
}

impl ProgressStore for Library {
    fn update_progress(
        &mut self,
        book_id: BookId,
        position: usize,
        completed: bool,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let was_completed: Option<bool> = tx
            .query_row(
                "SELECT completed FROM reading_progress WHERE book_id = ?1",
                [book_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(was_completed) = was_completed else {
            return Err(StoreError::BookNotFound(book_id));
        };

        tx.execute(
            r#"
            UPDATE reading_progress
            SET current_position = ?1, completed = ?2, last_read_at = ?3
            WHERE book_id = ?4
            "#,
            params![position, completed, Utc::now().to_rfc3339(), book_id],
        )?;

        if completed && !was_completed {
            tx.execute(
                "UPDATE user_statistics SET total_books_completed = total_books_completed + 1 WHERE id = 1",
                [],
            )?;
            add_to_goals(&tx, GoalKind::Books, 1, Local::now().date_naive())?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl SessionStore for Library {
    fn create_session(&mut self, entry: &SessionEntry) -> Result<(), StoreError> {
        let duration = (entry.ended_at - entry.started_at).num_seconds().max(0);
        let today = entry.ended_at.with_timezone(&Local).date_naive();

        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO reading_sessions
            (book_id, start_time, end_time, words_read, average_wpm, session_duration)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.book_id,
                entry.started_at.to_rfc3339(),
                entry.ended_at.to_rfc3339(),
                entry.words_read,
                entry.average_wpm,
                duration,
            ],
        )?;

        let (average_wpm, current_streak, longest_streak, last_read_date): (
            u32,
            u32,
            u32,
            Option<String>,
        ) = tx.query_row(
            r#"
            SELECT average_wpm, current_streak, longest_streak, last_read_date
            FROM user_statistics WHERE id = 1
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let last_read_date = last_read_date
            .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok());

        let streak = next_streak(last_read_date, today, current_streak);
        let average = if last_read_date.is_some() {
            rolling_average_wpm(average_wpm, entry.average_wpm)
        } else {
            entry.average_wpm
        };

        tx.execute(
            r#"
            UPDATE user_statistics
            SET total_words_read = total_words_read + ?1,
                total_reading_time = total_reading_time + ?2,
                average_wpm = ?3,
                current_streak = ?4,
                longest_streak = ?5,
                last_read_date = ?6
            WHERE id = 1
            "#,
            params![
                entry.words_read,
                duration,
                average,
                streak,
                longest_streak.max(streak),
                today.format(DATE_FORMAT).to_string(),
            ],
        )?;
        add_to_goals(&tx, GoalKind::Words, entry.words_read, today)?;
        add_to_goals(&tx, GoalKind::Time, duration as u64, today)?;
        raise_streak_goals(&tx, streak, today)?;
        tx.commit()?;

        tracing::debug!(book_id = entry.book_id, duration, streak, "recorded reading session");
        Ok(())
    }
}

impl BookmarkStore for Library {
    fn add_bookmark(
        &mut self,
        book_id: BookId,
        word_position: usize,
        note: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO bookmarks (book_id, word_position, note, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![book_id, word_position, note, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

/// Count `amount` towards every goal of `kind` running on `day`
fn add_to_goals(
    conn: &Connection,
    kind: GoalKind,
    amount: u64,
    day: NaiveDate,
) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        UPDATE reading_goals
        SET current_value = current_value + ?1,
            completed = completed OR current_value + ?1 >= target_value
        WHERE goal_type = ?2 AND start_date <= ?3 AND end_date >= ?3
        "#,
        params![amount, kind.to_string(), day.format(DATE_FORMAT).to_string()],
    )
}

/// Streak goals track the best streak seen while they run
fn raise_streak_goals(conn: &Connection, streak: u32, day: NaiveDate) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        UPDATE reading_goals
        SET current_value = MAX(current_value, ?1),
            completed = completed OR MAX(current_value, ?1) >= target_value
        WHERE goal_type = ?2 AND start_date <= ?3 AND end_date >= ?3
        "#,
        params![
            streak,
            GoalKind::Streak.to_string(),
            day.format(DATE_FORMAT).to_string()
        ],
    )
}

/// Reading on consecutive days grows the streak; a gap resets it to one
pub fn next_streak(last_read: Option<NaiveDate>, today: NaiveDate, current: u32) -> u32 {
    match last_read.map(|last| (today - last).num_days()) {
        Some(0) => current.max(1),
        Some(1) => current + 1,
        _ => 1,
    }
}

/// Running average as a blend of the old value and the newest session
pub fn rolling_average_wpm(previous: u32, latest: u32) -> u32 {
    ((previous as f64 + latest as f64) / 2.0).round() as u32
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                idx,
                "timestamp".to_string(),
                rusqlite::types::Type::Text,
            )
        })
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(idx, &raw)
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_timestamp(idx, &r)).transpose()
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ReadingSession> {
    Ok(ReadingSession {
        id: row.get(0)?,
        book_id: row.get(1)?,
        book_title: row.get(2)?,
        started_at: timestamp_at(row, 3)?,
        ended_at: timestamp_at(row, 4)?,
        words_read: row.get(5)?,
        average_wpm: row.get(6)?,
        duration_secs: row.get(7)?,
    })
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, "date".to_string(), rusqlite::types::Type::Text)
    })
}

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<ReadingGoal> {
    let unknown = |idx: usize, what: &str| {
        rusqlite::Error::InvalidColumnType(idx, what.to_string(), rusqlite::types::Type::Text)
    };
    let kind: String = row.get(1)?;
    let period: String = row.get(4)?;
    Ok(ReadingGoal {
        id: row.get(0)?,
        kind: GoalKind::parse(&kind).ok_or_else(|| unknown(1, "goal_type"))?,
        target_value: row.get(2)?,
        current_value: row.get(3)?,
        period: GoalPeriod::parse(&period).ok_or_else(|| unknown(4, "period"))?,
        start_date: date_at(row, 5)?,
        end_date: date_at(row, 6)?,
        completed: row.get(7)?,
        created_at: timestamp_at(row, 8)?,
    })
}

fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        id: row.get(0)?,
        book_id: row.get(1)?,
        word_position: row.get(2)?,
        note: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeDelta, TimeZone};

    fn sample_book(title: &str, content: &str) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Unknown".to_string(),
            file_type: "txt".to_string(),
            content: content.to_string(),
        }
    }

    fn entry(book_id: BookId, ended_at: DateTime<Utc>, words: u64, wpm: u32) -> SessionEntry {
        SessionEntry {
            book_id,
            started_at: ended_at - TimeDelta::seconds(120),
            ended_at,
            words_read: words,
            average_wpm: wpm,
        }
    }

    fn local_noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn add_and_get_book() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib
            .add_book(&sample_book("Dune", "A beginning is the time"))
            .unwrap();

        let book = lib.get_book(id).unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.word_count, 5);
        assert_eq!(book.current_position, 0);
        assert!(!book.completed);
        assert!(book.last_read_at.is_none());
    }

    #[test]
    fn missing_book_is_not_found() {
        let lib = Library::open_in_memory().unwrap();
        assert_matches!(lib.get_book(99), Err(StoreError::BookNotFound(99)));
    }

    #[test]
    fn update_progress_records_position_and_completion() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("Short", "one two three")).unwrap();

        lib.update_progress(id, 2, false).unwrap();
        let book = lib.get_book(id).unwrap();
        assert_eq!(book.current_position, 2);
        assert!(book.last_read_at.is_some());
        assert_eq!(lib.statistics().unwrap().total_books_completed, 0);

        lib.update_progress(id, 3, true).unwrap();
        lib.update_progress(id, 3, true).unwrap();
        assert!(lib.get_book(id).unwrap().completed);
        assert_eq!(lib.statistics().unwrap().total_books_completed, 1);
    }

    #[test]
    fn update_progress_for_unknown_book_fails() {
        let mut lib = Library::open_in_memory().unwrap();
        assert_matches!(
            lib.update_progress(5, 1, false),
            Err(StoreError::BookNotFound(5))
        );
    }

    #[test]
    fn sessions_update_totals_and_average() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("B", "w w w")).unwrap();
        let day = local_noon(2024, 3, 10);

        lib.create_session(&entry(id, day, 600, 300)).unwrap();
        let stats = lib.statistics().unwrap();
        assert_eq!(stats.total_words_read, 600);
        assert_eq!(stats.total_reading_secs, 120);
        assert_eq!(stats.average_wpm, 300);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.last_read_date, NaiveDate::from_ymd_opt(2024, 3, 10));

        lib.create_session(&entry(id, day + TimeDelta::hours(1), 400, 401))
            .unwrap();
        let stats = lib.statistics().unwrap();
        assert_eq!(stats.total_words_read, 1000);
        assert_eq!(stats.total_reading_secs, 240);
        assert_eq!(stats.average_wpm, 351);
        assert_eq!(stats.current_streak, 1);
    }

    #[test]
    fn streak_grows_on_consecutive_days_and_resets_after_gap() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("B", "w")).unwrap();

        lib.create_session(&entry(id, local_noon(2024, 5, 1), 10, 300))
            .unwrap();
        lib.create_session(&entry(id, local_noon(2024, 5, 2), 10, 300))
            .unwrap();
        lib.create_session(&entry(id, local_noon(2024, 5, 3), 10, 300))
            .unwrap();
        let stats = lib.statistics().unwrap();
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.longest_streak, 3);

        lib.create_session(&entry(id, local_noon(2024, 5, 7), 10, 300))
            .unwrap();
        let stats = lib.statistics().unwrap();
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 3);
    }

    #[test]
    fn next_streak_rules() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        let last_week = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();

        assert_eq!(next_streak(None, today, 0), 1);
        assert_eq!(next_streak(Some(today), today, 4), 4);
        assert_eq!(next_streak(Some(yesterday), today, 4), 5);
        assert_eq!(next_streak(Some(last_week), today, 4), 1);
    }

    #[test]
    fn rolling_average_rounds() {
        assert_eq!(rolling_average_wpm(300, 301), 301);
        assert_eq!(rolling_average_wpm(0, 400), 200);
    }

    #[test]
    fn recent_sessions_newest_first_with_titles() {
        let mut lib = Library::open_in_memory().unwrap();
        let a = lib.add_book(&sample_book("Alpha", "w")).unwrap();
        let b = lib.add_book(&sample_book("Beta", "w")).unwrap();
        let t = local_noon(2024, 6, 1);

        lib.create_session(&entry(a, t, 10, 200)).unwrap();
        lib.create_session(&entry(b, t + TimeDelta::minutes(30), 20, 250))
            .unwrap();

        let sessions = lib.recent_sessions(10).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].book_title, "Beta");
        assert_eq!(sessions[0].words_read, 20);
        assert_eq!(sessions[1].book_title, "Alpha");
        assert_eq!(sessions[1].duration_secs, 120);

        assert_eq!(lib.recent_sessions(1).unwrap().len(), 1);
    }

    #[test]
    fn list_books_prefers_recently_read() {
        let mut lib = Library::open_in_memory().unwrap();
        let first = lib.add_book(&sample_book("First", "a b")).unwrap();
        let second = lib.add_book(&sample_book("Second", "a b")).unwrap();

        lib.update_progress(first, 1, false).unwrap();

        let books = lib.list_books().unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].id, first);
        assert_eq!(books[0].current_position, 1);
        assert_eq!(books[1].id, second);
    }

    #[test]
    fn bookmarks_are_ordered_by_position() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("B", "a b c d e")).unwrap();

        lib.add_bookmark(id, 4, Some("ending")).unwrap();
        let early = lib.add_bookmark(id, 1, None).unwrap();

        let marks = lib.bookmarks(id).unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].word_position, 1);
        assert_eq!(marks[0].note, None);
        assert_eq!(marks[1].note.as_deref(), Some("ending"));

        assert_eq!(lib.get_bookmark(early).unwrap().word_position, 1);
        lib.delete_bookmark(early).unwrap();
        assert_eq!(lib.bookmarks(id).unwrap().len(), 1);
        assert_matches!(
            lib.delete_bookmark(early),
            Err(StoreError::BookmarkNotFound(_))
        );
    }

    #[test]
    fn delete_book_cascades() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("Gone", "a b")).unwrap();
        lib.add_bookmark(id, 0, None).unwrap();
        lib.create_session(&entry(id, Utc::now(), 2, 300)).unwrap();

        lib.delete_book(id).unwrap();

        assert!(lib.list_books().unwrap().is_empty());
        assert!(lib.bookmarks(id).unwrap().is_empty());
        assert!(lib.recent_sessions(10).unwrap().is_empty());
        assert_matches!(lib.delete_book(id), Err(StoreError::BookNotFound(_)));
    }

    #[test]
    fn export_writes_header_and_rows() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("Csv, Book", "w")).unwrap();
        lib.create_session(&entry(id, local_noon(2024, 2, 2), 42, 310))
            .unwrap();

        let mut buf = Vec::new();
        let rows = lib.export_sessions_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(rows, 1);
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("book_id,book_title,start_time,end_time,words_read,average_wpm,duration_secs")
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"Csv, Book\""));
        assert!(row.ends_with(",42,310,120"));
    }

    #[test]
    fn database_file_is_created_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("library.db");
        {
            let mut lib = Library::open(&path).unwrap();
            lib.add_book(&sample_book("Persisted", "a")).unwrap();
        }
        assert!(path.exists());
        let lib = Library::open(&path).unwrap();
        assert_eq!(lib.list_books().unwrap().len(), 1);
    }

    fn goal(kind: GoalKind, target: u64, start: NaiveDate, end: NaiveDate) -> NewGoal {
        NewGoal::new(kind, target, GoalPeriod::Daily, start, Some(end))
    }

    #[test]
    fn sessions_advance_running_goals_only() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("B", "w")).unwrap();
        let march = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let march_end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let april = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();

        let words = lib
            .create_goal(&goal(GoalKind::Words, 1000, march, march_end))
            .unwrap();
        let time = lib
            .create_goal(&goal(GoalKind::Time, 200, march, march_end))
            .unwrap();
        let later = lib
            .create_goal(&goal(GoalKind::Words, 10, april, april))
            .unwrap();

        lib.create_session(&entry(id, local_noon(2024, 3, 10), 600, 300))
            .unwrap();
        lib.create_session(&entry(id, local_noon(2024, 3, 11), 500, 300))
            .unwrap();

        let goals = lib.goals().unwrap();
        let by_id = |gid: i64| goals.iter().find(|g| g.id == gid).unwrap();
        assert_eq!(by_id(words).current_value, 1100);
        assert!(by_id(words).completed);
        assert_eq!(by_id(time).current_value, 240);
        assert!(by_id(time).completed);
        assert_eq!(by_id(later).current_value, 0);
        assert!(!by_id(later).completed);
    }

    #[test]
    fn streak_goal_follows_the_best_streak() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("B", "w")).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let gid = lib
            .create_goal(&goal(GoalKind::Streak, 3, start, end))
            .unwrap();

        for day in [1, 2, 3, 7] {
            lib.create_session(&entry(id, local_noon(2024, 5, day), 10, 300))
                .unwrap();
        }

        let goal = &lib.goals().unwrap()[0];
        assert_eq!(goal.id, gid);
        assert_eq!(goal.current_value, 3);
        assert!(goal.completed);
    }

    #[test]
    fn finishing_a_book_counts_once_towards_book_goals() {
        let mut lib = Library::open_in_memory().unwrap();
        let id = lib.add_book(&sample_book("Short", "a b")).unwrap();
        let today = Local::now().date_naive();
        lib.create_goal(&NewGoal::new(
            GoalKind::Books,
            2,
            GoalPeriod::Monthly,
            today,
            None,
        ))
        .unwrap();

        lib.update_progress(id, 2, true).unwrap();
        lib.update_progress(id, 2, true).unwrap();

        let goal = &lib.goals().unwrap()[0];
        assert_eq!(goal.current_value, 1);
        assert!(!goal.completed);
        assert_eq!(goal.progress_percent(), 50.0);
    }

    #[test]
    fn goals_are_validated_and_deletable() {
        let mut lib = Library::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 8, 10).unwrap();
        let before = NaiveDate::from_ymd_opt(2024, 8, 9).unwrap();

        assert_matches!(
            lib.create_goal(&goal(GoalKind::Words, 0, day, day)),
            Err(StoreError::InvalidGoal(_))
        );
        assert_matches!(
            lib.create_goal(&goal(GoalKind::Words, 10, day, before)),
            Err(StoreError::InvalidGoal(_))
        );

        let gid = lib.create_goal(&goal(GoalKind::Words, 10, day, day)).unwrap();
        let stored = &lib.goals().unwrap()[0];
        assert_eq!(stored.kind, GoalKind::Words);
        assert_eq!(stored.period, GoalPeriod::Daily);
        assert_eq!((stored.start_date, stored.end_date), (day, day));

        lib.delete_goal(gid).unwrap();
        assert!(lib.goals().unwrap().is_empty());
        assert_matches!(lib.delete_goal(gid), Err(StoreError::GoalNotFound(_)));
    }
}
