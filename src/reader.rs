use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::config::Preferences;
use crate::library::BookId;
use crate::persistence::{
    FlushReport, FlushRequest, Notice, PersistenceBridge, ReaderBackend, WriteOutcome,
};
use crate::player::{Phase, Player, PlayerEvent};
use crate::sequencer::WordSequence;
use crate::session::SessionRecord;
use crate::timer::{SystemTimeSource, TimeSource};

pub const WPM_STEP_LARGE: i64 = 50;
pub const WPM_STEP_SMALL: i64 = 10;
pub const SKIP_WORDS: i64 = 10;

/// What a key press asks the reading surface to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderCommand {
    TogglePlay,
    AdjustWpm(i64),
    /// Single word step, not counted as read
    Step(i64),
    Skip(i64),
    Restart,
    AddBookmark,
    CycleHighlight,
    TogglePunctuationPause,
    Close,
}

pub fn command_for_key(key: KeyEvent) -> Option<ReaderCommand> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(ReaderCommand::Close);
    }

    match key.code {
        KeyCode::Char(' ') => Some(ReaderCommand::TogglePlay),
        KeyCode::Up => Some(ReaderCommand::AdjustWpm(WPM_STEP_LARGE)),
        KeyCode::Down => Some(ReaderCommand::AdjustWpm(-WPM_STEP_LARGE)),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(ReaderCommand::AdjustWpm(WPM_STEP_SMALL)),
        KeyCode::Char('-') => Some(ReaderCommand::AdjustWpm(-WPM_STEP_SMALL)),
        KeyCode::Left => Some(ReaderCommand::Step(-1)),
        KeyCode::Right => Some(ReaderCommand::Step(1)),
        KeyCode::Char('[') => Some(ReaderCommand::Skip(-SKIP_WORDS)),
        KeyCode::Char(']') => Some(ReaderCommand::Skip(SKIP_WORDS)),
        KeyCode::Home => Some(ReaderCommand::Restart),
        KeyCode::Char('b') => Some(ReaderCommand::AddBookmark),
        KeyCode::Char('h') => Some(ReaderCommand::CycleHighlight),
        KeyCode::Char('p') => Some(ReaderCommand::TogglePunctuationPause),
        KeyCode::Esc => Some(ReaderCommand::Close),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// The book being read on a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenBook {
    pub id: BookId,
    pub title: String,
    pub words: WordSequence,
    pub start_position: usize,
}

/// One open reading view: a playback clock bound to a book and its stores.
///
/// The surface flushes once when the book is finished and once when it is closed. Only a
/// finish reached by ticking through the last word counts as completed. Dropping an open
/// surface closes it.
pub struct ReadingSurface<B: ReaderBackend, C: TimeSource = SystemTimeSource> {
    book_id: BookId,
    title: String,
    player: Player<C>,
    bridge: PersistenceBridge<B>,
    finished_naturally: bool,
    completion_flushed: bool,
    closed: bool,
}

impl<B: ReaderBackend, C: TimeSource> ReadingSurface<B, C> {
    pub fn open(
        book: OpenBook,
        preferences: Preferences,
        bridge: PersistenceBridge<B>,
        clock: C,
    ) -> Self {
        let mut player = Player::new(WordSequence::default(), preferences, clock);
        player.load(book.words, book.start_position);
        tracing::info!(
            book_id = book.id,
            position = player.current_index(),
            words = player.words().len(),
            wpm = player.wpm(),
            "opened reading surface"
        );

        Self {
            book_id: book.id,
            title: book.title,
            player,
            bridge,
            finished_naturally: false,
            completion_flushed: false,
            closed: false,
        }
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn player(&self) -> &Player<C> {
        &self.player
    }

    pub fn backend(&self) -> &B {
        self.bridge.backend()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn handle(&mut self, command: ReaderCommand) -> Flow {
        if self.closed {
            return Flow::Exit;
        }

        match command {
            ReaderCommand::TogglePlay => {
                self.player.toggle();
            }
            ReaderCommand::AdjustWpm(delta) => {
                let wpm = self.player.adjust_wpm(delta);
                tracing::debug!(wpm, "rate changed");
            }
            ReaderCommand::Step(delta) if delta < 0 => self.player.step_back(),
            ReaderCommand::Step(_) => self.player.step_forward(),
            ReaderCommand::Skip(delta) => self.player.skip_words(delta),
            ReaderCommand::Restart => self.player.seek_to(0),
            ReaderCommand::AddBookmark => self.add_bookmark(),
            ReaderCommand::CycleHighlight => {
                let mut preferences = *self.player.preferences();
                preferences.red_letter_position = preferences.red_letter_position.next();
                self.reload_preferences(preferences);
                self.bridge.notify(Notice::info(format!(
                    "Highlight: {}",
                    preferences.red_letter_position
                )));
            }
            ReaderCommand::TogglePunctuationPause => {
                let mut preferences = *self.player.preferences();
                preferences.pause_on_punctuation = !preferences.pause_on_punctuation;
                self.reload_preferences(preferences);
                let state = if preferences.pause_on_punctuation { "on" } else { "off" };
                self.bridge
                    .notify(Notice::info(format!("Punctuation pause {state}")));
            }
            ReaderCommand::Close => {
                self.close();
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Flow {
        match command_for_key(key) {
            Some(command) => self.handle(command),
            None => Flow::Continue,
        }
    }

    /// Jump straight to a word, e.g. a bookmark
    pub fn seek_to(&mut self, index: usize) {
        self.player.seek_to(index);
    }

    /// Swap the preference snapshot. The word on screen keeps its wait; the next one uses
    /// the new pacing.
    pub fn reload_preferences(&mut self, preferences: Preferences) {
        tracing::debug!(?preferences, "preferences reloaded");
        self.player.reload_preferences(preferences);
    }

    /// Drive the clock. Reaching the end flushes progress as completed.
    pub fn poll(&mut self) -> Vec<PlayerEvent> {
        let events = self.player.poll();
        for event in &events {
            if let PlayerEvent::Finished(record) = event {
                self.finished_naturally = true;
                let report = self.flush(*record, true);
                self.completion_flushed = !report.progress.is_failed();
            }
        }
        events
    }

    /// Close the surface and flush the session and position. Safe to call more than once.
    pub fn close(&mut self) -> FlushReport {
        if self.closed {
            return FlushReport::skipped();
        }
        self.closed = true;

        let record = self.player.close();
        // A seek after the finish leaves Finished, which takes the completion back
        let finished = self.finished_naturally && self.player.phase() == Phase::Finished;
        if finished && self.completion_flushed {
            tracing::debug!(book_id = self.book_id, "closing finished surface");
            return FlushReport::skipped();
        }
        self.flush(record, finished)
    }

    fn flush(&mut self, record: SessionRecord, completed: bool) -> FlushReport {
        let report = self.bridge.flush(FlushRequest {
            book_id: self.book_id,
            position: self.player.current_index(),
            completed,
            session: record,
            wpm: self.player.wpm(),
            ended_at: self.player.clock().wall_clock(),
        });
        if completed && report.progress == WriteOutcome::Written {
            self.bridge
                .notify(Notice::info(format!("Finished \"{}\"", self.title)));
        }
        report
    }

    fn add_bookmark(&mut self) {
        let position = self.player.current_index();
        match self
            .bridge
            .backend_mut()
            .add_bookmark(self.book_id, position, None)
        {
            Ok(id) => {
                tracing::info!(
                    book_id = self.book_id,
                    position,
                    bookmark_id = id,
                    "bookmark added"
                );
                self.bridge
                    .notify(Notice::info(format!("Bookmark {id} at word {}", position + 1)));
            }
            Err(err) => {
                tracing::error!(book_id = self.book_id, %err, "failed to add bookmark");
                self.bridge
                    .notify(Notice::error(format!("Could not add bookmark: {err}")));
            }
        }
    }
}

impl<B: ReaderBackend, C: TimeSource> Drop for ReadingSurface<B, C> {
    fn drop(&mut self) {
        self.close();
    }
}
