use std::time::{Duration, Instant};

use crate::config::Preferences;
use crate::pacing::{clamp_wpm, delay_for_word, highlight_index, RedLetterPosition};
use crate::sequencer::WordSequence;
use crate::session::{SessionAccumulator, SessionRecord};
use crate::timer::{SystemTimeSource, TickTimer, TimeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing,
    Paused,
    Finished,
}

/// Position, play flag and rate of one reading surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub current_index: usize,
    pub is_playing: bool,
    pub wpm: u32,
}

/// Something the clock did while being polled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Advanced { index: usize },
    /// The last word was read; the session has been closed and is handed back.
    Finished(SessionRecord),
}

/// The RSVP playback clock.
///
/// Advances through a [`WordSequence`] one word per tick. Exactly one tick is ever pending;
/// every transition away from `Playing` cancels it before anything else happens.
#[derive(Debug)]
pub struct Player<C: TimeSource = SystemTimeSource> {
    words: WordSequence,
    state: PlaybackState,
    phase: Phase,
    timer: TickTimer,
    session: SessionAccumulator,
    preferences: Preferences,
    clock: C,
}

impl<C: TimeSource> Player<C> {
    pub fn new(words: WordSequence, preferences: Preferences, clock: C) -> Self {
        Self {
            words,
            state: PlaybackState {
                current_index: 0,
                is_playing: false,
                wpm: preferences.starting_wpm(),
            },
            phase: Phase::Idle,
            timer: TickTimer::new(),
            session: SessionAccumulator::new(),
            preferences,
            clock,
        }
    }

    /// Swap in a new document and position the clock at `start_index` (clamped to the end).
    ///
    /// The session is left alone; the caller decides whether to close it first.
    pub fn load(&mut self, words: WordSequence, start_index: usize) {
        let was_playing = self.phase == Phase::Playing;
        self.timer.cancel();
        self.words = words;
        self.state.current_index = start_index.min(self.words.len());

        self.phase = if self.words.is_empty() {
            if was_playing {
                Phase::Paused
            } else {
                Phase::Idle
            }
        } else if self.state.current_index >= self.words.len() {
            Phase::Finished
        } else if was_playing {
            self.schedule_current(self.clock.now());
            Phase::Playing
        } else {
            Phase::Idle
        };
        self.state.is_playing = self.phase == Phase::Playing;
    }

    pub fn words(&self) -> &WordSequence {
        &self.words
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn wpm(&self) -> u32 {
        self.state.wpm
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn session(&self) -> &SessionAccumulator {
        &self.session
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn current_word(&self) -> Option<&str> {
        self.words.get(self.state.current_index)
    }

    /// Highlight index for the current word, re-evaluated on every call
    pub fn current_highlight(&self) -> Option<usize> {
        self.current_word()
            .and_then(|w| highlight_index(w, self.preferences.red_letter_position))
    }

    pub fn red_letter_position(&self) -> RedLetterPosition {
        self.preferences.red_letter_position
    }

    /// When the pending tick fires, if one is scheduled
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn progress_percent(&self) -> f64 {
        if self.words.is_empty() {
            return 0.0;
        }
        self.state.current_index as f64 / self.words.len() as f64 * 100.0
    }

    /// Whole seconds left at the current rate, ignoring punctuation pauses
    pub fn seconds_remaining(&self) -> u64 {
        let left = self.words.len().saturating_sub(self.state.current_index);
        (left as f64 / (self.state.wpm as f64 / 60.0)).ceil() as u64
    }

    /// Start or resume. A no-op on an empty or finished sequence, or when already playing.
    pub fn play(&mut self) -> bool {
        if self.phase == Phase::Playing
            || self.words.is_empty()
            || self.state.current_index >= self.words.len()
        {
            return false;
        }

        if self.session.start(self.clock.wall_clock()) {
            tracing::debug!(index = self.state.current_index, "reading session started");
        }
        self.timer.cancel();
        self.phase = Phase::Playing;
        self.state.is_playing = true;
        self.schedule_current(self.clock.now());
        tracing::debug!(index = self.state.current_index, wpm = self.state.wpm, "playing");
        true
    }

    pub fn pause(&mut self) -> bool {
        self.timer.cancel();
        if self.phase != Phase::Playing {
            return false;
        }
        self.phase = Phase::Paused;
        self.state.is_playing = false;
        tracing::debug!(index = self.state.current_index, "paused");
        true
    }

    pub fn toggle(&mut self) -> bool {
        if self.phase == Phase::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Set the rate. Clamped into range; the pending wait keeps its original length.
    pub fn set_wpm(&mut self, requested: i64) -> u32 {
        self.state.wpm = clamp_wpm(requested);
        self.state.wpm
    }

    pub fn adjust_wpm(&mut self, delta: i64) -> u32 {
        self.set_wpm(self.state.wpm as i64 + delta)
    }

    /// Replace the preference snapshot. Pacing changes apply from the next scheduled wait.
    pub fn reload_preferences(&mut self, preferences: Preferences) {
        self.preferences = preferences;
    }

    /// Move by `delta` words, clamped to `[0, len - 1]`. Never counts as words read.
    pub fn skip_words(&mut self, delta: i64) {
        let target = self.state.current_index as i64 + delta;
        self.seek_to(target.max(0) as usize);
    }

    /// Jump to `index`, clamped to `[0, len - 1]`
    pub fn seek_to(&mut self, index: usize) {
        if self.words.is_empty() {
            return;
        }
        let target = index.min(self.words.len() - 1);
        let playing = self.phase == Phase::Playing;
        self.timer.cancel();
        self.state.current_index = target;

        if playing {
            self.schedule_current(self.clock.now());
        } else if self.phase == Phase::Finished {
            self.phase = Phase::Paused;
        }
    }

    pub fn step_forward(&mut self) {
        if self.state.current_index + 1 < self.words.len() {
            self.skip_words(1);
        }
    }

    pub fn step_back(&mut self) {
        if self.state.current_index > 0 {
            self.skip_words(-1);
        }
    }

    /// Fire every tick whose deadline has passed.
    ///
    /// Each following tick is scheduled from the deadline of the one that just fired, so
    /// a late poll catches up word by word instead of stretching the current one.
    pub fn poll(&mut self) -> Vec<PlayerEvent> {
        let now = self.clock.now();
        let mut events = Vec::new();

        while self.phase == Phase::Playing {
            let Some(fired_at) = self.timer.take_due(now) else {
                break;
            };

            self.state.current_index += 1;
            self.session.increment_words_read();

            if self.state.current_index < self.words.len() {
                events.push(PlayerEvent::Advanced {
                    index: self.state.current_index,
                });
                self.schedule_current(fired_at);
            } else {
                self.phase = Phase::Finished;
                self.state.is_playing = false;
                let record = self.session.end(self.clock.wall_clock());
                tracing::info!(words_read = record.words_read, "reached end of document");
                events.push(PlayerEvent::Finished(record));
            }
        }

        events
    }

    /// Forced pause for teardown. Returns the closed session (empty if none was active).
    pub fn close(&mut self) -> SessionRecord {
        self.timer.cancel();
        if self.phase == Phase::Playing {
            self.phase = Phase::Paused;
        }
        self.state.is_playing = false;
        self.session.end(self.clock.wall_clock())
    }

    /// Time until the next tick, if one is pending
    pub fn time_to_next_tick(&self) -> Option<Duration> {
        self.timer.remaining(self.clock.now())
    }

    fn schedule_current(&mut self, from: Instant) {
        let Some(word) = self.words.get(self.state.current_index) else {
            return;
        };
        let delay = delay_for_word(word, self.state.wpm, self.preferences.pause_on_punctuation);
        if let Err(err) = self.timer.schedule_at(from + delay) {
            tracing::error!(%err, index = self.state.current_index, "tick left unscheduled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimeSource;
    use assert_matches::assert_matches;

    fn prefs(wpm: u32) -> Preferences {
        Preferences {
            default_wpm: wpm,
            red_letter_position: RedLetterPosition::First,
            pause_on_punctuation: true,
        }
    }

    fn player(text: &str, wpm: u32) -> (Player<ManualTimeSource>, ManualTimeSource) {
        let clock = ManualTimeSource::new();
        let p = Player::new(WordSequence::from_text(text), prefs(wpm), clock.clone());
        (p, clock)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn plays_three_words_at_600_wpm() {
        let (mut p, clock) = player("The quick fox", 600);
        assert!(p.play());

        clock.advance(ms(250));
        let events = p.poll();

        assert_eq!(p.current_index(), 2);
        assert_eq!(p.session().words_read(), 2);
        assert_eq!(
            events,
            vec![
                PlayerEvent::Advanced { index: 1 },
                PlayerEvent::Advanced { index: 2 }
            ]
        );
        assert!(p.is_playing());
    }

    #[test]
    fn play_on_empty_sequence_is_noop() {
        let (mut p, _clock) = player("   ", 300);
        assert!(!p.play());
        assert_eq!(p.phase(), Phase::Idle);
        assert!(p.next_deadline().is_none());
        assert!(!p.session().is_active());
    }

    #[test]
    fn natural_completion_finishes_once() {
        let (mut p, clock) = player("one two", 600);
        p.play();

        clock.advance(ms(1_000));
        let events = p.poll();

        assert_eq!(p.phase(), Phase::Finished);
        assert_eq!(p.current_index(), 2);
        assert!(!p.state().is_playing);
        assert!(p.next_deadline().is_none());
        let finished: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, PlayerEvent::Finished(_)))
            .collect();
        assert_eq!(finished.len(), 1);
        assert_matches!(finished[0], PlayerEvent::Finished(r) if r.words_read == 2);

        clock.advance(ms(1_000));
        assert!(p.poll().is_empty());
    }

    #[test]
    fn pause_cancels_pending_tick() {
        let (mut p, clock) = player("alpha beta gamma", 600);
        p.play();
        clock.advance(ms(50));
        assert!(p.pause());

        clock.advance(ms(500));
        assert!(p.poll().is_empty());
        assert_eq!(p.current_index(), 0);
        assert!(p.next_deadline().is_none());
    }

    #[test]
    fn resume_keeps_index_and_session() {
        let (mut p, clock) = player("a b c d e", 600);
        p.play();
        let started = p.session().started_at();
        clock.advance(ms(100));
        p.poll();
        p.pause();

        clock.advance(ms(5_000));
        assert!(p.play());
        assert_eq!(p.current_index(), 1);
        assert_eq!(p.session().started_at(), started);
        assert_eq!(p.session().words_read(), 1);

        clock.advance(ms(100));
        p.poll();
        assert_eq!(p.current_index(), 2);
        assert_eq!(p.session().words_read(), 2);
    }

    #[test]
    fn skip_clamps_to_last_word() {
        let (mut p, _clock) = player("a b c d e", 300);
        p.skip_words(10);
        assert_eq!(p.current_index(), 4);
        assert_ne!(p.phase(), Phase::Finished);

        p.skip_words(-100);
        assert_eq!(p.current_index(), 0);
    }

    #[test]
    fn skip_while_playing_reschedules_without_counting() {
        let (mut p, clock) = player("a b c d e f g", 600);
        p.play();
        clock.advance(ms(80));
        p.skip_words(3);

        assert_eq!(p.current_index(), 3);
        assert_eq!(p.session().words_read(), 0);
        assert_eq!(p.time_to_next_tick(), Some(ms(100)));

        clock.advance(ms(30));
        assert!(p.poll().is_empty());
        clock.advance(ms(70));
        assert_eq!(p.poll(), vec![PlayerEvent::Advanced { index: 4 }]);
    }

    #[test]
    fn manual_steps_are_not_counted() {
        let (mut p, _clock) = player("a b c", 300);
        p.play();
        p.step_forward();
        p.step_forward();
        p.step_forward();
        assert_eq!(p.current_index(), 2);
        p.step_back();
        assert_eq!(p.current_index(), 1);
        assert_eq!(p.session().words_read(), 0);
    }

    #[test]
    fn step_back_at_start_stays_put() {
        let (mut p, _clock) = player("a b", 300);
        p.step_back();
        assert_eq!(p.current_index(), 0);
    }

    #[test]
    fn wpm_change_does_not_rescale_pending_wait() {
        let (mut p, clock) = player("slow fast faster", 100);
        p.play();
        assert_eq!(p.time_to_next_tick(), Some(ms(600)));

        p.set_wpm(600);
        assert_eq!(p.time_to_next_tick(), Some(ms(600)));

        clock.advance(ms(600));
        p.poll();
        assert_eq!(p.current_index(), 1);
        assert_eq!(p.time_to_next_tick(), Some(ms(100)));
    }

    #[test]
    fn preference_reload_keeps_pending_wait() {
        let (mut p, clock) = player("a. b. c", 600);
        p.play();
        assert_eq!(p.time_to_next_tick(), Some(ms(200)));

        p.reload_preferences(Preferences {
            pause_on_punctuation: false,
            ..prefs(600)
        });
        assert_eq!(p.time_to_next_tick(), Some(ms(200)));

        clock.advance(ms(200));
        p.poll();
        assert_eq!(p.current_index(), 1);
        assert_eq!(p.time_to_next_tick(), Some(ms(100)));
    }

    #[test]
    fn wpm_is_always_clamped() {
        let (mut p, _clock) = player("a", 300);
        assert_eq!(p.set_wpm(20), 100);
        assert_eq!(p.adjust_wpm(-50), 100);
        assert_eq!(p.set_wpm(2_000), 1000);
        assert_eq!(p.adjust_wpm(50), 1000);
        assert_eq!(p.adjust_wpm(-10), 990);
    }

    #[test]
    fn punctuation_lengthens_wait() {
        let (mut p, clock) = player("Stop. Go,", 600);
        p.play();
        assert_eq!(p.time_to_next_tick(), Some(ms(200)));
        clock.advance(ms(200));
        p.poll();
        assert_eq!(p.time_to_next_tick(), Some(ms(150)));
    }

    #[test]
    fn finished_requires_seek_before_replay() {
        let (mut p, clock) = player("x y", 600);
        p.play();
        clock.advance(ms(500));
        p.poll();
        assert!(p.is_finished());

        assert!(!p.play());
        p.seek_to(0);
        assert_eq!(p.phase(), Phase::Paused);
        assert!(p.play());
        assert!(p.session().is_active());
    }

    #[test]
    fn close_forces_pause_and_returns_session() {
        let (mut p, clock) = player("a b c d", 600);
        p.play();
        clock.advance(ms(150));
        p.poll();

        let record = p.close();
        assert_eq!(record.words_read, 1);
        assert_eq!(p.phase(), Phase::Paused);
        assert!(p.next_deadline().is_none());

        clock.advance(ms(1_000));
        assert!(p.poll().is_empty());
        assert!(p.close().is_empty());
    }

    #[test]
    fn load_keeps_explicit_position_and_pauses_on_empty() {
        let (mut p, _clock) = player("a b c", 300);
        p.load(WordSequence::from_text("one two three four"), 2);
        assert_eq!(p.current_index(), 2);
        assert_eq!(p.phase(), Phase::Idle);

        p.play();
        p.load(WordSequence::default(), 0);
        assert_eq!(p.phase(), Phase::Paused);
        assert!(p.next_deadline().is_none());
    }

    #[test]
    fn load_at_end_is_finished() {
        let (mut p, _clock) = player("", 300);
        p.load(WordSequence::from_text("a b"), 7);
        assert_eq!(p.current_index(), 2);
        assert!(p.is_finished());
    }

    #[test]
    fn progress_and_time_remaining() {
        let (mut p, _clock) = player("a b c d e f g h i j", 300);
        p.seek_to(5);
        assert_eq!(p.progress_percent(), 50.0);
        // 5 words at 5 words/sec
        assert_eq!(p.seconds_remaining(), 1);
        p.set_wpm(100);
        assert_eq!(p.seconds_remaining(), 3);
    }

    #[test]
    fn index_never_decreases_while_playing_without_seek() {
        let (mut p, clock) = player("a, b. c d! e f; g h i j", 1000);
        p.play();
        let mut last = p.current_index();
        for _ in 0..40 {
            clock.advance(ms(37));
            for event in p.poll() {
                if let PlayerEvent::Advanced { index } = event {
                    assert_eq!(index, last + 1);
                    last = index;
                }
            }
            assert!(p.current_index() >= last);
        }
        assert!(p.is_finished());
        assert_eq!(p.current_index(), p.words().len());
    }
}
