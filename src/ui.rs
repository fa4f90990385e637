use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::pacing::split_at_highlight;
use crate::persistence::{Notice, NoticeLevel, ReaderBackend};
use crate::player::Phase;
use crate::reader::ReadingSurface;
use crate::timer::TimeSource;
use crate::util::format_duration;

const LEGEND: &str = concat!(
    "(space) play/pause  (↑/↓ +/-) speed  (←/→) word  ([/]) skip  ",
    "(b)ookmark  (h)ighlight  (p)unctuation  (esc)ape"
);
const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

/// Snapshot of everything the reading screen draws
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderView<'a> {
    pub title: &'a str,
    pub word: Option<&'a str>,
    pub highlight: Option<usize>,
    pub phase: Phase,
    pub wpm: u32,
    pub index: usize,
    pub total: usize,
    pub words_read: u64,
    pub progress_percent: f64,
    pub seconds_remaining: u64,
    pub notice: Option<&'a Notice>,
}

impl<'a> ReaderView<'a> {
    /// Capture the surface for one frame. A random highlight is rolled again every call.
    pub fn from_surface<B: ReaderBackend, C: TimeSource>(
        surface: &'a ReadingSurface<B, C>,
        notice: Option<&'a Notice>,
    ) -> Self {
        let player = surface.player();
        Self {
            title: surface.title(),
            word: player.current_word(),
            highlight: player.current_highlight(),
            phase: player.phase(),
            wpm: player.wpm(),
            index: player.current_index(),
            total: player.words().len(),
            words_read: player.session().words_read(),
            progress_percent: player.progress_percent(),
            seconds_remaining: player.seconds_remaining(),
            notice,
        }
    }

    fn status(&self) -> &'static str {
        match self.phase {
            Phase::Idle => "press space to start",
            Phase::Playing => "",
            Phase::Paused => "paused",
            Phase::Finished => "finished",
        }
    }
}

/// Word with the highlighted letter in red, padded so that letter sits on `center`
fn word_line<'w>(word: &'w str, highlight: Option<usize>, center: u16) -> Line<'w> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let red = bold.fg(Color::Red);

    match highlight.and_then(|idx| split_at_highlight(word, idx)) {
        Some((before, letter, after)) => {
            let pad = (center as usize).saturating_sub(before.width());
            Line::from(vec![
                Span::raw(" ".repeat(pad)),
                Span::styled(before, bold),
                Span::styled(letter, red),
                Span::styled(after, bold),
            ])
        }
        None => {
            let pad = (center as usize).saturating_sub(word.width() / 2);
            Line::from(vec![Span::raw(" ".repeat(pad)), Span::styled(word, bold)])
        }
    }
}

impl Widget for &ReaderView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // title
                Constraint::Min(0),
                Constraint::Length(1), // word
                Constraint::Length(1), // status
                Constraint::Min(0),
                Constraint::Length(1), // progress
                Constraint::Length(1), // stats
                Constraint::Length(1), // notice
                Constraint::Length(1), // legend
            ])
            .split(area);

        Paragraph::new(Span::styled(self.title, dim_style))
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        if let Some(word) = self.word {
            let center = chunks[2].width / 2;
            Paragraph::new(word_line(word, self.highlight, center)).render(chunks[2], buf);
        }

        Paragraph::new(Span::styled(
            self.status(),
            Style::default().fg(Color::Yellow).patch(italic_style),
        ))
        .alignment(Alignment::Center)
        .render(chunks[3], buf);

        let ratio = (self.progress_percent / 100.0).clamp(0.0, 1.0);
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio(ratio)
            .label(format!("{:.0}%", self.progress_percent))
            .render(chunks[5], buf);

        Paragraph::new(Span::styled(
            format!(
                "{} wpm   word {}/{}   {} read   {} left",
                self.wpm,
                (self.index + 1).min(self.total),
                self.total,
                self.words_read,
                format_duration(self.seconds_remaining)
            ),
            bold_style,
        ))
        .alignment(Alignment::Center)
        .render(chunks[6], buf);

        if let Some(notice) = self.notice {
            let color = match notice.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Error => Color::Red,
            };
            Paragraph::new(Span::styled(
                notice.message.as_str(),
                Style::default().fg(color),
            ))
            .alignment(Alignment::Center)
            .render(chunks[7], buf);
        }

        Paragraph::new(Span::styled(LEGEND, italic_style))
        .alignment(Alignment::Center)
        .render(chunks[8], buf);
    }
}
