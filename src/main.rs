use blink::{
    app_dirs::AppDirs,
    config::{ConfigStore, FileConfigStore, Preferences},
    error::StoreError,
    extract::{self, Overrides},
    goals::{GoalKind, GoalPeriod, NewGoal},
    library::{BookId, Library},
    logging,
    pacing::{clamp_wpm, RedLetterPosition},
    persistence::{BookmarkStore, Notice, NoticeLevel, PersistenceBridge},
    reader::{Flow, OpenBook, ReadingSurface},
    runtime::{CrosstermEventSource, FixedTicker, ReaderEvent, Runner},
    sequencer::WordSequence,
    timer::SystemTimeSource,
    ui::ReaderView,
    util::{format_duration, last_read_label, percent},
};
use chrono::{Local, NaiveDate, Utc};
use clap::{builder::BoolishValueParser, error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use itertools::Itertools;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::File,
    io::{self, stdin, Read, Stdout},
    path::PathBuf,
    sync::mpsc::{self, Receiver},
    time::Duration,
};

const TICK_RATE_MS: u64 = 100;
const RECENT_SESSIONS: usize = 5;

/// terminal speed reader: one word at a time, at the pace you choose
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal RSVP speed reader. Books live in a local library that remembers your position, reading sessions, streaks, bookmarks and goals."
)]
pub struct Cli {
    /// library database to use instead of the default location
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// add a plain text document to the library
    Add {
        file: PathBuf,
        #[clap(short, long)]
        title: Option<String>,
        #[clap(short, long)]
        author: Option<String>,
    },
    /// add text read from stdin
    Paste {
        #[clap(short, long)]
        title: Option<String>,
        #[clap(short, long)]
        author: Option<String>,
    },
    /// list books with their progress
    List,
    /// read a book
    Read(ReadArgs),
    /// show reading statistics and recent sessions
    Stats {
        #[clap(short = 'n', long, default_value_t = RECENT_SESSIONS)]
        sessions: usize,
    },
    /// list, add or remove bookmarks of a book
    Bookmarks(BookmarkArgs),
    /// manage reading goals
    Goal {
        #[clap(subcommand)]
        action: GoalAction,
    },
    /// show or change the saved reading preferences
    Prefs(PrefsArgs),
    /// export all reading sessions as CSV
    Export { path: PathBuf },
    /// remove a book with its progress, sessions and bookmarks
    Delete { id: BookId },
}

#[derive(clap::Args, Debug, Clone)]
pub struct BookmarkArgs {
    id: BookId,

    /// bookmark a word (1-based) of the book
    #[clap(
        long,
        value_name = "WORD",
        conflicts_with = "delete",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    add: Option<u64>,

    /// note to attach to the new bookmark
    #[clap(long, requires = "add")]
    note: Option<String>,

    /// remove a bookmark of the book
    #[clap(long, value_name = "BOOKMARK_ID")]
    delete: Option<i64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GoalAction {
    /// set a new goal (time targets are in minutes)
    Add {
        #[clap(value_enum)]
        kind: GoalKind,
        #[clap(value_parser = clap::value_parser!(u64).range(1..))]
        target: u64,
        #[clap(short, long, value_enum, default_value_t = GoalPeriod::Daily)]
        period: GoalPeriod,
        /// first day of the goal, defaults to today (YYYY-MM-DD)
        #[clap(long)]
        start: Option<NaiveDate>,
        /// last day of the goal, defaults to the end of the period (YYYY-MM-DD)
        #[clap(long)]
        end: Option<NaiveDate>,
    },
    /// list goals with their progress
    List,
    /// remove a goal
    Delete { id: i64 },
}

#[derive(clap::Args, Debug, Clone)]
pub struct PrefsArgs {
    /// default speed in words per minute (100-1000)
    #[clap(short, long)]
    wpm: Option<u32>,

    /// which letter of each word is highlighted
    #[clap(short, long, value_enum)]
    position: Option<RedLetterPosition>,

    /// linger on words ending a sentence or clause (on/off)
    #[clap(long, value_name = "on|off", value_parser = BoolishValueParser::new())]
    punctuation_pause: Option<bool>,
}

impl PrefsArgs {
    fn is_empty(&self) -> bool {
        self.wpm.is_none() && self.position.is_none() && self.punctuation_pause.is_none()
    }

    /// Apply the given flags to `saved`, clamping the rate into range
    fn apply(&self, saved: Preferences) -> Preferences {
        Preferences {
            default_wpm: self
                .wpm
                .map(|wpm| clamp_wpm(wpm as i64))
                .unwrap_or(saved.default_wpm),
            red_letter_position: self.position.unwrap_or(saved.red_letter_position),
            pause_on_punctuation: self.punctuation_pause.unwrap_or(saved.pause_on_punctuation),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ReadArgs {
    id: BookId,

    /// starting speed in words per minute (100-1000)
    #[clap(short, long)]
    wpm: Option<u32>,

    /// which letter of each word is highlighted
    #[clap(short, long, value_enum)]
    position: Option<RedLetterPosition>,

    /// show every word for the same time regardless of punctuation
    #[clap(long)]
    no_punctuation_pause: bool,

    /// start at a bookmark instead of the saved position
    #[clap(long, value_name = "BOOKMARK_ID")]
    at_bookmark: Option<i64>,
}

impl ReadArgs {
    /// Apply one-off overrides on top of the saved preferences
    fn preferences(&self, saved: Preferences) -> Preferences {
        Preferences {
            default_wpm: self.wpm.unwrap_or(saved.default_wpm),
            red_letter_position: self.position.unwrap_or(saved.red_letter_position),
            pause_on_punctuation: saved.pause_on_punctuation && !self.no_punctuation_pause,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let _log_guard = AppDirs::log_dir().and_then(|dir| logging::init(&dir));
    let config_store = FileConfigStore::new();
    let config = config_store.load();

    let db_path = cli
        .db
        .clone()
        .or(config.database_path.clone())
        .or_else(AppDirs::db_path)
        .ok_or("could not determine where to keep the library database")?;
    tracing::debug!(db = %db_path.display(), command = ?cli.command, "starting");
    let mut library = Library::open(&db_path)?;

    match cli.command {
        Command::Add {
            file,
            title,
            author,
        } => {
            let document = extract::load_document(&file, &Overrides { title, author })?;
            add_document(&mut library, document)?;
        }
        Command::Paste { title, author } => {
            let mut raw = String::new();
            stdin().read_to_string(&mut raw)?;
            let document = extract::ingest_pasted(&raw, &Overrides { title, author })?;
            add_document(&mut library, document)?;
        }
        Command::List => list_books(&library)?,
        Command::Read(args) => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }
            read_book(&mut library, &args, args.preferences(config.preferences))?;
        }
        Command::Stats { sessions } => show_stats(&library, sessions)?,
        Command::Bookmarks(args) => bookmarks(&mut library, &args)?,
        Command::Goal { action } => goals(&mut library, action)?,
        Command::Prefs(args) => update_preferences(&config_store, &args)?,
        Command::Export { path } => {
            let file = File::create(&path)?;
            let count = library.export_sessions_csv(file)?;
            println!("Exported {count} sessions to {}", path.display());
        }
        Command::Delete { id } => {
            let book = library.get_book(id)?;
            library.delete_book(id)?;
            println!("Deleted #{id} \"{}\"", book.title);
        }
    }

    Ok(())
}

fn add_document(library: &mut Library, document: extract::Document) -> Result<(), StoreError> {
    let (title, author, words) = (
        document.title.clone(),
        document.author.clone(),
        document.word_count,
    );
    let id = library.add_book(&document.into_new_book())?;
    println!("Added #{id} \"{title}\" by {author} ({words} words)");
    Ok(())
}

fn list_books(library: &Library) -> Result<(), StoreError> {
    let books = library.list_books()?;
    if books.is_empty() {
        println!("Library is empty. Add a book with `blink add <FILE>`.");
        return Ok(());
    }

    let now = Utc::now();
    let rows = books
        .iter()
        .map(|book| {
            let state = if book.completed {
                "done".to_string()
            } else {
                format!("{:.0}%", percent(book.current_position, book.word_count))
            };
            format!(
                "{:>4}  {:>5}  {} by {}  ({} words, last read {})",
                book.id,
                state,
                book.title,
                book.author,
                book.word_count,
                last_read_label(book.last_read_at, now)
            )
        })
        .join("\n");
    println!("{rows}");
    Ok(())
}

fn show_stats(library: &Library, sessions: usize) -> Result<(), StoreError> {
    let stats = library.statistics()?;
    println!("Words read:      {}", stats.total_words_read);
    println!("Books completed: {}", stats.total_books_completed);
    println!(
        "Reading time:    {}",
        format_duration(stats.total_reading_secs.max(0) as u64)
    );
    println!("Average speed:   {} wpm", stats.average_wpm);
    println!(
        "Streak:          {} days (longest {})",
        stats.current_streak, stats.longest_streak
    );

    let recent = library.recent_sessions(sessions)?;
    if !recent.is_empty() {
        println!();
        println!("Recent sessions:");
        let now = Utc::now();
        for session in recent {
            println!(
                "  {}  {} words at {} wpm in {}  ({})",
                session.book_title,
                session.words_read,
                session.average_wpm,
                format_duration(session.duration_secs.max(0) as u64),
                last_read_label(Some(session.ended_at), now)
            );
        }
    }
    Ok(())
}

fn update_preferences(store: &FileConfigStore, args: &PrefsArgs) -> Result<(), Box<dyn Error>> {
    let mut config = store.load();
    if !args.is_empty() {
        config.preferences = args.apply(config.preferences);
        store.save(&config)?;
        tracing::info!(preferences = ?config.preferences, "preferences saved");
        println!("Saved preferences to {}", store.path().display());
    }

    let prefs = config.preferences;
    println!("Speed:             {} wpm", prefs.starting_wpm());
    println!("Highlight:         {}", prefs.red_letter_position);
    println!(
        "Punctuation pause: {}",
        if prefs.pause_on_punctuation { "on" } else { "off" }
    );
    Ok(())
}

fn bookmarks(library: &mut Library, args: &BookmarkArgs) -> Result<(), Box<dyn Error>> {
    let book = library.get_book(args.id)?;

    if let Some(word) = args.add {
        if word as usize > book.word_count {
            return Err(format!("\"{}\" has only {} words", book.title, book.word_count).into());
        }
        let mark = library.add_bookmark(book.id, word as usize - 1, args.note.as_deref())?;
        println!("Bookmark {mark} at word {word} of \"{}\"", book.title);
        return Ok(());
    }

    if let Some(bookmark_id) = args.delete {
        let mark = library.get_bookmark(bookmark_id)?;
        if mark.book_id != book.id {
            return Err(StoreError::BookmarkNotFound(bookmark_id).into());
        }
        library.delete_bookmark(bookmark_id)?;
        println!("Deleted bookmark {bookmark_id} from \"{}\"", book.title);
        return Ok(());
    }

    let marks = library.bookmarks(book.id)?;
    if marks.is_empty() {
        println!("No bookmarks in \"{}\"", book.title);
        return Ok(());
    }
    for mark in marks {
        println!(
            "{:>4}  word {:>6}  {}",
            mark.id,
            mark.word_position + 1,
            mark.note.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn goals(library: &mut Library, action: GoalAction) -> Result<(), StoreError> {
    match action {
        GoalAction::Add {
            kind,
            target,
            period,
            start,
            end,
        } => {
            let start = start.unwrap_or_else(|| Local::now().date_naive());
            let goal = NewGoal::new(kind, kind.stored_target(target), period, start, end);
            let id = library.create_goal(&goal)?;
            println!(
                "Added goal #{id}: {} {} ({} to {})",
                kind.describe(goal.target_value),
                period,
                goal.start_date,
                goal.end_date
            );
        }
        GoalAction::List => {
            let goals = library.goals()?;
            if goals.is_empty() {
                println!("No goals yet. Set one with `blink goal add <KIND> <TARGET>`.");
                return Ok(());
            }
            let today = Local::now().date_naive();
            let rows = goals
                .iter()
                .map(|goal| {
                    let state = if goal.completed {
                        "done"
                    } else if goal.end_date < today {
                        "missed"
                    } else if goal.is_active_on(today) {
                        "active"
                    } else {
                        "upcoming"
                    };
                    format!(
                        "{:>4}  {:<8}  {} {}  {} / {}  ({:.0}%, {} to {})",
                        goal.id,
                        state,
                        goal.period,
                        goal.kind,
                        goal.kind.describe(goal.current_value),
                        goal.kind.describe(goal.target_value),
                        goal.progress_percent(),
                        goal.start_date,
                        goal.end_date
                    )
                })
                .join("\n");
            println!("{rows}");
        }
        GoalAction::Delete { id } => {
            library.delete_goal(id)?;
            println!("Deleted goal #{id}");
        }
    }
    Ok(())
}

fn read_book(
    library: &mut Library,
    args: &ReadArgs,
    preferences: Preferences,
) -> Result<(), Box<dyn Error>> {
    let book = library.get_book(args.id)?;
    let start_position = match args.at_bookmark {
        Some(bookmark_id) => {
            let mark = library.get_bookmark(bookmark_id)?;
            if mark.book_id != book.id {
                return Err(StoreError::BookmarkNotFound(bookmark_id).into());
            }
            mark.word_position
        }
        None => book.current_position,
    };

    let (tx, rx) = mpsc::channel();
    let open = OpenBook {
        id: book.id,
        title: book.title.clone(),
        words: WordSequence::from_text(&book.content),
        start_position,
    };

    let mut terminal = enter_terminal()?;

    let result = {
        let bridge = PersistenceBridge::new(&mut *library, Box::new(tx));
        let mut surface = ReadingSurface::open(open, preferences, bridge, SystemTimeSource);
        run_reader(&mut terminal, &mut surface, &rx)
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    for notice in rx.try_iter() {
        match notice.level {
            NoticeLevel::Info => println!("{}", notice.message),
            NoticeLevel::Error => eprintln!("{}", notice.message),
        }
    }
    result
}

/// Raw mode plus the alternate screen. A failure part way leaves the terminal as it was.
fn enter_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let setup = (|| {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        Terminal::new(CrosstermBackend::new(stdout))
    })();
    undo_on_error(setup, || {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = disable_raw_mode();
    })
}

fn undo_on_error<T, E>(result: Result<T, E>, undo: impl FnOnce()) -> Result<T, E> {
    if result.is_err() {
        undo();
    }
    result
}

fn run_reader<B: Backend>(
    terminal: &mut Terminal<B>,
    surface: &mut ReadingSurface<&mut Library, SystemTimeSource>,
    notices: &Receiver<Notice>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let mut notice: Option<Notice> = None;

    loop {
        surface.poll();
        if let Some(latest) = notices.try_iter().last() {
            notice = Some(latest);
        }

        terminal.draw(|f| {
            let view = ReaderView::from_surface(&*surface, notice.as_ref());
            f.render_widget(&view, f.area());
        })?;

        match runner.step_until(surface.player().time_to_next_tick()) {
            ReaderEvent::Key(key) => {
                if surface.handle_key(key) == Flow::Exit {
                    break;
                }
            }
            ReaderEvent::Resize | ReaderEvent::Tick => {}
        }
    }

    Ok(())
}
