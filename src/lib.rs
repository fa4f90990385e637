// Library surface for the blink binary, headless/integration tests and reuse.
// The reading core (sequencer, pacing, timer, session, player) has no terminal or
// storage dependencies; reader/persistence/library wire it to the local store.
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod extract;
pub mod goals;
pub mod library;
pub mod logging;
pub mod pacing;
pub mod persistence;
pub mod player;
pub mod reader;
pub mod runtime;
pub mod sequencer;
pub mod session;
pub mod timer;
pub mod ui;
pub mod util;
