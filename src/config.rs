use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pacing::{clamp_wpm, RedLetterPosition, DEFAULT_WPM};

/// Reader preferences. Treated as an immutable snapshot by a reading surface until
/// explicitly reloaded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Preferences {
    pub default_wpm: u32,
    pub red_letter_position: RedLetterPosition,
    pub pause_on_punctuation: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_wpm: DEFAULT_WPM,
            red_letter_position: RedLetterPosition::First,
            pause_on_punctuation: true,
        }
    }
}

impl Preferences {
    /// Starting rate for a surface, clamped into the supported range
    pub fn starting_wpm(&self) -> u32 {
        clamp_wpm(self.default_wpm as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub preferences: Preferences,
    /// Overrides the default library database location
    pub database_path: Option<PathBuf>,
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "blink") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("blink_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), %err, "ignoring unreadable config");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
