//! Configuration file support for tileseq
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/tileseq/config.toml`
//! - macOS: `~/Library/Application Support/tileseq/config.toml`
//! - Windows: `%APPDATA%\tileseq\config.toml`

use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MIN_GRID_SIZE: usize = 4;
pub const MAX_GRID_SIZE: usize = 64;
pub const MIN_BPM: u32 = 20;
pub const MAX_BPM: u32 = 400;

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# tileseq configuration file

[sequencer]
# Rows (pitches) and columns (steps) of the grid, 4-64
grid_size = 16

# Largest grid the size control will accept
max_grid_size = 64

# Tempo in beats per minute, 20-400. Each step is a sixteenth note.
bpm = 120

[scheduling]
# How far ahead of the audio clock notes are committed, in seconds.
# Keep this at least 4x the poll interval.
schedule_ahead_secs = 0.1

# Scheduler wake-up interval in milliseconds
poll_interval_ms = 25

# Delay between pressing play and the first step, in seconds
start_offset_secs = 0.05

[assist]
# Command that turns a conversation into a reply. It receives
# {"messages": [{"role": ..., "content": ...}, ...]} on stdin and
# prints the reply text on stdout. Leave empty to disable.
command = []

# Conversation messages remembered between requests
history_limit = 32
"#;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sequencer: SequencerSettings,
    pub scheduling: SchedulingSettings,
    pub assist: AssistSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    /// Rows and columns of the tile grid
    pub grid_size: usize,
    /// Upper bound for `grid_size`; also how many pitches are generated
    pub max_grid_size: usize,
    pub bpm: u32,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            grid_size: 16,
            max_grid_size: MAX_GRID_SIZE,
            bpm: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingSettings {
    /// How far past the audio clock notes may be committed
    pub schedule_ahead_secs: f64,
    /// How often the scheduler wakes up
    pub poll_interval_ms: u64,
    /// Gap between pressing play and the first step
    pub start_offset_secs: f64,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            schedule_ahead_secs: 0.1,
            poll_interval_ms: 25,
            start_offset_secs: 0.05,
        }
    }
}

impl SchedulingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistSettings {
    /// External completion command; empty disables the assistant
    pub command: Vec<String>,
    /// Messages kept in the conversation history
    pub history_limit: usize,
}

impl Default for AssistSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            history_limit: 32,
        }
    }
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config.sanitized())
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to an explicit path, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "tileseq") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        Ok(path)
    }

    /// Clamp every field into its legal range.
    pub fn sanitized(mut self) -> Self {
        let seq = &mut self.sequencer;
        seq.max_grid_size = seq.max_grid_size.clamp(MIN_GRID_SIZE, MAX_GRID_SIZE);
        seq.grid_size = seq.grid_size.clamp(MIN_GRID_SIZE, seq.max_grid_size);
        seq.bpm = seq.bpm.clamp(MIN_BPM, MAX_BPM);

        let sched = &mut self.scheduling;
        sched.poll_interval_ms = sched.poll_interval_ms.max(1);
        if !(sched.schedule_ahead_secs > 0.0) {
            sched.schedule_ahead_secs = SchedulingSettings::default().schedule_ahead_secs;
        }
        if !(sched.start_offset_secs >= 0.0) {
            sched.start_offset_secs = 0.0;
        }
        let poll_secs = sched.poll_interval().as_secs_f64();
        if sched.schedule_ahead_secs < 4.0 * poll_secs {
            log::warn!(
                "schedule-ahead window {:.3}s is under 4x the {}ms poll interval; expect gaps",
                sched.schedule_ahead_secs,
                sched.poll_interval_ms
            );
        }

        self.assist.history_limit = self.assist.history_limit.max(2);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[sequencer]\nbpm = 90\n").unwrap();
        assert_eq!(config.sequencer.bpm, 90);
        assert_eq!(config.sequencer.grid_size, 16);
        assert_eq!(config.scheduling.poll_interval_ms, 25);
        assert!(config.assist.command.is_empty());
    }

    #[test]
    fn test_sanitized_clamps_ranges() {
        let mut config = Config::default();
        config.sequencer.grid_size = 200;
        config.sequencer.max_grid_size = 32;
        config.sequencer.bpm = 5;
        config.scheduling.poll_interval_ms = 0;
        config.scheduling.schedule_ahead_secs = -1.0;

        let config = config.sanitized();
        assert_eq!(config.sequencer.grid_size, 32);
        assert_eq!(config.sequencer.bpm, MIN_BPM);
        assert_eq!(config.scheduling.poll_interval_ms, 1);
        assert_eq!(config.scheduling.schedule_ahead_secs, 0.1);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("tileseq-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");

        let mut config = Config::default();
        config.sequencer.grid_size = 24;
        config.sequencer.bpm = 96;
        config.assist.command = vec!["llm".to_string(), "-q".to_string()];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_sanitizes() {
        let dir = std::env::temp_dir().join(format!("tileseq-sanitize-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, "[sequencer]\ngrid_size = 500\nbpm = 9000\n").unwrap();

        let loaded = Config::load_from(&path);
        let _ = fs::remove_dir_all(&dir);
        let loaded = loaded.unwrap();
        assert_eq!(loaded.sequencer.grid_size, MAX_GRID_SIZE);
        assert_eq!(loaded.sequencer.bpm, MAX_BPM);
    }

    #[test]
    fn test_template_matches_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
    }
}
