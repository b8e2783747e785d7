use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;
use crate::tag::TagId;

pub const VOLUME_RANGE: (u32, u32) = (0, 100);
pub const PITCH_RANGE: (u32, u32) = (50, 200);

/// Built-in handler kinds a tag can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Music,
    Rainbow,
    ButtonLight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Decoder executable, started with `--remote`
    pub decoder_binary: String,

    /// The decoder's first answer takes much longer than later ones
    pub startup_timeout_ms: u64,

    /// Upper bound for every later command/response round trip
    pub ipc_timeout_ms: u64,

    pub default_volume: u32,
    pub default_pitch: u32,

    /// Volume used for the startup and shutdown sounds
    pub system_volume: u32,

    pub startup_sound: PathBuf,
    pub shutdown_sound: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            decoder_binary: "mpg123".to_string(),
            startup_timeout_ms: 10_000,
            ipc_timeout_ms: 1_000,
            default_volume: 2,
            default_pitch: 100,
            system_volume: 2,
            startup_sound: PathBuf::from("audio/system/startup.mp3"),
            shutdown_sound: PathBuf::from("audio/system/shutdown.mp3"),
        }
    }
}

impl AudioConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn ipc_timeout(&self) -> Duration {
        Duration::from_millis(self.ipc_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub pixel_count: usize,

    /// spidev node driving the strip; `None` runs headless
    pub spi_device: Option<PathBuf>,

    /// Global brightness (0-255)
    pub brightness: u8,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            pixel_count: 28,
            spi_device: Some(PathBuf::from("/dev/spidev0.0")),
            brightness: 255,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Placing this tag shuts the box down with the debug exit code
    pub interrupt_tag: Option<TagId>,

    /// Tags that switch to a dedicated handler; every other tag goes to
    /// the default (music) handler
    pub bindings: BTreeMap<TagId, HandlerKind>,

    /// Root of the per-tag album directories
    pub music_root: PathBuf,
}

impl Default for TagConfig {
    fn default() -> Self {
        let mut bindings = BTreeMap::new();
        if let Ok(tag) = TagId::new("5A00834F9204") {
            bindings.insert(tag, HandlerKind::ButtonLight);
        }
        if let Ok(tag) = TagId::new("5500ACB96121") {
            bindings.insert(tag, HandlerKind::Rainbow);
        }

        Self {
            interrupt_tag: TagId::new("5600C7AC4B76").ok(),
            bindings,
            music_root: PathBuf::from("audio/songs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RfidConfig {
    pub enabled: bool,
    pub device: PathBuf,
}

impl Default for RfidConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: PathBuf::from("/dev/ttyS0"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TiltConfig {
    pub enabled: bool,
    pub i2c_device: PathBuf,

    /// Time between two reported averages
    pub period_ms: u64,

    /// Minimum change in degrees on either axis before an event is emitted
    pub threshold_degrees: f64,
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            i2c_device: PathBuf::from("/dev/i2c-1"),
            period_ms: 1_000,
            threshold_degrees: 5.0,
        }
    }
}

/// Idle timeouts returned by the built-in handlers, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerTimeouts {
    pub music_playing_secs: u64,
    pub music_idle_secs: u64,
    pub rainbow_secs: u64,
    pub button_light_secs: u64,
}

impl Default for HandlerTimeouts {
    fn default() -> Self {
        Self {
            music_playing_secs: 20 * 60,
            music_idle_secs: 5 * 60,
            rainbow_secs: 60,
            button_light_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub leds: LedConfig,
    pub tags: TagConfig,
    pub rfid: RfidConfig,
    pub tilt: TiltConfig,
    pub handlers: HandlerTimeouts,

    /// Directory for the rolling log files; platform default when unset
    pub log_dir: Option<PathBuf>,
}

/// Where a loaded configuration came from.
///
/// Loading happens before logging is set up, so the caller logs this once
/// the subscriber is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Loaded(PathBuf),
    Created(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Loaded(path) => write!(f, "Loaded config from: {}", path.display()),
            ConfigSource::Created(path) => {
                write!(f, "Created default config at: {}", path.display())
            }
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the platform config directory.
    /// Creates a default config if the file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<(Self, ConfigSource), CoreError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .map_err(|e| CoreError::io("reading configuration", e))?;
            let config: Config = serde_json::from_str(&content).map_err(|e| {
                CoreError::Config(format!("{}: {}", config_path.display(), e))
            })?;
            config.validate()?;
            Ok((config, ConfigSource::Loaded(config_path)))
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok((config, ConfigSource::Created(config_path)))
        }
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CoreError::io("creating config directory", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Config(e.to_string()))?;
        fs::write(path, json).map_err(|e| CoreError::io("writing configuration", e))?;

        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf, CoreError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CoreError::Config("could not determine config directory".into()))?;
        Ok(config_dir.join("tagbox").join("config.json"))
    }

    /// Get the log directory, falling back to the platform data directory
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join("tagbox").join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        check_range("volume", self.audio.default_volume, VOLUME_RANGE)?;
        check_range("system volume", self.audio.system_volume, VOLUME_RANGE)?;
        check_range("pitch", self.audio.default_pitch, PITCH_RANGE)?;

        if self.leds.pixel_count == 0 {
            return Err(CoreError::Config("pixel_count must be > 0".into()));
        }
        if self.audio.ipc_timeout_ms == 0 {
            return Err(CoreError::Config("ipc_timeout_ms must be > 0".into()));
        }
        if let Some(interrupt) = &self.tags.interrupt_tag {
            if self.tags.bindings.contains_key(interrupt) {
                return Err(CoreError::Config(format!(
                    "interrupt tag {} must not be bound to a handler",
                    interrupt
                )));
            }
        }

        Ok(())
    }
}

/// Reject `value` unless it lies within the inclusive `range`
pub fn check_range(what: &'static str, value: u32, range: (u32, u32)) -> Result<(), CoreError> {
    if value < range.0 || value > range.1 {
        return Err(CoreError::OutOfRange {
            what,
            value: value as i64,
            min: range.0 as i64,
            max: range.1 as i64,
        });
    }
    Ok(())
}
