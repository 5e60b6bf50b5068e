//! Settings loaded from the TOML configuration file.
//!
//! Everything here is non-sensitive and lives in the XDG config directory
//! (`~/.config/cardkit/config.toml`). Defaults mirror the production knobs
//! of the render pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# cardkit configuration file
# Located at: ~/.config/cardkit/config.toml
#
# Every knob below can also be overridden by an environment variable of the
# same upper-case name (MAX_REQUEST_SIZE, CHUNK_SIZE, MAX_RETRIES, ...).

[worker]
max_request_size = 10485760
chunk_size = 524288
min_idle_timeout_ms = 8000
max_idle_timeout_ms = 25000
high_load_threshold = 5

[dispatcher]
# worker_path = "/usr/local/bin/cardkit-worker"
pool_size = 1
queue_depth = 8
max_retries = 4
initial_delay_ms = 1500
startup_timeout_ms = 10000
request_timeout_ms = 30000
banner_check_timeout_ms = 3000

[banner]
max_gif_size = 10485760
max_frames = 50
max_dimension = 1200
quality = 80
fetch_timeout_ms = 5000
animated_overlay_alpha = 0.92

[assets]
# cache_dir = "/var/cache/cardkit"
emoji_cache_capacity = 100
emoji_url_template = "https://cdn.jsdelivr.net/gh/jdecked/twemoji@15.1.0/assets/72x72/{code}.png"
font_dirs = []
default_font_family = "Noto Sans"
require_fonts = true
load_system_fonts = true
fetch_timeout_ms = 4000

[scene]
# command = ["node", "scene-host.js"]
idle_timeout_ms = 60000
render_timeout_ms = 20000

[logging]
level = "info"
"#;

/// Settings loaded from the TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Worker process protocol and lifecycle
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Caller-side pool and retry policy
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Banner fetch and compositing limits
    #[serde(default)]
    pub banner: BannerSettings,

    /// Fonts, emoji and on-disk caches
    #[serde(default)]
    pub assets: AssetSettings,

    /// Interactive 3D render sessions
    #[serde(default)]
    pub scene: SceneSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Worker process settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkerSettings {
    /// Maximum buffered, not yet parsed input in bytes (MAX_REQUEST_SIZE)
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,

    /// Base64 payloads longer than this are sent as chunks (CHUNK_SIZE)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Idle timeout for a fresh worker (MIN_IDLE_TIMEOUT)
    #[serde(default = "default_min_idle_timeout_ms")]
    pub min_idle_timeout_ms: u64,

    /// Idle timeout once the worker is under high load (MAX_IDLE_TIMEOUT)
    #[serde(default = "default_max_idle_timeout_ms")]
    pub max_idle_timeout_ms: u64,

    /// Request count at which the idle timeout saturates (HIGH_LOAD_THRESHOLD)
    #[serde(default = "default_high_load_threshold")]
    pub high_load_threshold: u64,
}

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DispatcherSettings {
    /// Worker binary; resolved next to the current executable when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_path: Option<PathBuf>,

    /// Number of worker processes
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Requests allowed to wait per worker
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Retries after the first attempt (MAX_RETRIES)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay (INITIAL_DELAY)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Deadline for the worker's `ready` signal
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Deadline for a terminal response to one `generate`
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Deadline for the banner URL existence check
    #[serde(default = "default_banner_check_timeout_ms")]
    pub banner_check_timeout_ms: u64,
}

/// Banner settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BannerSettings {
    /// Maximum fetched banner size in bytes (MAX_GIF_SIZE)
    #[serde(default = "default_max_gif_size")]
    pub max_gif_size: usize,

    /// Maximum frames kept from an animated banner (MAX_FRAMES)
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,

    /// Maximum banner width or height in pixels (MAX_DIMENSION)
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// GIF encode quality, 0-100 (QUALITY)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Banner download timeout
    #[serde(default = "default_banner_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Opacity of the card drawn over animated frames
    #[serde(default = "default_animated_overlay_alpha")]
    pub animated_overlay_alpha: f32,
}

/// Asset settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetSettings {
    /// Root of the on-disk emoji and frame caches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// In-memory emoji LRU capacity
    #[serde(default = "default_emoji_cache_capacity")]
    pub emoji_cache_capacity: usize,

    /// Emoji image URL; `{code}` is replaced with the dash-joined codepoints
    #[serde(default = "default_emoji_url_template")]
    pub emoji_url_template: String,

    /// Extra font directories loaded at startup
    #[serde(default)]
    pub font_dirs: Vec<PathBuf>,

    /// Font family used when a component does not name one
    #[serde(default = "default_font_family")]
    pub default_font_family: String,

    /// Refuse to start a worker with an empty font database
    #[serde(default = "default_true")]
    pub require_fonts: bool,

    /// Scan the system font directories
    #[serde(default = "default_true")]
    pub load_system_fonts: bool,

    /// Remote asset (emoji, avatar) download timeout
    #[serde(default = "default_asset_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

/// Scene session settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SceneSettings {
    /// Headless browser host command and its arguments
    #[serde(default)]
    pub command: Vec<String>,

    /// Inactivity before a session is torn down
    #[serde(default = "default_scene_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Deadline for one scene frame
    #[serde(default = "default_scene_render_timeout_ms")]
    pub render_timeout_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_request_size() -> usize {
    10 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    512 * 1024
}

fn default_min_idle_timeout_ms() -> u64 {
    8_000
}

fn default_max_idle_timeout_ms() -> u64 {
    25_000
}

fn default_high_load_threshold() -> u64 {
    5
}

fn default_pool_size() -> usize {
    1
}

fn default_queue_depth() -> usize {
    8
}

fn default_max_retries() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    1_500
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_banner_check_timeout_ms() -> u64 {
    3_000
}

fn default_max_gif_size() -> usize {
    10 * 1024 * 1024
}

fn default_max_frames() -> usize {
    50
}

fn default_max_dimension() -> u32 {
    1_200
}

fn default_quality() -> u8 {
    80
}

fn default_banner_fetch_timeout_ms() -> u64 {
    5_000
}

fn default_animated_overlay_alpha() -> f32 {
    0.92
}

fn default_emoji_cache_capacity() -> usize {
    100
}

fn default_emoji_url_template() -> String {
    "https://cdn.jsdelivr.net/gh/jdecked/twemoji@15.1.0/assets/72x72/{code}.png".to_string()
}

fn default_font_family() -> String {
    "Noto Sans".to_string()
}

fn default_true() -> bool {
    true
}

fn default_asset_fetch_timeout_ms() -> u64 {
    4_000
}

fn default_scene_idle_timeout_ms() -> u64 {
    60_000
}

fn default_scene_render_timeout_ms() -> u64 {
    20_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_request_size: default_max_request_size(),
            chunk_size: default_chunk_size(),
            min_idle_timeout_ms: default_min_idle_timeout_ms(),
            max_idle_timeout_ms: default_max_idle_timeout_ms(),
            high_load_threshold: default_high_load_threshold(),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            worker_path: None,
            pool_size: default_pool_size(),
            queue_depth: default_queue_depth(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            banner_check_timeout_ms: default_banner_check_timeout_ms(),
        }
    }
}

impl Default for BannerSettings {
    fn default() -> Self {
        Self {
            max_gif_size: default_max_gif_size(),
            max_frames: default_max_frames(),
            max_dimension: default_max_dimension(),
            quality: default_quality(),
            fetch_timeout_ms: default_banner_fetch_timeout_ms(),
            animated_overlay_alpha: default_animated_overlay_alpha(),
        }
    }
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            emoji_cache_capacity: default_emoji_cache_capacity(),
            emoji_url_template: default_emoji_url_template(),
            font_dirs: Vec::new(),
            default_font_family: default_font_family(),
            require_fonts: true,
            load_system_fonts: true,
            fetch_timeout_ms: default_asset_fetch_timeout_ms(),
        }
    }
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            idle_timeout_ms: default_scene_idle_timeout_ms(),
            render_timeout_ms: default_scene_render_timeout_ms(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl WorkerSettings {
    pub fn min_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.min_idle_timeout_ms)
    }

    pub fn max_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.max_idle_timeout_ms)
    }
}

impl DispatcherSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl AssetSettings {
    /// Resolve the cache root, falling back to the XDG cache directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("cardkit")
        })
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// Uses XDG config directory: `~/.config/cardkit/config.toml`
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("CARDKIT_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("cardkit");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)?;
        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.worker.max_request_size, 10 * 1024 * 1024);
        assert_eq!(settings.worker.chunk_size, 512 * 1024);
        assert_eq!(settings.worker.min_idle_timeout_ms, 8_000);
        assert_eq!(settings.worker.max_idle_timeout_ms, 25_000);
        assert_eq!(settings.worker.high_load_threshold, 5);

        assert_eq!(settings.dispatcher.max_retries, 4);
        assert_eq!(settings.dispatcher.initial_delay_ms, 1_500);
        assert_eq!(settings.dispatcher.pool_size, 1);

        assert_eq!(settings.banner.max_gif_size, 10 * 1024 * 1024);
        assert_eq!(settings.banner.max_frames, 50);
        assert_eq!(settings.banner.max_dimension, 1_200);

        assert_eq!(settings.assets.emoji_cache_capacity, 100);
        assert!(settings.assets.require_fonts);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_default_toml_matches_defaults() {
        let parsed = Settings::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml_content = r#"
[worker]
chunk_size = 1024

[banner]
max_frames = 10
"#;
        let settings = Settings::from_toml(toml_content).unwrap();
        assert_eq!(settings.worker.chunk_size, 1024);
        assert_eq!(settings.worker.max_request_size, 10 * 1024 * 1024);
        assert_eq!(settings.banner.max_frames, 10);
        assert_eq!(settings.banner.quality, 80);
        assert_eq!(settings.dispatcher.max_retries, 4);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.dispatcher.pool_size = 3;
        settings.scene.command = vec!["node".to_string(), "host.js".to_string()];
        settings.assets.cache_dir = Some(dir.path().join("cache"));

        settings.save_to_path(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let loaded = Settings::from_toml(&content).unwrap();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_resolved_cache_dir_prefers_configured() {
        let mut assets = AssetSettings::default();
        assets.cache_dir = Some(PathBuf::from("/tmp/cardkit-test-cache"));
        assert_eq!(
            assets.resolved_cache_dir(),
            PathBuf::from("/tmp/cardkit-test-cache")
        );
    }
}
