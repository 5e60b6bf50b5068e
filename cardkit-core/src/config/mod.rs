//! Configuration management for cardkit.
//!
//! Settings come from a TOML file, then environment overrides are applied on
//! top. The override names match the knobs operators already know from the
//! render server deployment:
//!
//! - `MAX_REQUEST_SIZE`, `CHUNK_SIZE`
//! - `MIN_IDLE_TIMEOUT`, `MAX_IDLE_TIMEOUT`, `HIGH_LOAD_THRESHOLD`
//! - `MAX_GIF_SIZE`, `MAX_FRAMES`, `MAX_DIMENSION`, `QUALITY`
//! - `MAX_RETRIES`, `INITIAL_DELAY`
//!
//! Workers spawned by the dispatcher receive the caller's resolved settings
//! as JSON in `CARDKIT_WORKER_SETTINGS`, so both sides of the pipe agree on
//! chunk sizes and idle timeouts.

mod settings;

use std::env;
use std::str::FromStr;

pub use settings::{
    AssetSettings, BannerSettings, DispatcherSettings, LoggingSettings, SceneSettings, Settings,
    SettingsError, WorkerSettings,
};

/// Environment variable carrying serialized settings into a worker process.
pub const WORKER_SETTINGS_ENV: &str = "CARDKIT_WORKER_SETTINGS";

/// Load .env file if it exists
pub fn load_dotenv() {
    // Silently ignore errors (file might not exist)
    let _ = dotenvy::dotenv();
}

/// Errors that can occur when resolving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },

    #[error("Invalid worker settings payload: {0}")]
    WorkerPayload(#[from] serde_json::Error),
}

impl Settings {
    /// Load from the config file and apply environment overrides.
    pub fn load_with_env() -> Result<Self, ConfigError> {
        load_dotenv();
        let mut settings = Self::load()?;
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Resolve settings inside a worker process.
    ///
    /// Prefers the payload handed down by the dispatcher and falls back to
    /// the regular file + env resolution when the worker runs standalone.
    pub fn for_worker() -> Result<Self, ConfigError> {
        match env::var(WORKER_SETTINGS_ENV) {
            Ok(payload) => Ok(serde_json::from_str(&payload)?),
            Err(_) => Self::load_with_env(),
        }
    }

    /// Serialize for [`WORKER_SETTINGS_ENV`].
    pub fn to_worker_payload(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Apply the upper-case knob overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_var(&lookup, "MAX_REQUEST_SIZE", &mut self.worker.max_request_size)?;
        override_var(&lookup, "CHUNK_SIZE", &mut self.worker.chunk_size)?;
        override_var(&lookup, "MIN_IDLE_TIMEOUT", &mut self.worker.min_idle_timeout_ms)?;
        override_var(&lookup, "MAX_IDLE_TIMEOUT", &mut self.worker.max_idle_timeout_ms)?;
        override_var(&lookup, "HIGH_LOAD_THRESHOLD", &mut self.worker.high_load_threshold)?;
        override_var(&lookup, "MAX_GIF_SIZE", &mut self.banner.max_gif_size)?;
        override_var(&lookup, "MAX_FRAMES", &mut self.banner.max_frames)?;
        override_var(&lookup, "MAX_DIMENSION", &mut self.banner.max_dimension)?;
        override_var(&lookup, "QUALITY", &mut self.banner.quality)?;
        override_var(&lookup, "MAX_RETRIES", &mut self.dispatcher.max_retries)?;
        override_var(&lookup, "INITIAL_DELAY", &mut self.dispatcher.initial_delay_ms)?;
        Ok(())
    }
}

fn override_var<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup_from(&[
                ("CHUNK_SIZE", "4096"),
                ("MAX_RETRIES", "2"),
                ("INITIAL_DELAY", "10"),
                ("MAX_FRAMES", " 12 "),
            ]))
            .unwrap();

        assert_eq!(settings.worker.chunk_size, 4096);
        assert_eq!(settings.dispatcher.max_retries, 2);
        assert_eq!(settings.dispatcher.initial_delay_ms, 10);
        assert_eq!(settings.banner.max_frames, 12);
        assert_eq!(settings.worker.max_request_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(lookup_from(&[("QUALITY", "very high")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { var: "QUALITY", .. }));
    }

    #[test]
    fn test_worker_payload_roundtrip() {
        let mut settings = Settings::default();
        settings.worker.chunk_size = 77;
        let payload = settings.to_worker_payload().unwrap();
        let decoded: Settings = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, settings);
    }
}
