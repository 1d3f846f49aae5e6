use std::env;
use std::path::Path;
use std::time::Duration;

use ankisync_common::error::{AppError, AppResult};
use ankisync_common::types::TransformConfig;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::secrets::resolve_secret;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub anki: AnkiSettings,
    pub notion: NotionSettings,
    pub processors: Vec<TransformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnkiSettings {
    pub connect_url: String,
    pub deck_name: String,
    pub model_name: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for AnkiSettings {
    fn default() -> Self {
        Self {
            connect_url: "http://localhost:8765".to_string(),
            deck_name: String::new(),
            model_name: String::new(),
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotionSettings {
    pub token: String,
    pub database_id: String,
    pub poll_interval_seconds: u64,
    /// Start the first cycle this many hours back instead of fetching everything.
    pub initial_lookback_hours: Option<u64>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            database_id: String::new(),
            poll_interval_seconds: 60,
            initial_lookback_hours: None,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration for the syncer process.
    ///
    /// Order: `.env` (best effort), the YAML file at `CONFIG_PATH` (default
    /// `config.yaml`, optional unless `CONFIG_PATH` is set), then environment
    /// overrides. The Notion token is resolved through the secret manager and the
    /// result is validated before it is returned.
    pub fn load() -> AppResult<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match env::var("CONFIG_PATH") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => {
                tracing::info!("no config file found, using environment only");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.notion.token = resolve_secret(&config.notion.token)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        serde_yaml::from_str(raw).map_err(|e| AppError::Config(format!("invalid config: {e}")))
    }

    fn apply_env_overrides(&mut self) -> AppResult<()> {
        override_string(&mut self.anki.connect_url, "ANKI_CONNECT_URL");
        override_string(&mut self.anki.deck_name, "ANKI_DECK_NAME");
        override_string(&mut self.anki.model_name, "ANKI_MODEL_NAME");
        override_string(&mut self.notion.token, "NOTION_TOKEN");
        override_string(&mut self.notion.database_id, "NOTION_DATABASE_ID");

        if let Ok(raw) = env::var("POLL_INTERVAL_SECS") {
            self.notion.poll_interval_seconds = raw
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("invalid POLL_INTERVAL_SECS: {e}")))?;
        }
        Ok(())
    }

    /// Fail fast on settings no sync cycle could work without.
    pub fn validate(&self) -> AppResult<()> {
        require("anki.deck_name", &self.anki.deck_name)?;
        require("anki.model_name", &self.anki.model_name)?;
        require("anki.connect_url", &self.anki.connect_url)?;
        require("notion.token", &self.notion.token)?;
        require("notion.database_id", &self.notion.database_id)?;

        if self.notion.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "notion.poll_interval_seconds must be > 0".to_string(),
            ));
        }

        if let Some(hours) = self.notion.initial_lookback_hours {
            if lookback_start(Utc::now(), hours).is_none() {
                return Err(AppError::Config(format!(
                    "notion.initial_lookback_hours is out of range: {hours}"
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.notion.poll_interval_seconds)
    }

    /// Cursor for the first cycle: the epoch, or `now - initial_lookback_hours`.
    /// A lookback too large to represent falls back to the epoch.
    pub fn initial_cursor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.notion
            .initial_lookback_hours
            .and_then(|hours| lookback_start(now, hours))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

fn lookback_start(now: DateTime<Utc>, hours: u64) -> Option<DateTime<Utc>> {
    let hours = i64::try_from(hours).ok()?;
    now.checked_sub_signed(TimeDelta::try_hours(hours)?)
}

fn override_string(slot: &mut String, key: &str) {
    if let Ok(value) = env::var(key) {
        if !value.trim().is_empty() {
            *slot = value.trim().to_string();
        }
    }
}

fn require(name: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Config(format!("{name} is required but not set")));
    }
    Ok(())
}
