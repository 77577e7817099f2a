//! Configuration loading with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;

/// Slate configuration, merged from global config, local config and env
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the tracking database
    pub database: Option<PathBuf>,

    /// Id of the Person the desktop session runs as
    pub current_user: Option<i64>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/slate/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&global_path) {
                    if let Ok(global) = serde_yml::from_str::<Config>(&contents) {
                        config.merge(global);
                    }
                }
            }
        }

        // 3. Local config (./slate.yaml)
        let local_path = PathBuf::from("slate.yaml");
        if local_path.exists() {
            if let Ok(contents) = std::fs::read_to_string(&local_path) {
                if let Ok(local) = serde_yml::from_str::<Config>(&contents) {
                    config.merge(local);
                }
            }
        }

        // 4. Environment variables
        if let Ok(db) = std::env::var("SLATE_DB") {
            config.database = Some(PathBuf::from(db));
        }
        if let Ok(user) = std::env::var("SLATE_USER") {
            if let Ok(id) = user.parse() {
                config.current_user = Some(id);
            }
        }

        config
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "slate")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.current_user.is_some() {
            self.current_user = other.current_user;
        }
    }

    /// Resolve the database path, falling back to the per-user data dir
    pub fn database_path(&self) -> PathBuf {
        if let Some(ref path) = self.database {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "slate")
            .map(|dirs| dirs.data_dir().join("tracking.db"))
            .unwrap_or_else(|| PathBuf::from("tracking.db"))
    }
}
