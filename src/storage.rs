use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::snippet::SnippetSettings;

pub const DEFAULT_SCAN_ENDPOINT: &str = "https://api.soundtrace.uk/api/scan-track";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SoundtraceConfig {
    pub scan_endpoint: String,
    pub auth_token: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub snippet: SnippetSettings,
}

impl Default for SoundtraceConfig {
    fn default() -> Self {
        SoundtraceConfig {
            scan_endpoint: DEFAULT_SCAN_ENDPOINT.into(),
            auth_token: None,
            spotify_client_id: None,
            spotify_client_secret: None,
            snippet: SnippetSettings::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs = ProjectDirs::from("uk", "soundtrace", "soundtrace").ok_or(ConfigError::NoConfigDir)?;
    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Loads the config from the platform config directory, writing the
/// defaults there on first run.
pub fn load_config() -> Result<SoundtraceConfig, ConfigError> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(config_path: &Path) -> Result<SoundtraceConfig, ConfigError> {
    match File::open(config_path) {
        Ok(config_file) => {
            let config: SoundtraceConfig =
                serde_json::from_reader(config_file).map_err(|source| ConfigError::Json {
                    path: config_path.to_path_buf(),
                    source,
                })?;
            info!("loaded config from {}", config_path.display());
            Ok(config)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("creating and saving default config");
            let config = SoundtraceConfig::default();
            save_config_to(config_path, &config)?;
            Ok(config)
        }
        Err(source) => Err(ConfigError::Io {
            path: config_path.to_path_buf(),
            source,
        }),
    }
}

pub fn save_config_to(config_path: &Path, config: &SoundtraceConfig) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: config_path.to_path_buf(),
        source,
    };

    if let Some(config_dir) = config_path.parent() {
        create_dir_all(config_dir).map_err(io_err)?;
    }

    debug!("saving config to {}", config_path.display());
    let config_file = File::create(config_path).map_err(io_err)?;
    serde_json::to_writer_pretty(config_file, &config).map_err(|source| ConfigError::Json {
        path: config_path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_default_config_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = load_config_from(&path).unwrap();
        assert_eq!(config, SoundtraceConfig::default());
        assert!(path.exists());

        let again = load_config_from(&path).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"scan_endpoint": "http://localhost:3000/api/scan-track", "snippet": {"snippet_seconds": 10.0}}"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.scan_endpoint, "http://localhost:3000/api/scan-track");
        assert_eq!(config.auth_token, None);
        assert_eq!(config.snippet.snippet_seconds, 10.0);
        assert_eq!(config.snippet.sample_rate, 44100);
        assert_eq!(config.snippet.channels, 2);
    }

    #[test]
    fn reports_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Json { .. })));
    }
}
