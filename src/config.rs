//! Configuration management for Parley
//!
//! Layered: defaults, then `~/.config/parley/config.toml` (all fields
//! optional), then environment (`PARLEY_ENDPOINT`). CLI flags override
//! on top via clap's `env`/default machinery in `main.rs`.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::{Error, Result};

/// Resolved Parley configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Speech backend endpoint URL. Absent until configured; any
    /// submission without it fails with a configuration error.
    pub endpoint: Option<String>,

    /// Path to data directory (message database)
    pub data_dir: PathBuf,

    /// Backend request behavior
    pub backend: BackendConfig,

    /// Voice capture and segmentation settings
    pub voice: VoiceConfig,
}

/// Backend request behavior
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Request timeout in seconds. A hung backend would otherwise hold
    /// the in-flight turn open indefinitely.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

/// Voice capture and segmentation settings
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// RMS energy above which a chunk counts as speech
    pub energy_threshold: f32,

    /// Minimum speech duration for a valid utterance (milliseconds)
    pub min_speech_ms: u32,

    /// Trailing silence that ends an utterance (milliseconds)
    pub silence_ms: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::audio::SAMPLE_RATE,
            energy_threshold: 0.03,
            min_speech_ms: 300,
            silence_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed,
    /// or if no data directory can be determined.
    pub fn load() -> Result<Self> {
        let file = ConfigFile::load()?;

        let dirs = ProjectDirs::from("", "", "parley")
            .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))?;

        let endpoint = std::env::var("PARLEY_ENDPOINT")
            .ok()
            .filter(|v| !v.is_empty())
            .or(file.endpoint);

        let data_dir = file
            .storage
            .data_dir
            .map_or_else(|| dirs.data_dir().to_path_buf(), PathBuf::from);

        let defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            sample_rate: file.voice.sample_rate.unwrap_or(defaults.sample_rate),
            energy_threshold: file
                .voice
                .energy_threshold
                .unwrap_or(defaults.energy_threshold),
            min_speech_ms: file.voice.min_speech_ms.unwrap_or(defaults.min_speech_ms),
            silence_ms: file.voice.silence_ms.unwrap_or(defaults.silence_ms),
        };

        let backend = BackendConfig {
            timeout_secs: file
                .backend
                .timeout_secs
                .unwrap_or_else(|| BackendConfig::default().timeout_secs),
        };

        Ok(Self {
            endpoint,
            data_dir,
            backend,
            voice,
        })
    }

    /// Path to the message database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("messages.db")
    }
}

/// Top-level TOML configuration file schema
///
/// All fields are optional — the file is a partial overlay on top of
/// defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    endpoint: Option<String>,

    #[serde(default)]
    backend: BackendFileConfig,

    #[serde(default)]
    voice: VoiceFileConfig,

    #[serde(default)]
    storage: StorageFileConfig,
}

#[derive(Debug, Default, Deserialize)]
struct BackendFileConfig {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    sample_rate: Option<u32>,
    energy_threshold: Option<f32>,
    min_speech_ms: Option<u32>,
    silence_ms: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageFileConfig {
    data_dir: Option<String>,
}

impl ConfigFile {
    fn load() -> Result<Self> {
        let Some(dirs) = ProjectDirs::from("", "", "parley") else {
            return Ok(Self::default());
        };
        let path = dirs.config_dir().join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let parsed = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(parsed)
    }
}
