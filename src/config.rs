use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all persisted state (database, audio, temp files)
    pub data_dir: String,
    /// SQLite database file name, relative to `data_dir`
    pub database_file: String,
    /// Temp artifacts older than this with no live session are reclaimed
    /// by the startup sweep
    pub temp_max_age_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    /// Key of the speech model to load (resolved by the model provider)
    pub model: String,
    /// Advisory bound for caller-driven retries; retries are never automatic
    pub max_retries: u32,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from `path` if the file exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(_) => Self::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "murmur".to_string(),
            },
            storage: StorageConfig {
                data_dir: "data".to_string(),
                database_file: "notes.db".to_string(),
                temp_max_age_secs: 3600, // 1 hour
            },
            audio: AudioConfig {
                sample_rate: 16000,
                channels: 1,
            },
            transcription: TranscriptionConfig {
                model: "whisper_small".to_string(),
                max_retries: 3,
            },
        }
    }
}
