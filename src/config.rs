use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::{LLMConfig, LLMProvider};
use crate::memory::MemoryConfig;
use crate::story::{beats, BEAT_SHEET};
use crate::tts::TtsConfig;

/// Configuration for the Stardock Podium generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage locations for episodes, voices, and reference books
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local audio asset library settings
    #[serde(default)]
    pub assets: AssetConfig,

    /// Output audio rendering settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Worker pool and resource settings
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Speech synthesis provider settings
    #[serde(default)]
    pub tts: TtsConfig,

    /// Story generation LLM settings
    #[serde(default)]
    pub llm: LLMConfig,

    /// Semantic memory service settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Defaults applied to new episodes
    #[serde(default)]
    pub episode: EpisodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all generated data
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn episodes_dir(&self) -> PathBuf {
        self.data_dir.join("episodes")
    }

    pub fn voices_dir(&self) -> PathBuf {
        self.data_dir.join("voices")
    }

    pub fn books_dir(&self) -> PathBuf {
        self.data_dir.join("reference_books")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Directory holding sound_effects/, music/, and ambience/ libraries
    pub assets_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("./assets"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate for rendered audio
    pub sample_rate: u32,

    /// Channel count for rendered audio
    pub channels: u16,

    /// Output bit rate passed to the encoder
    pub bitrate: String,
}

impl AudioConfig {
    /// Renderer configured with these output settings.
    pub fn renderer(&self) -> crate::audio::AudioRenderer {
        crate::audio::AudioRenderer::new(self.sample_rate, self.channels, &self.bitrate)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bitrate: "128k".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum number of concurrent scene rendering workers
    pub max_workers: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().min(4),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeConfig {
    /// Series name used when the CLI does not give one
    pub default_series: String,

    /// Target episode length in minutes
    pub default_duration_minutes: u32,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            default_series: "Main Series".to_string(),
            default_duration_minutes: 30,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        // Try to load from various locations
        let config_paths = [
            "stardock-podium.toml",
            "config/stardock-podium.toml",
            "~/.config/stardock-podium/config.toml",
            "/etc/stardock-podium/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config.apply_env();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Ok(Self::from_env())
    }

    /// Build configuration from defaults and environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) {
        if self.llm.api_key.is_none() {
            let var = match self.llm.provider {
                LLMProvider::OpenAI => "OPENAI_API_KEY",
                LLMProvider::OpenRouter => "OPENROUTER_API_KEY",
            };
            if let Ok(api_key) = std::env::var(var) {
                self.llm.api_key = Some(api_key);
            }
        }

        if self.tts.api_key.is_none() {
            if let Ok(api_key) = std::env::var("ELEVENLABS_API_KEY") {
                self.tts.api_key = Some(api_key);
            }
        }

        if self.memory.api_key.is_none() {
            if let Ok(api_key) = std::env::var("MEM0_API_KEY") {
                self.memory.api_key = Some(api_key);
            }
        }

        if let Ok(workers) = std::env::var("PODIUM_WORKERS") {
            self.performance.max_workers = workers.parse().unwrap_or(4);
        }

        if let Ok(sample_rate) = std::env::var("PODIUM_SAMPLE_RATE") {
            self.audio.sample_rate = sample_rate.parse().unwrap_or(44100);
        }

        if let Ok(data_dir) = std::env::var("PODIUM_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(assets_dir) = std::env::var("PODIUM_ASSETS_DIR") {
            self.assets.assets_dir = PathBuf::from(assets_dir);
        }

        if let Ok(series) = std::env::var("PODIUM_DEFAULT_SERIES") {
            self.episode.default_series = series;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate performance settings
        if self.performance.max_workers == 0 {
            return Err(anyhow!("max_workers must be greater than 0"));
        }

        // Validate audio settings
        if self.audio.sample_rate == 0 {
            return Err(anyhow!("sample_rate must be greater than 0"));
        }
        if self.audio.channels == 0 {
            return Err(anyhow!("channels must be greater than 0"));
        }

        // Validate episode defaults
        if self.episode.default_duration_minutes == 0 {
            return Err(anyhow!("default_duration_minutes must be greater than 0"));
        }

        // Validate the built-in beat sheet before it drives any planning
        if let Err(e) = beats::validate_template(BEAT_SHEET) {
            return Err(anyhow!("Invalid beat sheet: {}", e));
        }

        // Validate data directory
        if !self.storage.data_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(&self.storage.data_dir) {
                return Err(anyhow!("Cannot create data directory: {}", e));
            }
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Stardock Podium Configuration:\n\
            - Workers: {}\n\
            - Audio: {}Hz, {} channels @ {}\n\
            - LLM Provider: {:?} ({})\n\
            - TTS Model: {}\n\
            - Data Directory: {}\n\
            - Assets Directory: {}\n\
            - Default Series: {}",
            self.performance.max_workers,
            self.audio.sample_rate,
            self.audio.channels,
            self.audio.bitrate,
            self.llm.provider,
            self.llm.model,
            self.tts.model,
            self.storage.data_dir.display(),
            self.assets.assets_dir.display(),
            self.episode.default_series
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.performance.max_workers = workers;
        self
    }

    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.data_dir = dir;
        self
    }

    pub fn with_assets_dir(mut self, dir: PathBuf) -> Self {
        self.config.assets.assets_dir = dir;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.audio.sample_rate = sample_rate;
        self
    }

    pub fn with_llm_provider(mut self, provider: LLMProvider) -> Self {
        self.config.llm.provider = provider;
        self
    }

    pub fn with_default_series(mut self, series: impl Into<String>) -> Self {
        self.config.episode.default_series = series.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
