//! Text-to-speech synthesis and the persistent voice registry.

pub mod elevenlabs;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use elevenlabs::ElevenLabsSynthesizer;
pub use registry::{NewVoice, VoiceProfile, VoiceRegistry, VoiceUpdate};

/// TTS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Custom endpoint URL (None uses the provider default)
    pub endpoint: Option<String>,
    /// API key for the provider
    pub api_key: Option<String>,
    /// Synthesis model to use
    pub model: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "eleven_monolingual_v1".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// Rendering parameters stored per registered voice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
    #[serde(default = "default_style")]
    pub style: f32,
    #[serde(default = "default_speaker_boost")]
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.75
}

fn default_style() -> f32 {
    0.0
}

fn default_speaker_boost() -> bool {
    true
}

/// A voice as reported by the synthesis provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteVoice {
    pub voice_id: String,
    pub name: String,
}

/// Interface to a speech synthesis provider.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render text as audio with the given provider voice.
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>>;

    /// List voices available on the provider account.
    async fn list_voices(&self) -> Result<Vec<RemoteVoice>>;

    /// Design a new voice from a text description, returning its provider id.
    async fn design_voice(&self, name: &str, description: &str) -> Result<String>;

    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_settings_defaults() {
        let settings = VoiceSettings::default();
        assert_eq!(settings.stability, 0.5);
        assert_eq!(settings.similarity_boost, 0.75);
        assert_eq!(settings.style, 0.0);
        assert!(settings.use_speaker_boost);

        // Partial json falls back to per-field defaults
        let parsed: VoiceSettings = serde_json::from_str(r#"{"stability": 0.9}"#).unwrap();
        assert_eq!(parsed.stability, 0.9);
        assert_eq!(parsed.similarity_boost, 0.75);
        assert!(parsed.use_speaker_boost);
    }
}
