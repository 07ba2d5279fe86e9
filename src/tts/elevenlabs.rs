//! ElevenLabs speech synthesis provider.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{RemoteVoice, SpeechSynthesizer, TtsConfig, VoiceSettings};

const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io";

/// Speech synthesis through the ElevenLabs HTTP API.
pub struct ElevenLabsSynthesizer {
    config: TtsConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SpeechRequest {
    text: String,
    model_id: String,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    voices: Vec<RemoteVoice>,
}

#[derive(Debug, Serialize)]
struct PreviewRequest {
    voice_description: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct PreviewResponse {
    previews: Vec<VoicePreview>,
}

#[derive(Debug, Deserialize)]
struct VoicePreview {
    generated_voice_id: String,
}

#[derive(Debug, Serialize)]
struct CreateVoiceRequest {
    voice_name: String,
    voice_description: String,
    generated_voice_id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedVoiceResponse {
    voice_id: String,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("ElevenLabs API key not configured"))
    }

    fn base_url(&self) -> &str {
        self.config.endpoint.as_deref().unwrap_or(ELEVENLABS_API_URL)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>> {
        let api_key = self.api_key()?;

        let request = SpeechRequest {
            text: text.to_string(),
            model_id: self.config.model.clone(),
            voice_settings: *settings,
        };

        let url = format!("{}/v1/text-to-speech/{}", self.base_url(), voice_id);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs API error {}: {}", status, text));
        }

        let audio = response.bytes().await?;
        debug!("🎵 Synthesized {} bytes with voice {}", audio.len(), voice_id);
        Ok(audio.to_vec())
    }

    async fn list_voices(&self) -> Result<Vec<RemoteVoice>> {
        let api_key = self.api_key()?;

        let url = format!("{}/v1/voices", self.base_url());
        let response = self
            .client
            .get(&url)
            .header("xi-api-key", api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs API error {}: {}", status, text));
        }

        let voices: VoicesResponse = response.json().await?;
        Ok(voices.voices)
    }

    async fn design_voice(&self, name: &str, description: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let preview_request = PreviewRequest {
            voice_description: description.to_string(),
            text: format!(
                "Welcome to Stardock Podium, the Star Trek podcast generator. \
                 My name is {}. I'll be your guide through this adventure.",
                name
            ),
        };

        let url = format!("{}/v1/text-to-voice/create-previews", self.base_url());
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&preview_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs API error {}: {}", status, text));
        }

        let preview: PreviewResponse = response.json().await?;
        let generated = preview
            .previews
            .first()
            .ok_or_else(|| anyhow!("No voice previews generated"))?;

        let create_request = CreateVoiceRequest {
            voice_name: name.to_string(),
            voice_description: description.to_string(),
            generated_voice_id: generated.generated_voice_id.clone(),
        };

        let url = format!(
            "{}/v1/text-to-voice/create-voice-from-preview",
            self.base_url()
        );
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&create_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs API error {}: {}", status, text));
        }

        let created: CreatedVoiceResponse = response.json().await?;
        info!("✅ Designed new voice '{}' ({})", name, created.voice_id);
        Ok(created.voice_id)
    }

    async fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_synthesizer_is_unavailable() {
        let synthesizer = ElevenLabsSynthesizer::new(TtsConfig::default()).unwrap();
        assert!(!synthesizer.is_available().await);

        let result = synthesizer
            .synthesize("Hello", "voice123", &VoiceSettings::default())
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not configured"));
    }
}
