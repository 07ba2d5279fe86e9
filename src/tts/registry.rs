//! Persistent voice registry.
//!
//! Maps characters to synthesis provider voices and keeps that mapping
//! stable across episodes. Entries live in `registry.json` under the
//! voices directory and are mirrored into semantic memory so new
//! characters can be matched to existing voices by description.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::ids::short_id;
use crate::memory::client::VOICE_REGISTRY_USER;
use crate::memory::{MemoryClient, MemoryKind};
use crate::store::Character;
use crate::tts::{SpeechSynthesizer, VoiceSettings};

/// A registered voice and its synthesis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub voice_registry_id: String,
    pub name: String,
    pub voice_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub character_bio: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub settings: VoiceSettings,
}

/// Input for registering an existing provider voice.
#[derive(Debug, Clone)]
pub struct NewVoice {
    pub name: String,
    pub voice_id: String,
    pub description: String,
    pub character_bio: String,
    pub settings: Option<VoiceSettings>,
}

/// Fields of a voice entry that can be changed after registration.
#[derive(Debug, Clone, Default)]
pub struct VoiceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub character_bio: Option<String>,
    pub settings: Option<VoiceSettings>,
}

/// Registry of character voices, persisted to `registry.json`.
pub struct VoiceRegistry {
    voices_dir: PathBuf,
    entries: Arc<RwLock<HashMap<String, VoiceProfile>>>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    memory: MemoryClient,
}

impl VoiceRegistry {
    pub async fn new<P: AsRef<Path>>(
        voices_dir: P,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        memory: MemoryClient,
    ) -> Result<Self> {
        let voices_dir = voices_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&voices_dir)
            .await
            .with_context(|| {
                format!("Failed to create voices directory: {}", voices_dir.display())
            })?;

        let registry_file = voices_dir.join("registry.json");
        let entries: HashMap<String, VoiceProfile> = if registry_file.exists() {
            let content = tokio::fs::read_to_string(&registry_file)
                .await
                .with_context(|| {
                    format!("Failed to read voice registry: {}", registry_file.display())
                })?;
            match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("⚠️ Could not parse voice registry, starting empty: {}", e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        info!("📂 Voice registry loaded with {} voices", entries.len());
        Ok(Self {
            voices_dir,
            entries: Arc::new(RwLock::new(entries)),
            synthesizer,
            memory,
        })
    }

    fn registry_file(&self) -> PathBuf {
        self.voices_dir.join("registry.json")
    }

    async fn save_registry(&self) -> Result<()> {
        let entries = self.entries.read().await;
        let content = serde_json::to_string_pretty(&*entries)?;
        let path = self.registry_file();
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write voice registry: {}", path.display()))?;
        debug!("💾 Voice registry saved");
        Ok(())
    }

    /// Register a provider voice under a character name.
    ///
    /// When the provider is reachable the voice id is verified against the
    /// account's voice list first.
    pub async fn register_voice(&self, voice: NewVoice) -> Result<VoiceProfile> {
        if self.synthesizer.is_available().await {
            match self.synthesizer.list_voices().await {
                Ok(remote) => {
                    if !remote.iter().any(|v| v.voice_id == voice.voice_id) {
                        anyhow::bail!("Voice ID not found in ElevenLabs: {}", voice.voice_id);
                    }
                }
                Err(e) => warn!("⚠️ Couldn't verify voice ID with ElevenLabs: {}", e),
            }
        }

        let now = Utc::now();
        let profile = VoiceProfile {
            voice_registry_id: short_id("voice_"),
            name: voice.name,
            voice_id: voice.voice_id,
            description: voice.description,
            character_bio: voice.character_bio,
            created_at: now,
            updated_at: now,
            settings: voice.settings.unwrap_or_default(),
        };

        {
            let mut entries = self.entries.write().await;
            entries.insert(profile.voice_registry_id.clone(), profile.clone());
        }
        self.save_registry().await?;
        self.add_voice_to_memory(&profile).await;

        info!(
            "✅ Registered voice {} for '{}'",
            profile.voice_registry_id, profile.name
        );
        Ok(profile)
    }

    /// Fetch a voice by registry id or by character name.
    pub async fn get_voice(&self, identifier: &str) -> Option<VoiceProfile> {
        let entries = self.entries.read().await;
        if let Some(profile) = entries.get(identifier) {
            return Some(profile.clone());
        }
        entries
            .values()
            .find(|profile| profile.name.eq_ignore_ascii_case(identifier))
            .cloned()
    }

    /// Apply updates to an existing entry.
    pub async fn update_voice(
        &self,
        voice_registry_id: &str,
        updates: VoiceUpdate,
    ) -> Result<VoiceProfile> {
        let profile = {
            let mut entries = self.entries.write().await;
            let profile = entries.get_mut(voice_registry_id).ok_or_else(|| {
                anyhow!("Voice not found in registry: {}", voice_registry_id)
            })?;
            if let Some(name) = updates.name {
                profile.name = name;
            }
            if let Some(description) = updates.description {
                profile.description = description;
            }
            if let Some(bio) = updates.character_bio {
                profile.character_bio = bio;
            }
            if let Some(settings) = updates.settings {
                profile.settings = settings;
            }
            profile.updated_at = Utc::now();
            profile.clone()
        };

        self.save_registry().await?;
        self.add_voice_to_memory(&profile).await;
        Ok(profile)
    }

    /// Remove an entry, returning the deleted profile.
    pub async fn delete_voice(&self, voice_registry_id: &str) -> Result<VoiceProfile> {
        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(voice_registry_id).ok_or_else(|| {
                anyhow!("Voice not found in registry: {}", voice_registry_id)
            })?
        };

        self.save_registry().await?;
        info!("Deleted voice {} ('{}')", removed.voice_registry_id, removed.name);
        Ok(removed)
    }

    /// All registered voices, sorted by character name.
    pub async fn list_voices(&self) -> Vec<VoiceProfile> {
        let entries = self.entries.read().await;
        let mut voices: Vec<VoiceProfile> = entries.values().cloned().collect();
        voices.sort_by(|a, b| a.name.cmp(&b.name));
        voices
    }

    async fn add_voice_to_memory(&self, profile: &VoiceProfile) {
        let content = format!(
            "Voice Registry Entry - Character: {}\nVoice ID: {}\nDescription: {}\nCharacter Bio: {}",
            profile.name, profile.voice_id, profile.description, profile.character_bio
        );
        let metadata = json!({
            "voice_registry_id": profile.voice_registry_id,
            "name": profile.name,
            "voice_id": profile.voice_id,
        });
        if let Err(e) = self
            .memory
            .add(&content, VOICE_REGISTRY_USER, MemoryKind::VoiceMetadata, metadata)
            .await
        {
            warn!("⚠️ Could not add voice to memory: {}", e);
        }
    }

    /// Find registered voices matching a description via semantic search.
    pub async fn find_voices_by_description(
        &self,
        description: &str,
        limit: usize,
    ) -> Result<Vec<VoiceProfile>> {
        let results = self
            .memory
            .search(
                description,
                VOICE_REGISTRY_USER,
                Some(MemoryKind::VoiceMetadata),
                limit,
            )
            .await?;

        let entries = self.entries.read().await;
        let voices = results
            .iter()
            .filter_map(|record| record.metadata.get("voice_registry_id"))
            .filter_map(|id| id.as_str())
            .filter_map(|id| entries.get(id).cloned())
            .collect();
        Ok(voices)
    }

    /// Design a brand new provider voice from a description and register it.
    pub async fn create_voice_from_description(
        &self,
        name: &str,
        description: &str,
    ) -> Result<VoiceProfile> {
        let voice_id = self.synthesizer.design_voice(name, description).await?;
        self.register_voice(NewVoice {
            name: name.to_string(),
            voice_id,
            description: description.to_string(),
            character_bio: String::new(),
            settings: Some(VoiceSettings::default()),
        })
        .await
    }

    /// Render text with a registered voice, optionally writing the audio out.
    pub async fn generate_speech(
        &self,
        text: &str,
        voice_identifier: &str,
        output_path: Option<&Path>,
    ) -> Result<Vec<u8>> {
        let voice = self
            .get_voice(voice_identifier)
            .await
            .ok_or_else(|| anyhow!("Voice not found: {}", voice_identifier))?;

        let audio = self
            .synthesizer
            .synthesize(text, &voice.voice_id, &voice.settings)
            .await?;

        if let Some(path) = output_path {
            tokio::fs::write(path, &audio)
                .await
                .with_context(|| format!("Failed to write audio: {}", path.display()))?;
            debug!("💾 Audio saved to {}", path.display());
        }

        Ok(audio)
    }

    /// Resolve a voice for every named character.
    ///
    /// Preference order: an already registered voice with the character's
    /// name, then the closest description match (renamed to the character),
    /// then a freshly designed voice. Characters without a voice description
    /// that match nothing stay unmapped.
    pub async fn map_characters_to_voices(
        &self,
        characters: &[Character],
    ) -> HashMap<String, String> {
        let mut character_voices = HashMap::new();

        for character in characters {
            if character.name.is_empty() {
                continue;
            }

            if let Some(existing) = self.get_voice(&character.name).await {
                character_voices.insert(character.name.clone(), existing.voice_registry_id);
                continue;
            }

            let description = match character.voice_description.as_deref() {
                Some(description) if !description.is_empty() => description,
                _ => continue,
            };

            match self.find_voices_by_description(description, 1).await {
                Ok(matches) if !matches.is_empty() => {
                    let voice = &matches[0];
                    character_voices
                        .insert(character.name.clone(), voice.voice_registry_id.clone());

                    let rename = VoiceUpdate {
                        name: Some(character.name.clone()),
                        ..VoiceUpdate::default()
                    };
                    if let Err(e) = self.update_voice(&voice.voice_registry_id, rename).await {
                        warn!("⚠️ Could not rename voice for {}: {}", character.name, e);
                    }
                }
                _ => {
                    if self.synthesizer.is_available().await {
                        match self
                            .create_voice_from_description(&character.name, description)
                            .await
                        {
                            Ok(voice) => {
                                character_voices
                                    .insert(character.name.clone(), voice.voice_registry_id);
                            }
                            Err(e) => {
                                warn!(
                                    "⚠️ Could not create voice for {}: {}",
                                    character.name, e
                                );
                            }
                        }
                    }
                }
            }
        }

        character_voices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConfig;
    use crate::tts::RemoteVoice;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StubSynthesizer {
        voices: Vec<RemoteVoice>,
        available: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for StubSynthesizer {
        async fn synthesize(
            &self,
            _text: &str,
            _voice_id: &str,
            _settings: &VoiceSettings,
        ) -> Result<Vec<u8>> {
            Ok(vec![0x49, 0x44, 0x33])
        }

        async fn list_voices(&self) -> Result<Vec<RemoteVoice>> {
            Ok(self.voices.clone())
        }

        async fn design_voice(&self, _name: &str, _description: &str) -> Result<String> {
            Ok("designed001".to_string())
        }

        async fn is_available(&self) -> bool {
            self.available
        }
    }

    fn stub(available: bool) -> Arc<dyn SpeechSynthesizer> {
        Arc::new(StubSynthesizer {
            voices: vec![
                RemoteVoice {
                    voice_id: "el_voice_1".to_string(),
                    name: "Rachel".to_string(),
                },
                RemoteVoice {
                    voice_id: "designed001".to_string(),
                    name: "Designed".to_string(),
                },
            ],
            available,
        })
    }

    fn memory() -> MemoryClient {
        MemoryClient::new(MemoryConfig::default()).unwrap()
    }

    fn new_voice(name: &str, voice_id: &str) -> NewVoice {
        NewVoice {
            name: name.to_string(),
            voice_id: voice_id.to_string(),
            description: "calm and clear".to_string(),
            character_bio: String::new(),
            settings: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_reload() {
        let dir = TempDir::new().unwrap();
        let registry = VoiceRegistry::new(dir.path(), stub(true), memory())
            .await
            .unwrap();

        let profile = registry
            .register_voice(new_voice("Commander Sela Vash", "el_voice_1"))
            .await
            .unwrap();
        assert!(profile.voice_registry_id.starts_with("voice_"));
        assert_eq!(profile.settings.stability, 0.5);

        // A fresh registry picks the entry up from disk
        let reopened = VoiceRegistry::new(dir.path(), stub(true), memory())
            .await
            .unwrap();
        let found = reopened.get_voice("commander sela vash").await.unwrap();
        assert_eq!(found.voice_id, "el_voice_1");
        assert_eq!(found.voice_registry_id, profile.voice_registry_id);
    }

    #[tokio::test]
    async fn test_register_rejects_unknown_voice_id() {
        let dir = TempDir::new().unwrap();
        let registry = VoiceRegistry::new(dir.path(), stub(true), memory())
            .await
            .unwrap();

        let result = registry.register_voice(new_voice("Ghost", "missing_id")).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Voice ID not found"));
    }

    #[tokio::test]
    async fn test_register_skips_verification_when_offline() {
        let dir = TempDir::new().unwrap();
        let registry = VoiceRegistry::new(dir.path(), stub(false), memory())
            .await
            .unwrap();

        let profile = registry
            .register_voice(new_voice("Offline Voice", "whatever_id"))
            .await
            .unwrap();
        assert_eq!(profile.voice_id, "whatever_id");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = TempDir::new().unwrap();
        let registry = VoiceRegistry::new(dir.path(), stub(true), memory())
            .await
            .unwrap();

        let profile = registry
            .register_voice(new_voice("Old Name", "el_voice_1"))
            .await
            .unwrap();

        let updated = registry
            .update_voice(
                &profile.voice_registry_id,
                VoiceUpdate {
                    name: Some("New Name".to_string()),
                    ..VoiceUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.voice_id, "el_voice_1");
        assert!(updated.updated_at >= profile.updated_at);

        registry.delete_voice(&profile.voice_registry_id).await.unwrap();
        assert!(registry.get_voice("New Name").await.is_none());
        assert!(registry
            .delete_voice(&profile.voice_registry_id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_generate_speech_writes_output() {
        let dir = TempDir::new().unwrap();
        let registry = VoiceRegistry::new(dir.path(), stub(true), memory())
            .await
            .unwrap();

        registry
            .register_voice(new_voice("Commander Sela Vash", "el_voice_1"))
            .await
            .unwrap();

        let output = dir.path().join("line.mp3");
        let audio = registry
            .generate_speech("Hold position.", "Commander Sela Vash", Some(&output))
            .await
            .unwrap();
        assert_eq!(audio, vec![0x49, 0x44, 0x33]);
        assert!(output.exists());

        let missing = registry.generate_speech("Hi", "Nobody", None).await;
        assert!(missing.is_err());
    }

    fn character(name: &str, voice_description: Option<&str>) -> Character {
        Character {
            character_id: "char_test0001".to_string(),
            name: name.to_string(),
            species: None,
            role: Some("Officer".to_string()),
            personality: None,
            backstory: None,
            voice_description: voice_description.map(|d| d.to_string()),
        }
    }

    #[tokio::test]
    async fn test_map_characters_prefers_registered_names() {
        let dir = TempDir::new().unwrap();
        let registry = VoiceRegistry::new(dir.path(), stub(true), memory())
            .await
            .unwrap();

        let existing = registry
            .register_voice(new_voice("Commander Sela Vash", "el_voice_1"))
            .await
            .unwrap();

        let characters = vec![
            character("Commander Sela Vash", Some("low and precise")),
            character("Doctor Elan Ryn", Some("bright tenor, quick cadence")),
            character("Silent Extra", None),
        ];
        let mapping = registry.map_characters_to_voices(&characters).await;

        // Name match wins without any synthesis calls
        assert_eq!(
            mapping.get("Commander Sela Vash"),
            Some(&existing.voice_registry_id)
        );

        // No description match in memory, so a voice is designed
        let designed = mapping.get("Doctor Elan Ryn").expect("designed voice");
        let profile = registry.get_voice(designed).await.unwrap();
        assert_eq!(profile.voice_id, "designed001");

        // Without a voice description there is nothing to match on
        assert!(!mapping.contains_key("Silent Extra"));
    }

    #[tokio::test]
    async fn test_map_characters_offline_leaves_unmapped() {
        let dir = TempDir::new().unwrap();
        let registry = VoiceRegistry::new(dir.path(), stub(false), memory())
            .await
            .unwrap();

        let characters = vec![character("Doctor Elan Ryn", Some("bright tenor"))];
        let mapping = registry.map_characters_to_voices(&characters).await;
        assert!(mapping.is_empty());
    }
}
