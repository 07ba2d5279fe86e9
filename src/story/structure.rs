//! Episode structure generation.
//!
//! Builds an episode from the beat timeline outward: title, cast, one
//! outline per allocated scene, and finally a full script. Outline
//! generation fans out concurrently, script generation walks the scenes
//! in order.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::ids::short_id;
use crate::llm::{ChatMessage, ChatOptions, LLM};
use crate::memory::MemoryClient;
use crate::store::{Character, Episode, EpisodeStatus, EpisodeStore, Scene, Script, ScriptScene};
use crate::story::beats::{allocate_scene_counts, resolve_beats, target_scene_count, ResolvedBeat};
use crate::story::parser;

/// Inputs for a new episode. A missing title is generated from the theme.
#[derive(Debug, Clone)]
pub struct EpisodeRequest {
    pub title: Option<String>,
    pub theme: Option<String>,
    pub series: String,
    pub episode_number: Option<u32>,
    pub target_duration_minutes: u32,
}

/// Drives story generation for one series of episodes.
pub struct StoryBuilder {
    store: Arc<EpisodeStore>,
    llm: Box<dyn LLM>,
    memory: MemoryClient,
}

impl StoryBuilder {
    pub fn new(store: Arc<EpisodeStore>, llm: Box<dyn LLM>, memory: MemoryClient) -> Self {
        Self { store, llm, memory }
    }

    /// Create a new episode with a resolved beat timeline and persist it.
    pub async fn create_episode(&self, request: EpisodeRequest) -> Result<Episode> {
        let episode_id = short_id("ep_");

        let episode_number = match request.episode_number {
            Some(number) => number,
            None => self.store.next_episode_number(&request.series).await,
        };

        let title = match request.title {
            Some(title) => title,
            None => {
                self.generate_title(
                    request.theme.as_deref(),
                    Some(&request.series),
                    Some(episode_number),
                )
                .await
            }
        };

        let episode = Episode {
            episode_id,
            title,
            series: request.series,
            episode_number,
            theme: request.theme,
            created_at: Utc::now(),
            target_duration_minutes: request.target_duration_minutes,
            status: EpisodeStatus::Draft,
            beats: resolve_beats(request.target_duration_minutes)?,
            characters: Vec::new(),
            scenes: Vec::new(),
            audio: None,
        };

        let structure = serde_json::to_value(&episode)?;
        if let Err(e) = self
            .memory
            .add_story_structure(&structure, &episode.episode_id)
            .await
        {
            warn!("⚠️ Could not add episode structure to memory: {}", e);
        }

        self.store.save(&episode).await?;
        info!(
            "🚀 Created episode {} ({}, episode {} of {})",
            episode.episode_id, episode.title, episode.episode_number, episode.series
        );
        Ok(episode)
    }

    async fn generate_title(
        &self,
        theme: Option<&str>,
        series: Option<&str>,
        episode_number: Option<u32>,
    ) -> String {
        let mut prompt = String::from("Generate a Star Trek-style podcast episode title");
        if let Some(theme) = theme {
            prompt.push_str(&format!(" with the theme of '{}'", theme));
        }
        if let Some(series) = series {
            prompt.push_str(&format!(" for the series '{}'", series));
        }
        if let Some(number) = episode_number {
            prompt.push_str(&format!(", episode number {}", number));
        }
        prompt.push_str(". The title should be catchy, intriguing, and reference sci-fi concepts.");

        let messages = vec![
            ChatMessage::system("You are a professional sci-fi writer specializing in Star Trek."),
            ChatMessage::user(prompt),
        ];
        let options = ChatOptions {
            max_tokens: Some(50),
            temperature: Some(0.7),
        };

        match self.llm.chat_with_options(messages, options).await {
            Ok(response) => parser::clean_title(&response.content),
            Err(e) => {
                error!("❌ Title generation failed: {}", e);
                let mut fallback = match episode_number {
                    Some(number) => format!("Episode {}", number),
                    None => "Episode X".to_string(),
                };
                if let Some(theme) = theme {
                    fallback.push_str(&format!(": {}", theme));
                }
                fallback
            }
        }
    }

    /// Generate a cast of characters for the episode and persist it.
    pub async fn generate_characters(&self, episode_id: &str) -> Result<Vec<Character>> {
        let mut episode = self
            .store
            .get(episode_id)
            .await
            .ok_or_else(|| anyhow!("Episode not found: {}", episode_id))?;

        let archetypes = match self
            .memory
            .search_references("Star Trek character archetypes", 3)
            .await
        {
            Ok(records) => join_memories(&records),
            Err(e) => {
                warn!("⚠️ Character archetype lookup failed: {}", e);
                String::new()
            }
        };

        let prompt = format!(
            "Generate a cast of 4-6 main characters for a Star Trek-style podcast episode.\n\n\
             Episode Title: {}\n\
             Series: {}\n\
             Theme: {}\n\n\
             Character Information Reference:\n\
             {}\n\n\
             For each character, provide:\n\
             1. Name\n\
             2. Species\n\
             3. Role on the ship/station\n\
             4. Personality traits\n\
             5. Key backstory elements\n\
             6. Voice description (for voice acting)\n\n\
             The cast should be diverse and should typically include:\n\
             - A commanding officer\n\
             - A science or technical specialist\n\
             - A security or tactical officer\n\
             - A medical or counselor role\n\
             - 1-2 additional specialists or guest characters\n\n\
             Format each character as a detailed profile that can be used for voice casting \
             and character development.",
            episode.title,
            episode.series,
            episode.theme.as_deref().unwrap_or("Not specified"),
            archetypes,
        );

        let messages = vec![
            ChatMessage::system("You are a Star Trek universe expert and character creator."),
            ChatMessage::user(prompt),
        ];
        let options = ChatOptions {
            max_tokens: Some(2000),
            temperature: Some(0.8),
        };
        let response = self
            .llm
            .chat_with_options(messages, options)
            .await
            .context("Character generation request failed")?;

        let characters = parser::parse_characters(&response.content);
        info!(
            "✅ Generated {} characters for episode {}",
            characters.len(),
            episode_id
        );

        episode.characters = characters.clone();
        self.store.save(&episode).await?;

        Ok(characters)
    }

    /// Generate scene outlines for every beat of the episode.
    ///
    /// The scene budget is split across beats proportional to their
    /// duration, and all outlines are requested concurrently. Failed
    /// outlines are dropped rather than failing the whole episode.
    pub async fn generate_scenes(&self, episode_id: &str) -> Result<Vec<Scene>> {
        let mut episode = self
            .store
            .get(episode_id)
            .await
            .ok_or_else(|| anyhow!("Episode not found: {}", episode_id))?;

        if episode.characters.is_empty() {
            warn!(
                "⚠️ No characters found for episode {}. Generating characters first.",
                episode_id
            );
            self.generate_characters(episode_id).await?;
            episode = self
                .store
                .get(episode_id)
                .await
                .ok_or_else(|| anyhow!("Episode not found: {}", episode_id))?;
        }

        let target_seconds = episode.target_duration_minutes * 60;
        let target_scenes = target_scene_count(target_seconds);
        let allocation = allocate_scene_counts(&episode.beats, target_seconds, target_scenes);
        let total_scenes: u32 = allocation.iter().map(|(_, count)| count).sum();
        let scene_duration = target_seconds / total_scenes;

        let query = format!("Star Trek {}", episode.theme.as_deref().unwrap_or(""));
        let reference_text = match self.memory.search_references(&query, 3).await {
            Ok(records) => join_memories(&records),
            Err(e) => {
                warn!("⚠️ Reference lookup failed: {}", e);
                String::new()
            }
        };

        let character_info = character_summary(&episode.characters);

        info!(
            "🔄 Generating {} scene outlines across {} beats...",
            total_scenes,
            episode.beats.len()
        );

        let mut outline_futures = Vec::new();
        let mut scene_number = 0u32;
        for (beat, (_, count)) in episode.beats.iter().zip(allocation.iter()) {
            for _ in 0..*count {
                scene_number += 1;
                outline_futures.push(self.generate_scene_outline(
                    &episode,
                    beat,
                    scene_number,
                    total_scenes,
                    scene_duration,
                    &reference_text,
                    &character_info,
                ));
            }
        }

        let scenes: Vec<Scene> = join_all(outline_futures).await.into_iter().flatten().collect();
        info!(
            "✅ Generated {}/{} scene outlines for episode {}",
            scenes.len(),
            total_scenes,
            episode_id
        );

        episode.scenes = scenes.clone();
        self.store.save(&episode).await?;

        Ok(scenes)
    }

    async fn generate_scene_outline(
        &self,
        episode: &Episode,
        beat: &ResolvedBeat,
        scene_number: u32,
        total_scenes: u32,
        scene_duration: u32,
        reference_text: &str,
        character_info: &str,
    ) -> Option<Scene> {
        let progress = scene_number as f64 / total_scenes as f64;
        let reference: String = if reference_text.is_empty() {
            "No specific reference material.".to_string()
        } else {
            reference_text.chars().take(500).collect()
        };

        let prompt = format!(
            "Create a detailed scene outline for a Star Trek-style podcast episode.\n\n\
             EPISODE INFORMATION:\n\
             Title: {}\n\
             Theme: {}\n\n\
             STORY BEAT: {}\n\
             Beat Description: {}\n\
             Scene Number: {} of {}\n\
             Progress: {:.0}% through the story\n\n\
             CHARACTERS:\n\
             {}\n\n\
             REFERENCE MATERIAL:\n\
             {}\n\n\
             Create a detailed scene outline with:\n\
             1. Setting (where the scene takes place)\n\
             2. Character participants (who is in this scene)\n\
             3. Plot (what happens in this scene)\n\
             4. Dialogue suggestions (key lines or exchanges)\n\
             5. Atmosphere/mood\n\
             6. Sound effects/music suggestions\n\n\
             The scene should be appropriate for the beat it's in, advancing the story \
             in a compelling way.\n\
             Target scene length: {} minutes {} seconds.",
            episode.title,
            episode.theme.as_deref().unwrap_or("Not specified"),
            beat.name,
            beat.description,
            scene_number,
            total_scenes,
            progress * 100.0,
            character_info,
            reference,
            scene_duration / 60,
            scene_duration % 60,
        );

        let messages = vec![
            ChatMessage::system(
                "You are an expert screenwriter specializing in science fiction and Star Trek.",
            ),
            ChatMessage::user(prompt),
        ];
        let options = ChatOptions {
            max_tokens: Some(1000),
            temperature: Some(0.7),
        };

        let response = match self.llm.chat_with_options(messages, options).await {
            Ok(response) => response,
            Err(e) => {
                error!("❌ Scene outline {} failed: {}", scene_number, e);
                return None;
            }
        };

        let outline = parser::parse_scene_outline(&response.content);
        Some(Scene {
            scene_id: short_id("scene_"),
            scene_number,
            beat: beat.name.clone(),
            duration_seconds: scene_duration,
            setting: outline.setting,
            characters: outline.characters,
            plot: outline.plot,
            dialogue: outline.dialogue,
            atmosphere: outline.atmosphere,
            sound_effects: outline.sound_effects,
            content: outline.content,
        })
    }

    /// Generate a complete script, one scene at a time, and persist it.
    pub async fn generate_script(&self, episode_id: &str) -> Result<Script> {
        let episode = self
            .store
            .get(episode_id)
            .await
            .ok_or_else(|| anyhow!("Episode not found: {}", episode_id))?;

        if episode.scenes.is_empty() {
            anyhow::bail!(
                "No scenes found for episode {}. Generate scenes first.",
                episode_id
            );
        }

        let character_info = character_summary(&episode.characters);
        let total_scenes = episode.scenes.len();
        info!("📝 Generating script for {} scenes...", total_scenes);

        let mut scenes = Vec::with_capacity(total_scenes);
        for (i, scene) in episode.scenes.iter().enumerate() {
            info!(
                "🔄 Generating script for scene {}/{}: {}",
                i + 1,
                total_scenes,
                scene.beat
            );
            scenes.push(self.generate_scene_script(&episode, scene, &character_info).await);
        }

        let script = Script {
            title: episode.title.clone(),
            episode_id: episode_id.to_string(),
            generated_at: Utc::now(),
            scenes,
        };
        self.store.save_script(&script).await?;

        info!("✅ Script generation completed for episode: {}", episode.title);
        Ok(script)
    }

    async fn generate_scene_script(
        &self,
        episode: &Episode,
        scene: &Scene,
        character_info: &str,
    ) -> ScriptScene {
        let context = format!(
            "Title: {}\n\
             Theme: {}\n\
             Beat: {}\n\
             Setting: {}\n\
             Scene Number: {}\n\n\
             Character Information:\n\
             {}\n",
            episode.title,
            episode.theme.as_deref().unwrap_or(""),
            scene.beat,
            scene.setting.as_deref().unwrap_or(""),
            scene.scene_number,
            character_info,
        );

        let query = format!("{} {}", scene.beat, scene.setting.as_deref().unwrap_or(""));
        let reference_text = match self.memory.search_references(&query, 3).await {
            Ok(records) => join_memories(&records),
            Err(e) => {
                warn!(
                    "⚠️ Reference lookup failed for scene {}: {}",
                    scene.scene_number, e
                );
                String::new()
            }
        };

        let prompt = format!(
            "Generate a detailed script for a Star Trek audio drama scene.\n\n\
             Context:\n\
             {}\n\
             Reference Material:\n\
             {}\n\n\
             Generate a scene that includes:\n\
             1. Scene description\n\
             2. Character dialogue\n\
             3. Sound effects\n\
             4. Narration where needed\n\n\
             Format the output with clear scene headings and character names.",
            context, reference_text,
        );

        let messages = vec![
            ChatMessage::system("You are an expert screenwriter for audio dramas."),
            ChatMessage::user(prompt),
        ];
        let options = ChatOptions {
            max_tokens: Some(2000),
            temperature: Some(0.7),
        };

        let lines = match self.llm.chat_with_options(messages, options).await {
            Ok(response) => parser::parse_script_lines(&response.content),
            Err(e) => {
                error!(
                    "❌ Script generation failed for scene {}: {}",
                    scene.scene_number, e
                );
                Vec::new()
            }
        };

        ScriptScene {
            scene_number: scene.scene_number,
            beat: scene.beat.clone(),
            setting: scene.setting.clone(),
            lines,
        }
    }
}

fn join_memories(records: &[crate::memory::MemoryRecord]) -> String {
    records
        .iter()
        .map(|r| r.memory.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn character_summary(characters: &[Character]) -> String {
    characters
        .iter()
        .map(|c| {
            format!(
                "{}: {} - {}",
                c.name,
                c.species.as_deref().unwrap_or("Unknown"),
                c.role.as_deref().unwrap_or("Unknown"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMProvider, LLMResponse};
    use crate::memory::MemoryConfig;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const CHARACTER_TEXT: &str = "**Commander Sela Vash**\n\
        Species: Romulan (Tal Shiar defector)\n\
        Role: Commanding officer of Starbase 47\n\
        Personality: Disciplined, with a dry wit that surfaces under pressure.\n\
        Backstory: Defected to the Federation during the Dominion War.\n\
        Voice: Low and precise, with a clipped formal accent.\n\
        2. **Doctor Elan Ryn**\n\
        Species: Trill (joined host)\n\
        Role: Chief medical officer\n\
        Personality: Warm but blunt when triage starts.\n\
        Backstory: Carries the Ryn symbiont and three lifetimes of field medicine.\n\
        Voice: Bright tenor, quick cadence.";

    const OUTLINE_TEXT: &str = "Sound Effects: Low engine hum, console chirps.\n\
        Setting: The operations deck of Starbase 47.\n\
        Characters: Commander Sela Vash, Doctor Elan Ryn\n\
        Plot: A silent freighter drifts into the exclusion zone.\n\
        Atmosphere: Tense and quiet.\n\
        Dialogue: Vash orders battle stations.";

    const SCRIPT_TEXT: &str = "[The operations deck at red alert]\n\n\
        NARRATOR: The station had never been this quiet at battle stations.\n\n\
        COMMANDER VASH (quietly): Hold position. Nobody fires first.\n\n\
        (A low alarm tone builds and cuts out)\n\n\
        The freighter drifts closer, its running lights dead.";

    struct CannedLLM;

    #[async_trait]
    impl LLM for CannedLLM {
        async fn chat_with_options(
            &self,
            messages: Vec<ChatMessage>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let content = if prompt.contains("episode title") {
                "\"The Hollow Frequency\"".to_string()
            } else if prompt.contains("cast of 4-6 main characters") {
                CHARACTER_TEXT.to_string()
            } else if prompt.contains("scene outline") {
                OUTLINE_TEXT.to_string()
            } else {
                SCRIPT_TEXT.to_string()
            };
            Ok(LLMResponse {
                content,
                tokens_used: None,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn provider_type(&self) -> LLMProvider {
            LLMProvider::OpenAI
        }
    }

    struct FailingLLM;

    #[async_trait]
    impl LLM for FailingLLM {
        async fn chat_with_options(
            &self,
            _messages: Vec<ChatMessage>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            Err(anyhow!("model offline"))
        }

        async fn is_available(&self) -> bool {
            false
        }

        fn provider_type(&self) -> LLMProvider {
            LLMProvider::OpenAI
        }
    }

    async fn builder(dir: &TempDir, llm: Box<dyn LLM>) -> StoryBuilder {
        let store = Arc::new(EpisodeStore::new(dir.path()).await.unwrap());
        let memory = MemoryClient::new(MemoryConfig::default()).unwrap();
        StoryBuilder::new(store, llm, memory)
    }

    fn request(title: Option<&str>) -> EpisodeRequest {
        EpisodeRequest {
            title: title.map(|t| t.to_string()),
            theme: Some("first contact".to_string()),
            series: "Main Series".to_string(),
            episode_number: None,
            target_duration_minutes: 30,
        }
    }

    #[tokio::test]
    async fn test_create_episode_generates_title_and_beats() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, Box::new(CannedLLM)).await;

        let episode = builder.create_episode(request(None)).await.unwrap();
        assert_eq!(episode.title, "The Hollow Frequency");
        assert_eq!(episode.episode_number, 1);
        assert_eq!(episode.beats.len(), 15);
        assert_eq!(episode.status, EpisodeStatus::Draft);
        assert!(builder.store.get(&episode.episode_id).await.is_some());
    }

    #[tokio::test]
    async fn test_create_episode_title_fallback() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, Box::new(FailingLLM)).await;

        let episode = builder.create_episode(request(None)).await.unwrap();
        assert_eq!(episode.title, "Episode 1: first contact");
    }

    #[tokio::test]
    async fn test_generate_characters_updates_episode() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, Box::new(CannedLLM)).await;

        let episode = builder.create_episode(request(Some("Test Episode"))).await.unwrap();
        let characters = builder.generate_characters(&episode.episode_id).await.unwrap();

        assert_eq!(characters.len(), 2);
        assert_eq!(characters[0].name, "Commander Sela Vash");

        let reloaded = builder.store.get(&episode.episode_id).await.unwrap();
        assert_eq!(reloaded.characters.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_scenes_allocates_timeline() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, Box::new(CannedLLM)).await;

        let episode = builder.create_episode(request(Some("Test Episode"))).await.unwrap();
        let scenes = builder.generate_scenes(&episode.episode_id).await.unwrap();

        // 30 minutes → 12 target scenes → 17 once every beat has one
        assert_eq!(scenes.len(), 17);
        let numbers: Vec<u32> = scenes.iter().map(|s| s.scene_number).collect();
        assert_eq!(numbers, (1..=17).collect::<Vec<u32>>());

        assert_eq!(scenes[0].beat, "Opening Image");
        assert_eq!(scenes[7].beat, "Fun and Games");
        assert_eq!(scenes[8].beat, "Fun and Games");
        assert_eq!(scenes[16].beat, "Final Image");
        assert!(scenes.iter().all(|s| s.duration_seconds == 105));
        assert_eq!(
            scenes[0].setting.as_deref(),
            Some("The operations deck of Starbase 47.")
        );

        let reloaded = builder.store.get(&episode.episode_id).await.unwrap();
        assert_eq!(reloaded.scenes.len(), 17);
        assert_eq!(reloaded.characters.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_script_produces_classified_lines() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, Box::new(CannedLLM)).await;

        let episode = builder.create_episode(request(Some("Test Episode"))).await.unwrap();
        builder.generate_scenes(&episode.episode_id).await.unwrap();

        let script = builder.generate_script(&episode.episode_id).await.unwrap();
        assert_eq!(script.title, "Test Episode");
        assert_eq!(script.scenes.len(), 17);
        assert_eq!(script.scenes[0].lines.len(), 5);
        assert_eq!(script.scenes[0].beat, "Opening Image");

        let stored = builder
            .store
            .get_script(&episode.episode_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.scenes.len(), 17);
    }

    #[tokio::test]
    async fn test_failed_outlines_are_dropped() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, Box::new(FailingLLM)).await;

        let mut episode = builder
            .create_episode(request(Some("Test Episode")))
            .await
            .unwrap();
        episode.characters = vec![Character {
            character_id: "char_test0001".to_string(),
            name: "Commander Sela Vash".to_string(),
            species: Some("Romulan".to_string()),
            role: Some("Commanding officer".to_string()),
            personality: None,
            backstory: None,
            voice_description: None,
        }];
        builder.store.save(&episode).await.unwrap();

        let scenes = builder.generate_scenes(&episode.episode_id).await.unwrap();
        assert!(scenes.is_empty());

        // Without scenes there is nothing to script
        assert!(builder.generate_script(&episode.episode_id).await.is_err());
    }
}
