use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::story::beats::ResolvedBeat;

/// Workflow state of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Draft,
    Complete,
    Published,
}

impl Default for EpisodeStatus {
    fn default() -> Self {
        EpisodeStatus::Draft
    }
}

/// A cast member generated for an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub character_id: String,
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub backstory: Option<String>,
    #[serde(default)]
    pub voice_description: Option<String>,
}

/// One planned scene, tied to the beat it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: String,
    pub scene_number: u32,
    pub beat: String,
    pub duration_seconds: u32,
    #[serde(default)]
    pub setting: Option<String>,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub dialogue: Option<String>,
    #[serde(default)]
    pub atmosphere: Option<String>,
    #[serde(default)]
    pub sound_effects: Option<String>,
    /// Raw outline text, kept when the generated outline resisted parsing.
    #[serde(default)]
    pub content: Option<String>,
}

/// One line of a produced script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptLine {
    Description { content: String },
    Dialogue { character: String, content: String },
    SoundEffect { content: String },
    Narration { content: String },
}

impl ScriptLine {
    /// Spoken or descriptive text of the line.
    pub fn content(&self) -> &str {
        match self {
            ScriptLine::Description { content }
            | ScriptLine::Dialogue { content, .. }
            | ScriptLine::SoundEffect { content }
            | ScriptLine::Narration { content } => content,
        }
    }
}

/// Script for one scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptScene {
    pub scene_number: u32,
    pub beat: String,
    #[serde(default)]
    pub setting: Option<String>,
    pub lines: Vec<ScriptLine>,
}

/// Full episode script, stored beside the structure file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    pub episode_id: String,
    pub generated_at: DateTime<Utc>,
    pub scenes: Vec<ScriptScene>,
}

/// Record of produced episode audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRecord {
    pub generated_at: DateTime<Utc>,
    pub duration: f64,
    pub file_path: PathBuf,
}

/// Persistent episode structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: String,
    pub title: String,
    pub series: String,
    pub episode_number: u32,
    #[serde(default)]
    pub theme: Option<String>,
    pub created_at: DateTime<Utc>,
    pub target_duration_minutes: u32,
    #[serde(default)]
    pub status: EpisodeStatus,
    pub beats: Vec<ResolvedBeat>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub audio: Option<AudioRecord>,
}

/// Compact episode listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: String,
    pub title: String,
    pub series: String,
    pub episode_number: u32,
    pub status: EpisodeStatus,
    pub created_at: DateTime<Utc>,
    pub has_script: bool,
    pub has_audio: bool,
}

/// On-disk episode store with an in-memory cache.
///
/// Each episode lives in its own directory holding `structure.json`, an
/// optional `script.json`, and the audio working tree.
pub struct EpisodeStore {
    episodes_dir: PathBuf,
    episodes: Arc<RwLock<HashMap<String, Episode>>>,
}

impl EpisodeStore {
    pub async fn new<P: AsRef<Path>>(episodes_dir: P) -> Result<Self> {
        let episodes_dir = episodes_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&episodes_dir)
            .await
            .with_context(|| format!("Failed to create episodes directory: {}", episodes_dir.display()))?;

        let store = Self {
            episodes_dir,
            episodes: Arc::new(RwLock::new(HashMap::new())),
        };
        store.load_episodes().await?;
        Ok(store)
    }

    async fn load_episodes(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.episodes_dir)
            .await
            .context("Failed to read episodes directory")?;

        let mut episodes = self.episodes.write().await;
        while let Some(entry) = entries.next_entry().await? {
            let structure_file = entry.path().join("structure.json");
            if !structure_file.exists() {
                continue;
            }

            match tokio::fs::read_to_string(&structure_file).await {
                Ok(content) => match serde_json::from_str::<Episode>(&content) {
                    Ok(episode) => {
                        episodes.insert(episode.episode_id.clone(), episode);
                    }
                    Err(e) => {
                        warn!("⚠️ Skipping unparseable episode at {}: {}", structure_file.display(), e);
                    }
                },
                Err(e) => {
                    warn!("⚠️ Could not read {}: {}", structure_file.display(), e);
                }
            }
        }

        debug!("📂 Loaded {} episodes", episodes.len());
        Ok(())
    }

    /// Directory holding one episode's files.
    pub fn episode_dir(&self, episode_id: &str) -> PathBuf {
        self.episodes_dir.join(episode_id)
    }

    fn script_file(&self, episode_id: &str) -> PathBuf {
        self.episode_dir(episode_id).join("script.json")
    }

    /// Fetch an episode by id.
    pub async fn get(&self, episode_id: &str) -> Option<Episode> {
        self.episodes.read().await.get(episode_id).cloned()
    }

    /// Persist an episode and refresh the cache.
    pub async fn save(&self, episode: &Episode) -> Result<()> {
        let dir = self.episode_dir(&episode.episode_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create episode directory: {}", dir.display()))?;

        let path = dir.join("structure.json");
        let content = serde_json::to_string_pretty(episode)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write episode structure: {}", path.display()))?;

        self.episodes
            .write()
            .await
            .insert(episode.episode_id.clone(), episode.clone());

        info!("💾 Saved episode structure: {}", episode.episode_id);
        Ok(())
    }

    /// List episodes, optionally narrowed to one series, ordered by series
    /// and episode number.
    pub async fn list(&self, series: Option<&str>) -> Vec<EpisodeSummary> {
        let episodes = self.episodes.read().await;
        let mut summaries = Vec::new();

        for episode in episodes.values() {
            if let Some(series) = series {
                if episode.series != series {
                    continue;
                }
            }
            summaries.push(EpisodeSummary {
                episode_id: episode.episode_id.clone(),
                title: episode.title.clone(),
                series: episode.series.clone(),
                episode_number: episode.episode_number,
                status: episode.status,
                created_at: episode.created_at,
                has_script: self.script_file(&episode.episode_id).exists(),
                has_audio: episode.audio.is_some(),
            });
        }

        summaries.sort_by(|a, b| {
            a.series
                .cmp(&b.series)
                .then(a.episode_number.cmp(&b.episode_number))
        });
        summaries
    }

    /// Next free episode number within a series.
    pub async fn next_episode_number(&self, series: &str) -> u32 {
        let episodes = self.episodes.read().await;
        episodes
            .values()
            .filter(|e| e.series == series)
            .map(|e| e.episode_number)
            .max()
            .map(|n| n + 1)
            .unwrap_or(1)
    }

    /// Persist a script next to its episode structure.
    pub async fn save_script(&self, script: &Script) -> Result<()> {
        let dir = self.episode_dir(&script.episode_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create episode directory: {}", dir.display()))?;

        let path = self.script_file(&script.episode_id);
        let content = serde_json::to_string_pretty(script)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write script: {}", path.display()))?;

        info!("💾 Saved script: {}", script.episode_id);
        Ok(())
    }

    /// Load an episode's script, if one has been generated.
    pub async fn get_script(&self, episode_id: &str) -> Result<Option<Script>> {
        let path = self.script_file(episode_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        let script: Script = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse script: {}", path.display()))?;
        Ok(Some(script))
    }
}
