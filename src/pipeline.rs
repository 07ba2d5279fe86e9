//! Episode audio generation pipeline.
//!
//! Turns a stored script into voiced scene audio and a single assembled
//! episode file. Scenes render in parallel under a semaphore-bounded worker
//! pool; dialogue and narration go through the voice registry, while sound
//! effects and ambience beds are matched from the local asset library.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::audio::{
    plan_episode_assembly, plan_scene_mix, AudioClip, AudioProber, AudioRenderer, ClipKind,
    EpisodeAssembler, SceneAudioResult, SceneMixer,
};
use crate::store::{AudioRecord, Episode, EpisodeStatus, EpisodeStore, ScriptLine, ScriptScene};
use crate::tts::VoiceRegistry;

/// Summary of one audio generation run, persisted next to the episode audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generated_at: DateTime<Utc>,
    pub episode_id: String,
    pub title: String,
    pub scenes_generated: usize,
    pub scenes_successful: usize,
    /// Sum of the individual scene durations, before intro and outro.
    pub total_duration: f64,
    pub full_episode_file: Option<PathBuf>,
}

/// Orchestrates scene rendering and episode assembly for stored episodes.
pub struct AudioPipeline {
    store: Arc<EpisodeStore>,
    registry: Arc<VoiceRegistry>,
    sound_effects_dir: PathBuf,
    music_dir: PathBuf,
    ambience_dir: PathBuf,
    renderer: AudioRenderer,
    assembler: EpisodeAssembler,
    worker_semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl AudioPipeline {
    pub async fn new(
        store: Arc<EpisodeStore>,
        registry: Arc<VoiceRegistry>,
        assets_dir: &Path,
        renderer: AudioRenderer,
        max_workers: usize,
    ) -> Result<Self> {
        info!("🔧 Initializing audio pipeline with {} workers", max_workers);

        let sound_effects_dir = assets_dir.join("sound_effects");
        let music_dir = assets_dir.join("music");
        let ambience_dir = assets_dir.join("ambience");
        for dir in [&sound_effects_dir, &music_dir, &ambience_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create asset directory: {}", dir.display()))?;
        }

        Ok(Self {
            store,
            registry,
            sound_effects_dir,
            music_dir,
            ambience_dir,
            assembler: EpisodeAssembler::new(renderer.clone()),
            renderer,
            worker_semaphore: Arc::new(Semaphore::new(max_workers)),
            max_concurrent: max_workers,
        })
    }

    /// Generate all audio for an episode: every scene, intro and outro
    /// music, and the assembled episode file.
    ///
    /// The episode record is updated with the final audio only when
    /// assembly succeeds; failed scenes are reported but do not abort the
    /// run.
    pub async fn generate_episode_audio(&self, episode_id: &str) -> Result<GenerationReport> {
        let mut episode = self
            .store
            .get(episode_id)
            .await
            .ok_or_else(|| anyhow!("Episode not found: {}", episode_id))?;
        let script = self
            .store
            .get_script(episode_id)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "No script found for episode {}. Generate a script first.",
                    episode_id
                )
            })?;

        let audio_dir = self.store.episode_dir(episode_id).join("audio");
        tokio::fs::create_dir_all(&audio_dir)
            .await
            .with_context(|| format!("Failed to create audio directory: {}", audio_dir.display()))?;

        info!("🚀 Starting audio generation for '{}'", episode.title);
        info!("📁 Output: {}", audio_dir.display());

        let character_voices = self
            .registry
            .map_characters_to_voices(&episode.characters)
            .await;
        if character_voices.is_empty() {
            bail!("No character voices mapped for episode {}", episode_id);
        }

        let scene_results = self
            .generate_scenes_parallel(&episode, &script.scenes, &character_voices, &audio_dir)
            .await?;

        let intro = self.prepare_intro_music(&audio_dir).await;
        let outro = self.prepare_outro_music(&audio_dir).await;

        let scenes_successful = scene_results.iter().filter(|r| r.success).count();
        let total_duration: f64 = scene_results.iter().map(|r| r.duration).sum();

        let (full_episode_file, episode_duration) =
            match plan_episode_assembly(&scene_results, intro, outro) {
                Ok(plan) => {
                    let output = audio_dir.join("full_episode.mp3");
                    let duration = self
                        .assembler
                        .assemble(&plan, &audio_dir, &output, &episode.title, &episode.series)
                        .await?;
                    (Some(output), duration)
                }
                Err(e) => {
                    error!("❌ Could not assemble episode: {}", e);
                    (None, 0.0)
                }
            };

        let report = GenerationReport {
            generated_at: Utc::now(),
            episode_id: episode_id.to_string(),
            title: episode.title.clone(),
            scenes_generated: scene_results.len(),
            scenes_successful,
            total_duration,
            full_episode_file: full_episode_file.clone(),
        };

        let metadata_file = audio_dir.join("generation_metadata.json");
        let content = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(&metadata_file, content)
            .await
            .with_context(|| {
                format!(
                    "Failed to write generation metadata: {}",
                    metadata_file.display()
                )
            })?;

        if let Some(file_path) = full_episode_file {
            episode.audio = Some(AudioRecord {
                generated_at: report.generated_at,
                duration: episode_duration,
                file_path,
            });
            episode.status = EpisodeStatus::Complete;
            self.store.save(&episode).await?;
        }

        info!(
            "✅ Audio generation finished: {}/{} scenes",
            scenes_successful,
            report.scenes_generated
        );
        Ok(report)
    }

    /// Render every scene concurrently, bounded by the worker semaphore.
    async fn generate_scenes_parallel(
        &self,
        episode: &Episode,
        scenes: &[ScriptScene],
        character_voices: &HashMap<String, String>,
        audio_dir: &Path,
    ) -> Result<Vec<SceneAudioResult>> {
        let (tx, mut rx) = mpsc::channel(self.max_concurrent);
        let total_scenes = scenes.len();

        for (index, scene) in scenes.iter().cloned().enumerate() {
            let atmosphere = episode
                .scenes
                .iter()
                .find(|planned| planned.scene_number == scene.scene_number)
                .and_then(|planned| planned.atmosphere.clone());
            let worker = self.scene_worker();
            let voices = character_voices.clone();
            let audio_dir = audio_dir.to_path_buf();
            let tx = tx.clone();
            let semaphore = Arc::clone(&self.worker_semaphore);

            tokio::spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();

                info!(
                    "🎬 Rendering scene {}/{}: {}",
                    index + 1,
                    total_scenes,
                    scene.beat
                );

                let result = worker
                    .generate_scene_audio(&scene, index, atmosphere.as_deref(), &voices, &audio_dir)
                    .await;

                if let Err(e) = tx.send(result).await {
                    error!("Failed to send result: {}", e);
                }
            });
        }

        // Drop the original sender to close the channel when all tasks complete
        drop(tx);

        let mut results = Vec::with_capacity(total_scenes);
        while let Some(result) = rx.recv().await {
            if result.success {
                info!(
                    "✅ Scene {} audio ready ({:.1}s)",
                    result.scene_number, result.duration
                );
            } else {
                warn!(
                    "❌ Scene {} failed: {}",
                    result.scene_number,
                    result.error.as_deref().unwrap_or("Unknown error")
                );
            }
            results.push(result);
        }

        results.sort_by_key(|r| r.scene_index);
        Ok(results)
    }

    /// Create a lightweight clone of pipeline state for parallel scene rendering
    fn scene_worker(&self) -> SceneWorker {
        SceneWorker {
            registry: Arc::clone(&self.registry),
            sound_effects_dir: self.sound_effects_dir.clone(),
            ambience_dir: self.ambience_dir.clone(),
            mixer: SceneMixer::new(self.renderer.clone()),
            prober: AudioProber::new(),
        }
    }

    async fn prepare_intro_music(&self, audio_dir: &Path) -> Option<PathBuf> {
        let source = match self.find_music(&["intro", "opening"]).await {
            Some(source) => source,
            None => {
                warn!("No intro music found");
                return None;
            }
        };
        match self.assembler.prepare_intro(&source, audio_dir).await {
            Ok(prepared) => Some(prepared),
            Err(e) => {
                error!("Error processing intro music: {}", e);
                None
            }
        }
    }

    async fn prepare_outro_music(&self, audio_dir: &Path) -> Option<PathBuf> {
        let source = match self.find_music(&["outro", "closing"]).await {
            Some(source) => source,
            None => {
                warn!("No outro music found");
                return None;
            }
        };
        match self.assembler.prepare_outro(&source, audio_dir).await {
            Ok(prepared) => Some(prepared),
            Err(e) => {
                error!("Error processing outro music: {}", e);
                None
            }
        }
    }

    async fn find_music(&self, keys: &[&str]) -> Option<PathBuf> {
        for key in keys {
            if let Some(found) = find_asset(&self.music_dir, key, "mp3").await {
                return Some(found);
            }
        }
        None
    }
}

/// Lightweight pipeline state handed to parallel scene tasks.
struct SceneWorker {
    registry: Arc<VoiceRegistry>,
    sound_effects_dir: PathBuf,
    ambience_dir: PathBuf,
    mixer: SceneMixer,
    prober: AudioProber,
}

impl SceneWorker {
    async fn generate_scene_audio(
        &self,
        scene: &ScriptScene,
        scene_index: usize,
        atmosphere: Option<&str>,
        character_voices: &HashMap<String, String>,
        audio_dir: &Path,
    ) -> SceneAudioResult {
        match self
            .render_scene(scene, scene_index, atmosphere, character_voices, audio_dir)
            .await
        {
            Ok((audio_file, duration)) => {
                SceneAudioResult::succeeded(scene_index, scene.scene_number, audio_file, duration)
            }
            Err(e) => {
                error!("Error generating scene audio: {}", e);
                SceneAudioResult::failed(scene_index, scene.scene_number, e.to_string())
            }
        }
    }

    async fn render_scene(
        &self,
        scene: &ScriptScene,
        scene_index: usize,
        atmosphere: Option<&str>,
        character_voices: &HashMap<String, String>,
        audio_dir: &Path,
    ) -> Result<(PathBuf, f64)> {
        let scene_dir = audio_dir.join(format!("scene_{:02}", scene_index));
        let temp_dir = scene_dir.join("temp");
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .with_context(|| format!("Failed to create scene directory: {}", temp_dir.display()))?;

        let mut clips = Vec::new();
        for (line_index, line) in scene.lines.iter().enumerate() {
            if let Some(clip) = self
                .process_line(line, line_index, &scene_dir, &temp_dir, character_voices)
                .await
            {
                clips.push(clip);
            }
        }

        let ambience = self.find_scene_ambience(scene, atmosphere, &scene_dir).await;

        let plan = plan_scene_mix(clips, ambience)?;
        let output = scene_dir.join("scene_audio.mp3");
        let duration = self.mixer.mix(&plan, &scene_dir, &output).await?;
        Ok((output, duration))
    }

    async fn process_line(
        &self,
        line: &ScriptLine,
        line_index: usize,
        scene_dir: &Path,
        temp_dir: &Path,
        character_voices: &HashMap<String, String>,
    ) -> Option<AudioClip> {
        if line.content().is_empty() {
            return None;
        }

        match line {
            ScriptLine::Dialogue { character, content } => {
                self.render_character_line(character, content, line_index, temp_dir, character_voices)
                    .await
            }
            ScriptLine::Narration { content } => {
                self.render_narrator_line(content, line_index, temp_dir).await
            }
            ScriptLine::SoundEffect { content } => {
                self.find_sound_effect(content, line_index, scene_dir).await
            }
            // Descriptions carry no audio
            ScriptLine::Description { .. } => None,
        }
    }

    async fn render_character_line(
        &self,
        character: &str,
        content: &str,
        line_index: usize,
        temp_dir: &Path,
        character_voices: &HashMap<String, String>,
    ) -> Option<AudioClip> {
        let voice_identifier = match resolve_voice(character, character_voices) {
            Some(voice) => voice.clone(),
            None => {
                error!("No voice found for character: {}", character);
                return None;
            }
        };

        let content = clean_for_synthesis(content);
        let audio_file = temp_dir.join(format!(
            "line_{:03}_{}.mp3",
            line_index,
            sanitize_character(character)
        ));

        match self
            .synthesize_line(&content, &voice_identifier, &audio_file)
            .await
        {
            Ok(duration) => Some(
                AudioClip::new(audio_file, ClipKind::Dialogue, duration)
                    .with_character(character)
                    .with_line_index(line_index),
            ),
            Err(e) => {
                error!("Error generating character audio for {}: {}", character, e);
                None
            }
        }
    }

    async fn render_narrator_line(
        &self,
        content: &str,
        line_index: usize,
        temp_dir: &Path,
    ) -> Option<AudioClip> {
        let voice_identifier = match self.narrator_voice().await {
            Some(voice) => voice,
            None => {
                error!("No voice available for narrator");
                return None;
            }
        };

        let audio_file = temp_dir.join(format!("line_{:03}_narrator.mp3", line_index));
        match self
            .synthesize_line(content, &voice_identifier, &audio_file)
            .await
        {
            Ok(duration) => Some(
                AudioClip::new(audio_file, ClipKind::Narration, duration)
                    .with_line_index(line_index),
            ),
            Err(e) => {
                error!("Error generating narrator audio: {}", e);
                None
            }
        }
    }

    async fn narrator_voice(&self) -> Option<String> {
        match self
            .registry
            .find_voices_by_description("narrator deep authoritative", 1)
            .await
        {
            Ok(voices) if !voices.is_empty() => {
                return Some(voices[0].voice_registry_id.clone());
            }
            Ok(_) => {}
            Err(e) => debug!("Narrator voice search unavailable: {}", e),
        }

        // Fall back to any registered voice
        let voices = self.registry.list_voices().await;
        voices.first().map(|v| v.voice_registry_id.clone())
    }

    async fn synthesize_line(
        &self,
        text: &str,
        voice_identifier: &str,
        audio_file: &Path,
    ) -> Result<f64> {
        self.registry
            .generate_speech(text, voice_identifier, Some(audio_file))
            .await?;
        let duration = self.prober.duration_seconds(audio_file).await?;
        Ok(duration)
    }

    async fn find_sound_effect(
        &self,
        description: &str,
        line_index: usize,
        scene_dir: &Path,
    ) -> Option<AudioClip> {
        let search_key = sound_effect_key(description);

        for ext in ["mp3", "wav"] {
            let effect_file = match find_asset(&self.sound_effects_dir, &search_key, ext).await {
                Some(effect_file) => effect_file,
                None => continue,
            };

            let duration = match self.prober.duration_seconds(&effect_file).await {
                Ok(duration) => duration,
                Err(e) => {
                    error!("Error processing sound effect: {}", e);
                    continue;
                }
            };

            let dest_file = scene_dir.join(format!("sfx_{:03}.{}", line_index, ext));
            if let Err(e) = tokio::fs::copy(&effect_file, &dest_file).await {
                error!("Error processing sound effect: {}", e);
                continue;
            }

            return Some(
                AudioClip::new(dest_file, ClipKind::SoundEffect, duration)
                    .with_line_index(line_index),
            );
        }

        warn!("No sound effect found for: {}", description);
        None
    }

    async fn find_scene_ambience(
        &self,
        scene: &ScriptScene,
        atmosphere: Option<&str>,
        scene_dir: &Path,
    ) -> Option<AudioClip> {
        let setting = scene.setting.as_deref().unwrap_or("");
        let keywords = ambience_keywords(setting, atmosphere.unwrap_or(""));

        for keyword in keywords {
            for ext in ["mp3", "wav"] {
                let ambience_file = match find_asset(&self.ambience_dir, keyword, ext).await {
                    Some(ambience_file) => ambience_file,
                    None => continue,
                };

                let duration = match self.prober.duration_seconds(&ambience_file).await {
                    Ok(duration) => duration,
                    Err(e) => {
                        error!("Error processing ambience: {}", e);
                        continue;
                    }
                };

                let dest_file = scene_dir.join(format!("ambience.{}", ext));
                if let Err(e) = tokio::fs::copy(&ambience_file, &dest_file).await {
                    error!("Error processing ambience: {}", e);
                    continue;
                }

                return Some(AudioClip::new(dest_file, ClipKind::Ambience, duration));
            }
        }

        warn!("No ambience found for setting: {}", setting);
        None
    }
}

/// Strip punctuation that trips up speech synthesis.
fn clean_for_synthesis(text: &str) -> String {
    text.replace('"', "").replace("...", "…")
}

/// Character name as a filesystem-safe fragment.
fn sanitize_character(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Normalize a sound effect description into an asset search key.
fn sound_effect_key(description: &str) -> String {
    description
        .to_lowercase()
        .replace(' ', "_")
        .replace('.', "")
        .replace(',', "")
}

/// Look up a character's mapped voice, tolerating case differences.
fn resolve_voice<'a>(
    character: &str,
    character_voices: &'a HashMap<String, String>,
) -> Option<&'a String> {
    if let Some(voice) = character_voices.get(character) {
        return Some(voice);
    }
    character_voices
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(character))
        .map(|(_, voice)| voice)
}

/// Ordered setting keywords and the ambience assets that suit them.
const AMBIENCE_KEYWORDS: [(&str, [&str; 3]); 13] = [
    ("bridge", ["bridge", "starship_bridge", "command_center"]),
    ("space", ["space", "vacuum", "stars"]),
    ("planet", ["planet", "alien_world", "nature"]),
    ("engine room", ["engine_room", "machinery", "warp_core"]),
    ("medical", ["sickbay", "medical", "hospital"]),
    ("corridor", ["corridor", "hallway", "footsteps"]),
    ("quarters", ["quarters", "room", "living_space"]),
    ("shuttlecraft", ["shuttle", "small_ship", "cockpit"]),
    ("transporter", ["transporter", "teleport", "energy"]),
    ("battle", ["battle", "combat", "weapons"]),
    ("forest", ["forest", "woods", "nature"]),
    ("city", ["city", "urban", "crowd"]),
    ("underwater", ["underwater", "ocean", "bubbles"]),
];

/// Candidate ambience search keys for a scene, most specific first.
fn ambience_keywords(setting: &str, atmosphere: &str) -> Vec<&'static str> {
    let setting = setting.to_lowercase();
    let atmosphere = atmosphere.to_lowercase();

    let mut keywords = Vec::new();
    for (key, candidates) in AMBIENCE_KEYWORDS {
        if key.split(' ').any(|term| setting.contains(term)) {
            keywords.extend(candidates);
            break;
        }
    }

    if atmosphere.contains("tense") || atmosphere.contains("danger") {
        keywords.push("tension");
    } else if atmosphere.contains("quiet") || atmosphere.contains("calm") {
        keywords.push("quiet");
    } else if atmosphere.contains("busy") || atmosphere.contains("active") {
        keywords.push("activity");
    }

    if keywords.is_empty() {
        keywords = vec!["background", "ambience"];
    }
    keywords
}

/// Find the first asset in `dir` whose name contains `key` with the given
/// extension. Matches are sorted so repeated runs pick the same file.
async fn find_asset(dir: &Path, key: &str, ext: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut matches = Vec::new();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_lowercase(),
            None => continue,
        };
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if name.contains(key) && extension.eq_ignore_ascii_case(ext) {
            matches.push(path);
        }
    }

    matches.sort();
    matches.into_iter().next()
}
