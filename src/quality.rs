//! Quality verification for generated episodes.
//!
//! Scripts are checked against the episode's beat sheet and for dialogue
//! balance and pacing. Produced audio is probed with ffprobe for integrity
//! and encoding properties. Issues are weighted into a 0 to 10 score and a
//! letter grade, and the full report lands in `quality_check.json` beside
//! the episode structure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::AudioProber;
use crate::store::{Episode, EpisodeStore, Script, ScriptLine};

/// How much an issue hurts the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One flagged problem, tied to a location where one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Score, grade, and findings for one side of the check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionReport {
    pub score: f64,
    pub grade: String,
    pub issues: Vec<QualityIssue>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallQuality {
    pub score: f64,
    pub grade: String,
}

/// Full quality report for an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub episode_id: String,
    pub title: String,
    pub checked_at: DateTime<Utc>,
    pub script_quality: Option<SectionReport>,
    pub audio_quality: Option<SectionReport>,
    pub overall_quality: Option<OverallQuality>,
}

impl QualityReport {
    pub fn issue_count(&self) -> usize {
        self.script_quality.as_ref().map_or(0, |s| s.issues.len())
            + self.audio_quality.as_ref().map_or(0, |s| s.issues.len())
    }
}

/// Which sides of the episode to check.
#[derive(Debug, Clone, Copy)]
pub struct CheckOptions {
    pub check_script: bool,
    pub check_audio: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            check_script: true,
            check_audio: true,
        }
    }
}

/// Quality verification for episodes and audio.
pub struct QualityChecker {
    store: Arc<EpisodeStore>,
    prober: AudioProber,
}

impl QualityChecker {
    pub fn new(store: Arc<EpisodeStore>) -> Self {
        Self {
            store,
            prober: AudioProber::new(),
        }
    }

    /// Run the requested checks and persist the report.
    ///
    /// Sides whose inputs do not exist yet (no script, no audio) are
    /// skipped with a warning rather than failing the whole check.
    pub async fn check_episode(
        &self,
        episode_id: &str,
        options: CheckOptions,
    ) -> Result<QualityReport> {
        let episode = self
            .store
            .get(episode_id)
            .await
            .ok_or_else(|| anyhow!("Episode not found: {}", episode_id))?;

        let script_quality = if options.check_script {
            match self.store.get_script(episode_id).await? {
                Some(script) => Some(check_script(&episode, &script)),
                None => {
                    warn!("⚠️ No script to check for episode {}", episode_id);
                    None
                }
            }
        } else {
            None
        };

        let audio_quality = if options.check_audio {
            match &episode.audio {
                Some(audio) => Some(self.check_audio(&episode, &audio.file_path).await),
                None => {
                    warn!("⚠️ No audio to check for episode {}", episode_id);
                    None
                }
            }
        } else {
            None
        };

        let overall_quality = match (&script_quality, &audio_quality) {
            (Some(script), Some(audio)) => {
                let score = (script.score + audio.score) / 2.0;
                Some(OverallQuality {
                    score,
                    grade: score_to_grade(score).to_string(),
                })
            }
            (Some(section), None) | (None, Some(section)) => Some(OverallQuality {
                score: section.score,
                grade: section.grade.clone(),
            }),
            (None, None) => None,
        };

        let report = QualityReport {
            episode_id: episode_id.to_string(),
            title: episode.title.clone(),
            checked_at: Utc::now(),
            script_quality,
            audio_quality,
            overall_quality,
        };

        self.save_report(&report).await?;
        Ok(report)
    }

    async fn save_report(&self, report: &QualityReport) -> Result<()> {
        let path = self
            .store
            .episode_dir(&report.episode_id)
            .join("quality_check.json");
        let content = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write quality report: {}", path.display()))?;
        info!("📊 Quality check results saved to {}", path.display());
        Ok(())
    }

    async fn check_audio(&self, episode: &Episode, audio_path: &Path) -> SectionReport {
        let mut issues = Vec::new();

        issues.extend(self.check_audio_integrity(audio_path).await);
        issues.extend(self.check_audio_properties(audio_path).await);

        if let Ok(audio) = self.prober.probe(audio_path).await {
            let target_seconds = f64::from(episode.target_duration_minutes * 60);
            let duration = audio.duration.as_secs_f64();
            if duration < target_seconds * 0.5 {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    description: format!(
                        "Episode audio runs {:.1} minutes against a {} minute target",
                        duration / 60.0,
                        episode.target_duration_minutes
                    ),
                    location: Some(audio_path.display().to_string()),
                });
            }
        }

        if let Some(dir) = audio_path.parent() {
            issues.extend(self.check_scene_audio(dir).await);
        }

        issues.sort_by(|a, b| b.severity.cmp(&a.severity));

        let score = score_from_issues(&issues);
        let recommendations = audio_recommendations(&issues);
        SectionReport {
            score,
            grade: score_to_grade(score).to_string(),
            issues,
            recommendations,
        }
    }

    async fn check_audio_integrity(&self, path: &Path) -> Vec<QualityIssue> {
        let mut issues = Vec::new();
        let location = Some(path.display().to_string());

        if !path.exists() {
            issues.push(QualityIssue {
                severity: Severity::Error,
                description: "Audio file does not exist".to_string(),
                location,
            });
            return issues;
        }

        match self.prober.probe(path).await {
            Ok(audio) => {
                let duration = audio.duration.as_secs_f64();
                if duration < 30.0 {
                    issues.push(QualityIssue {
                        severity: Severity::Error,
                        description: format!("Audio file is too short: {:.1} seconds", duration),
                        location: location.clone(),
                    });
                }
                if audio.file_size == 0 {
                    issues.push(QualityIssue {
                        severity: Severity::Error,
                        description: "Audio file is empty (zero bytes)".to_string(),
                        location,
                    });
                }
            }
            Err(e) => {
                issues.push(QualityIssue {
                    severity: Severity::Error,
                    description: format!("Error probing audio file: {}", e),
                    location,
                });
            }
        }

        issues
    }

    async fn check_audio_properties(&self, path: &Path) -> Vec<QualityIssue> {
        let mut issues = Vec::new();
        if !path.exists() {
            return issues;
        }
        let location = Some(path.display().to_string());

        let audio = match self.prober.probe(path).await {
            Ok(audio) => audio,
            Err(e) => {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    description: format!("Error analyzing audio properties: {}", e),
                    location,
                });
                return issues;
            }
        };

        if !matches!(audio.format.as_str(), "mp3" | "aac" | "opus") {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                description: format!("Non-standard audio codec: {}", audio.format),
                location: location.clone(),
            });
        }

        if audio.sample_rate < 44100 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                description: format!("Low sample rate: {} Hz", audio.sample_rate),
                location: location.clone(),
            });
        }

        if audio.channels != 2 {
            issues.push(QualityIssue {
                severity: Severity::Info,
                description: format!("Non-stereo audio: {} channels", audio.channels),
                location: location.clone(),
            });
        }

        let bitrate = audio.bitrate.unwrap_or(0);
        if bitrate < 128_000 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                description: format!("Low bit rate: {} kbps", bitrate / 1000),
                location,
            });
        }

        issues
    }

    async fn check_scene_audio(&self, audio_dir: &Path) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        let mut scene_dirs = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(audio_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if path.is_dir() && name.starts_with("scene_") {
                    scene_dirs.push((name, path));
                }
            }
        }
        scene_dirs.sort();

        if scene_dirs.is_empty() {
            issues.push(QualityIssue {
                severity: Severity::Info,
                description: "No scene audio directories found".to_string(),
                location: Some(audio_dir.display().to_string()),
            });
            return issues;
        }

        for (scene_name, scene_dir) in scene_dirs {
            let scene_audio = scene_dir.join("scene_audio.mp3");
            if !scene_audio.exists() {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    description: format!("Missing scene audio file for {}", scene_name),
                    location: Some(scene_dir.display().to_string()),
                });
                continue;
            }

            for mut issue in self.check_audio_integrity(&scene_audio).await {
                issue.location = Some(format!("{}/scene_audio.mp3", scene_name));
                issues.push(issue);
            }

            let temp_dir = scene_dir.join("temp");
            if temp_dir.is_dir() {
                let mut clips = 0;
                if let Ok(mut entries) = tokio::fs::read_dir(&temp_dir).await {
                    while let Ok(Some(entry)) = entries.next_entry().await {
                        if entry.path().extension().map(|e| e == "mp3").unwrap_or(false) {
                            clips += 1;
                        }
                    }
                }
                if clips == 0 {
                    issues.push(QualityIssue {
                        severity: Severity::Info,
                        description: format!("No voice clips found for {}", scene_name),
                        location: Some(temp_dir.display().to_string()),
                    });
                }
            }
        }

        issues
    }
}

fn check_script(episode: &Episode, script: &Script) -> SectionReport {
    let mut issues = Vec::new();
    issues.extend(check_script_structure(episode, script));
    issues.extend(check_dialogue_quality(script));
    issues.extend(check_pacing(script));

    issues.sort_by(|a, b| b.severity.cmp(&a.severity));

    let score = score_from_issues(&issues);
    let recommendations = script_recommendations(&issues);
    SectionReport {
        score,
        grade: score_to_grade(score).to_string(),
        issues,
        recommendations,
    }
}

fn check_script_structure(episode: &Episode, script: &Script) -> Vec<QualityIssue> {
    let mut issues = Vec::new();

    if episode.beats.is_empty() {
        issues.push(QualityIssue {
            severity: Severity::Warning,
            description: "Episode is missing beat sheet structure".to_string(),
            location: None,
        });
        return issues;
    }

    if script.scenes.is_empty() {
        issues.push(QualityIssue {
            severity: Severity::Error,
            description: "Script has no scenes".to_string(),
            location: None,
        });
        return issues;
    }

    let beat_names: Vec<&str> = episode.beats.iter().map(|b| b.name.as_str()).collect();

    for name in &beat_names {
        if !script.scenes.iter().any(|scene| scene.beat == *name) {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                description: format!("Beat '{}' has no corresponding scenes", name),
                location: None,
            });
        }
    }

    // Beats should land in the same order the beat sheet defines them
    let mut order: Vec<usize> = Vec::new();
    for scene in &script.scenes {
        if let Some(index) = beat_names.iter().position(|name| *name == scene.beat) {
            if !order.contains(&index) {
                order.push(index);
            }
        }
    }
    for pair in order.windows(2) {
        if pair[1] < pair[0] {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                description: format!(
                    "Beat '{}' appears out of sequence in the script",
                    beat_names[pair[1]]
                ),
                location: Some(format!("After scene with beat '{}'", beat_names[pair[0]])),
            });
        }
    }

    if !episode.scenes.is_empty() && script.scenes.len() != episode.scenes.len() {
        issues.push(QualityIssue {
            severity: Severity::Warning,
            description: format!(
                "Script has {} scenes but the episode outline plans {}",
                script.scenes.len(),
                episode.scenes.len()
            ),
            location: None,
        });
    }

    issues
}

fn check_dialogue_quality(script: &Script) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    let mut character_lines: HashMap<&str, usize> = HashMap::new();
    let mut phrase_counts: HashMap<String, Vec<(u32, usize, &str)>> = HashMap::new();

    for scene in &script.scenes {
        for (line_index, line) in scene.lines.iter().enumerate() {
            let (character, content) = match line {
                ScriptLine::Dialogue { character, content } => (character, content),
                _ => continue,
            };

            *character_lines.entry(character.as_str()).or_insert(0) += 1;

            let length = content.chars().count();
            if length < 10 {
                issues.push(QualityIssue {
                    severity: Severity::Info,
                    description: format!("Very short dialogue line for {}", character),
                    location: Some(format!(
                        "Scene {}, line {}",
                        scene.scene_number,
                        line_index + 1
                    )),
                });
            } else if length > 200 {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    description: format!("Very long dialogue line for {}", character),
                    location: Some(format!(
                        "Scene {}, line {}",
                        scene.scene_number,
                        line_index + 1
                    )),
                });
            }

            let words: Vec<&str> = content.split_whitespace().collect();
            for window in words.windows(3) {
                let phrase = window.join(" ").to_lowercase();
                phrase_counts.entry(phrase).or_default().push((
                    scene.scene_number,
                    line_index,
                    character.as_str(),
                ));
            }
        }
    }

    let total_lines: usize = character_lines.values().sum();
    if total_lines > 0 {
        for (character, count) in &character_lines {
            if *count as f64 > total_lines as f64 * 0.5 {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    description: format!(
                        "Character '{}' has disproportionate dialogue ({} lines, {:.1}% of total)",
                        character,
                        count,
                        *count as f64 / total_lines as f64 * 100.0
                    ),
                    location: None,
                });
            } else if *count == 1 {
                issues.push(QualityIssue {
                    severity: Severity::Info,
                    description: format!("Character '{}' has only one line in the script", character),
                    location: None,
                });
            }
        }
    }

    for (phrase, occurrences) in &phrase_counts {
        if occurrences.len() < 3 {
            continue;
        }
        let mut per_character: HashMap<&str, usize> = HashMap::new();
        for (_, _, character) in occurrences {
            *per_character.entry(character).or_insert(0) += 1;
        }
        for (character, count) in per_character {
            if count >= 3 {
                let (scene_number, line_index, _) = occurrences[0];
                issues.push(QualityIssue {
                    severity: Severity::Info,
                    description: format!(
                        "Character '{}' repeats phrase '{}' {} times",
                        character, phrase, count
                    ),
                    location: Some(format!(
                        "First occurrence: Scene {}, line {}",
                        scene_number,
                        line_index + 1
                    )),
                });
            }
        }
    }

    issues
}

fn check_pacing(script: &Script) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    if script.scenes.is_empty() {
        return issues;
    }

    let lengths: Vec<usize> = script.scenes.iter().map(|s| s.lines.len()).collect();
    let average = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;

    for (scene, length) in script.scenes.iter().zip(&lengths) {
        if *length <= 2 {
            issues.push(QualityIssue {
                severity: Severity::Info,
                description: format!("Very short scene with only {} lines", length),
                location: Some(format!("Scene {}", scene.scene_number)),
            });
        }
    }

    for (scene, length) in script.scenes.iter().zip(&lengths) {
        if *length as f64 >= average * 2.0 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                description: format!(
                    "Very long scene with {} lines (average is {:.1})",
                    length, average
                ),
                location: Some(format!("Scene {}", scene.scene_number)),
            });
        }
    }

    for scene in &script.scenes {
        let mut stretch = 0;
        let mut last_break = 0;

        for (line_index, line) in scene.lines.iter().enumerate() {
            if matches!(line, ScriptLine::Dialogue { .. }) {
                stretch += 1;
            } else {
                if stretch >= 6 {
                    issues.push(QualityIssue {
                        severity: Severity::Info,
                        description: format!(
                            "Long stretch of dialogue ({} lines) without action or sound effects",
                            stretch
                        ),
                        location: Some(format!(
                            "Scene {}, lines {}-{}",
                            scene.scene_number,
                            last_break + 1,
                            line_index
                        )),
                    });
                }
                stretch = 0;
                last_break = line_index;
            }
        }

        if stretch >= 6 {
            issues.push(QualityIssue {
                severity: Severity::Info,
                description: format!(
                    "Long stretch of dialogue ({} lines) without action or sound effects",
                    stretch
                ),
                location: Some(format!("Scene {}, at end of scene", scene.scene_number)),
            });
        }
    }

    issues
}

fn score_from_issues(issues: &[QualityIssue]) -> f64 {
    if issues.is_empty() {
        return 10.0;
    }

    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let warnings = issues
        .iter()
        .filter(|i| i.severity == Severity::Warning)
        .count();
    let infos = issues.iter().filter(|i| i.severity == Severity::Info).count();

    let weighted = errors * 5 + warnings * 2 + infos;
    let raw = 10.0 - weighted as f64 / (issues.len() * 2).max(1) as f64;
    raw.clamp(0.0, 10.0)
}

fn score_to_grade(score: f64) -> &'static str {
    if score >= 9.5 {
        "A+"
    } else if score >= 9.0 {
        "A"
    } else if score >= 8.5 {
        "A-"
    } else if score >= 8.0 {
        "B+"
    } else if score >= 7.5 {
        "B"
    } else if score >= 7.0 {
        "B-"
    } else if score >= 6.5 {
        "C+"
    } else if score >= 6.0 {
        "C"
    } else if score >= 5.5 {
        "C-"
    } else if score >= 5.0 {
        "D+"
    } else if score >= 4.0 {
        "D"
    } else {
        "F"
    }
}

fn script_recommendations(issues: &[QualityIssue]) -> Vec<String> {
    let mut recommendations = Vec::new();

    if issues.iter().any(|i| {
        i.description.contains("no corresponding scenes")
            || i.description.contains("out of sequence")
    }) {
        recommendations.push("Revisit the outline so every story beat is covered in order.".to_string());
    }
    if issues
        .iter()
        .any(|i| i.description.contains("disproportionate dialogue"))
    {
        recommendations.push("Distribute dialogue more evenly across the cast.".to_string());
    }
    if issues
        .iter()
        .any(|i| i.description.contains("Long stretch of dialogue"))
    {
        recommendations
            .push("Break up long dialogue runs with narration or sound effects.".to_string());
    }

    recommendations
}

fn audio_recommendations(issues: &[QualityIssue]) -> Vec<String> {
    let mut recommendations = Vec::new();

    if issues.iter().any(|i| i.severity == Severity::Error) {
        recommendations
            .push("Regenerate audio files that have integrity issues to ensure playability.".to_string());
    }
    if issues.iter().any(|i| {
        i.description.contains("sample rate") || i.description.contains("bit rate")
    }) {
        recommendations.push(
            "Increase audio quality settings (sample rate, bit rate) for better sound fidelity."
                .to_string(),
        );
    }
    if issues
        .iter()
        .any(|i| i.description.contains("Missing scene audio"))
    {
        recommendations
            .push("Generate audio for all scenes to ensure complete episode coverage.".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push(
            "Consider normalizing audio levels across all scenes for consistent volume.".to_string(),
        );
    }

    recommendations
}
