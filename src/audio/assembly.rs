use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::ffmpeg::AudioRenderer;
use crate::audio::probe::AudioProber;
use crate::error::PipelineError;

/// Intro music is cut to this length and faded out over its last seconds.
const INTRO_LIMIT_SECONDS: f64 = 15.0;
const INTRO_FADE_START: f64 = 12.0;
const INTRO_FADE_SECONDS: f64 = 3.0;

/// Outro music is cut to this length and faded in.
const OUTRO_LIMIT_SECONDS: f64 = 10.0;
const OUTRO_FADE_SECONDS: f64 = 2.0;

/// Outcome of producing one scene's audio, reported by the scene workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAudioResult {
    pub scene_index: usize,
    pub scene_number: u32,
    pub success: bool,
    pub audio_file: Option<PathBuf>,
    pub duration: f64,
    pub error: Option<String>,
}

impl SceneAudioResult {
    pub fn succeeded(scene_index: usize, scene_number: u32, audio_file: PathBuf, duration: f64) -> Self {
        Self {
            scene_index,
            scene_number,
            success: true,
            audio_file: Some(audio_file),
            duration,
            error: None,
        }
    }

    pub fn failed(scene_index: usize, scene_number: u32, error: String) -> Self {
        Self {
            scene_index,
            scene_number,
            success: false,
            audio_file: None,
            duration: 0.0,
            error: Some(error),
        }
    }
}

/// Ordered segment list for the final episode file.
#[derive(Debug, Clone)]
pub struct EpisodeAssemblyPlan {
    pub segments: Vec<PathBuf>,
    pub scene_count: usize,
}

/// Lay out the episode: intro first when present, scene audio in scene
/// order, outro last when present.
///
/// Worker results arrive in completion order and are re-sorted by
/// `scene_index` here. Failed scenes are skipped; an episode with no valid
/// scene audio cannot be assembled.
pub fn plan_episode_assembly(
    scene_results: &[SceneAudioResult],
    intro: Option<PathBuf>,
    outro: Option<PathBuf>,
) -> Result<EpisodeAssemblyPlan, PipelineError> {
    let mut ordered: Vec<&SceneAudioResult> = scene_results.iter().collect();
    ordered.sort_by_key(|r| r.scene_index);

    let scene_files: Vec<PathBuf> = ordered
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.audio_file.clone())
        .collect();

    if scene_files.is_empty() {
        return Err(PipelineError::NoValidScenes);
    }

    let scene_count = scene_files.len();
    let mut segments = Vec::with_capacity(scene_count + 2);
    if let Some(intro) = intro {
        segments.push(intro);
    }
    segments.extend(scene_files);
    if let Some(outro) = outro {
        segments.push(outro);
    }

    Ok(EpisodeAssemblyPlan {
        segments,
        scene_count,
    })
}

/// Concatenates scene audio into the final episode file and tags it.
#[derive(Debug, Clone, Default)]
pub struct EpisodeAssembler {
    renderer: AudioRenderer,
    prober: AudioProber,
}

impl EpisodeAssembler {
    pub fn new(renderer: AudioRenderer) -> Self {
        Self {
            renderer,
            prober: AudioProber::new(),
        }
    }

    /// Trim intro music to its broadcast length with a fade-out tail.
    pub async fn prepare_intro(&self, source: &Path, work_dir: &Path) -> Result<PathBuf> {
        let output = work_dir.join("intro_final.mp3");
        self.renderer
            .trim_with_fade_out(
                source,
                &output,
                INTRO_LIMIT_SECONDS,
                INTRO_FADE_START,
                INTRO_FADE_SECONDS,
            )
            .await?;
        Ok(output)
    }

    /// Trim outro music to its broadcast length with a fade-in.
    pub async fn prepare_outro(&self, source: &Path, work_dir: &Path) -> Result<PathBuf> {
        let output = work_dir.join("outro_final.mp3");
        self.renderer
            .trim_with_fade_in(source, &output, OUTRO_LIMIT_SECONDS, OUTRO_FADE_SECONDS)
            .await?;
        Ok(output)
    }

    /// Join the planned segments into `output` and tag the result.
    ///
    /// Returns the probed duration of the finished episode.
    pub async fn assemble(
        &self,
        plan: &EpisodeAssemblyPlan,
        work_dir: &Path,
        output: &Path,
        title: &str,
        series: &str,
    ) -> Result<f64> {
        info!(
            "🔧 Assembling episode from {} segments ({} scenes)",
            plan.segments.len(),
            plan.scene_count
        );

        let manifest = work_dir.join("episode_concat.txt");
        self.renderer
            .write_concat_manifest(&manifest, &plan.segments)
            .await?;
        self.renderer.concat_with_manifest(&manifest, output).await?;

        self.renderer
            .tag_metadata(
                output,
                &[
                    ("title", title.to_string()),
                    ("album", series.to_string()),
                    ("artist", "Stardock Podium AI".to_string()),
                    ("comment", "Generated by Stardock Podium".to_string()),
                ],
            )
            .await?;

        let duration = match self.prober.duration_seconds(output).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("⚠️ Could not probe assembled episode: {}", e);
                0.0
            }
        };

        info!("✅ Episode assembled: {} ({:.1}s)", output.display(), duration);
        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(index: usize, file: &str) -> SceneAudioResult {
        SceneAudioResult::succeeded(
            index,
            index as u32 + 1,
            PathBuf::from(format!("/episodes/ep/audio/{}", file)),
            60.0,
        )
    }

    #[test]
    fn test_segments_with_intro_and_outro() {
        let results = vec![
            scene(0, "scene_01/scene_audio.mp3"),
            scene(1, "scene_02/scene_audio.mp3"),
            scene(2, "scene_03/scene_audio.mp3"),
        ];
        let plan = plan_episode_assembly(
            &results,
            Some(PathBuf::from("/work/intro_final.mp3")),
            Some(PathBuf::from("/work/outro_final.mp3")),
        )
        .unwrap();

        assert_eq!(plan.scene_count, 3);
        assert_eq!(
            plan.segments,
            vec![
                PathBuf::from("/work/intro_final.mp3"),
                PathBuf::from("/episodes/ep/audio/scene_01/scene_audio.mp3"),
                PathBuf::from("/episodes/ep/audio/scene_02/scene_audio.mp3"),
                PathBuf::from("/episodes/ep/audio/scene_03/scene_audio.mp3"),
                PathBuf::from("/work/outro_final.mp3"),
            ]
        );
    }

    #[test]
    fn test_segments_without_bumpers() {
        let results = vec![
            scene(0, "scene_01/scene_audio.mp3"),
            scene(1, "scene_02/scene_audio.mp3"),
            scene(2, "scene_03/scene_audio.mp3"),
        ];
        let plan = plan_episode_assembly(&results, None, None).unwrap();

        assert_eq!(
            plan.segments,
            vec![
                PathBuf::from("/episodes/ep/audio/scene_01/scene_audio.mp3"),
                PathBuf::from("/episodes/ep/audio/scene_02/scene_audio.mp3"),
                PathBuf::from("/episodes/ep/audio/scene_03/scene_audio.mp3"),
            ]
        );
    }

    #[test]
    fn test_completion_order_does_not_leak_into_plan() {
        let results = vec![
            scene(2, "scene_03/scene_audio.mp3"),
            scene(0, "scene_01/scene_audio.mp3"),
            scene(1, "scene_02/scene_audio.mp3"),
        ];
        let plan = plan_episode_assembly(&results, None, None).unwrap();

        assert_eq!(
            plan.segments,
            vec![
                PathBuf::from("/episodes/ep/audio/scene_01/scene_audio.mp3"),
                PathBuf::from("/episodes/ep/audio/scene_02/scene_audio.mp3"),
                PathBuf::from("/episodes/ep/audio/scene_03/scene_audio.mp3"),
            ]
        );
    }

    #[test]
    fn test_failed_scenes_are_skipped() {
        let results = vec![
            scene(0, "scene_01/scene_audio.mp3"),
            SceneAudioResult::failed(1, 2, "synthesis failed".to_string()),
            scene(2, "scene_03/scene_audio.mp3"),
        ];
        let plan = plan_episode_assembly(&results, None, None).unwrap();

        assert_eq!(plan.scene_count, 2);
        assert_eq!(plan.segments.len(), 2);
    }

    #[test]
    fn test_no_valid_scenes_is_an_error() {
        let results = vec![SceneAudioResult::failed(0, 1, "boom".to_string())];
        let err = plan_episode_assembly(&results, None, None).unwrap_err();
        assert!(matches!(err, PipelineError::NoValidScenes));

        let err = plan_episode_assembly(&[], None, None).unwrap_err();
        assert!(matches!(err, PipelineError::NoValidScenes));
    }
}
