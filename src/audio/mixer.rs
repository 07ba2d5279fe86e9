use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::audio::clip::AudioClip;
use crate::audio::ffmpeg::AudioRenderer;
use crate::audio::probe::AudioProber;
use crate::error::PipelineError;

/// Silence inserted after every clip, including the last one.
const CLIP_GAP_SECONDS: f64 = 0.5;

/// Extra ambience tail beyond the summed clip length.
const AMBIENCE_PAD_SECONDS: f64 = 1.0;

/// Ambience bed for a scene with the loop count needed to cover it.
#[derive(Debug, Clone)]
pub struct AmbienceTrack {
    pub clip: AudioClip,
    pub loop_count: u32,
}

/// Deterministic mixing plan for one scene.
///
/// Clips are ordered by script line, each with its offset in the padded
/// timeline already assigned.
#[derive(Debug, Clone)]
pub struct SceneAudioPlan {
    pub clips: Vec<AudioClip>,
    pub silence_gap: f64,
    pub padded_duration: f64,
    pub ambience_target_duration: f64,
    pub ambience: Option<AmbienceTrack>,
}

/// Build the mixing plan for a scene from its rendered clips.
///
/// Clips arrive in completion order; the plan re-sorts them by `line_index`
/// so the same set of clips always yields the same plan. Clips without a
/// line index go last, keeping their relative arrival order.
pub fn plan_scene_mix(
    clips: Vec<AudioClip>,
    ambience: Option<AudioClip>,
) -> Result<SceneAudioPlan, PipelineError> {
    if clips.is_empty() {
        return Err(PipelineError::NoClips);
    }

    let mut clips = clips;
    clips.sort_by_key(|clip| clip.line_index.unwrap_or(usize::MAX));

    let clip_total: f64 = clips.iter().map(|c| c.duration_seconds).sum();
    let padded_duration = clip_total + CLIP_GAP_SECONDS * clips.len() as f64;
    let ambience_target_duration = clip_total + AMBIENCE_PAD_SECONDS;

    let mut offset = 0.0;
    for clip in &mut clips {
        clip.start_time = offset;
        offset += clip.duration_seconds + CLIP_GAP_SECONDS;
    }

    let ambience = ambience.and_then(|clip| {
        if clip.duration_seconds <= 0.0 {
            warn!(
                "⚠️ Dropping ambience with unreadable duration: {}",
                clip.path.display()
            );
            return None;
        }
        let loop_count = if clip.duration_seconds < ambience_target_duration {
            (ambience_target_duration / clip.duration_seconds) as u32 + 1
        } else {
            1
        };
        Some(AmbienceTrack { clip, loop_count })
    });

    Ok(SceneAudioPlan {
        clips,
        silence_gap: CLIP_GAP_SECONDS,
        padded_duration,
        ambience_target_duration,
        ambience,
    })
}

/// Executes a scene plan with ffmpeg: silence gaps, concatenation, then the
/// optional ambience bed underneath.
#[derive(Debug, Clone, Default)]
pub struct SceneMixer {
    renderer: AudioRenderer,
    prober: AudioProber,
}

impl SceneMixer {
    pub fn new(renderer: AudioRenderer) -> Self {
        Self {
            renderer,
            prober: AudioProber::new(),
        }
    }

    /// Render the plan into `output`, using `work_dir` for intermediates.
    ///
    /// Returns the probed duration of the mixed file. The planning estimate
    /// is never recorded; if the probe fails the duration is reported as
    /// zero.
    pub async fn mix(
        &self,
        plan: &SceneAudioPlan,
        work_dir: &Path,
        output: &Path,
    ) -> Result<f64> {
        tokio::fs::create_dir_all(work_dir)
            .await
            .with_context(|| format!("Failed to create work directory: {}", work_dir.display()))?;

        info!(
            "🎵 Mixing {} clips ({:.1}s padded)",
            plan.clips.len(),
            plan.padded_duration
        );

        let silence = work_dir.join("silence.mp3");
        self.renderer
            .write_silence(&silence, plan.silence_gap)
            .await?;

        let mut sequence = Vec::with_capacity(plan.clips.len() * 2);
        for clip in &plan.clips {
            sequence.push(clip.path.clone());
            sequence.push(silence.clone());
        }

        let manifest = work_dir.join("concat.txt");
        self.renderer
            .write_concat_manifest(&manifest, &sequence)
            .await?;

        let dialogue = work_dir.join("dialogue.mp3");
        self.renderer
            .concat_with_manifest(&manifest, &dialogue)
            .await?;

        match &plan.ambience {
            Some(ambience) if ambience.loop_count > 1 => {
                let loop_manifest = work_dir.join("loop_concat.txt");
                let copies =
                    vec![ambience.clip.path.clone(); ambience.loop_count as usize];
                self.renderer
                    .write_concat_manifest(&loop_manifest, &copies)
                    .await?;

                let looped = work_dir.join("looped_ambience.mp3");
                self.renderer
                    .concat_truncated(&loop_manifest, &looped, plan.ambience_target_duration)
                    .await?;
                self.renderer
                    .mix_tracks(&dialogue, &looped, output, ambience.clip.volume)
                    .await?;
            }
            Some(ambience) => {
                self.renderer
                    .mix_tracks(&dialogue, &ambience.clip.path, output, ambience.clip.volume)
                    .await?;
            }
            None => {
                self.renderer.reencode(&dialogue, output).await?;
            }
        }

        let duration = match self.prober.duration_seconds(output).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("⚠️ Could not probe mixed scene audio: {}", e);
                0.0
            }
        };

        info!("✅ Scene audio mixed: {} ({:.1}s)", output.display(), duration);
        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clip::ClipKind;
    use std::path::PathBuf;

    fn clip(name: &str, duration: f64, line_index: usize) -> AudioClip {
        AudioClip::new(
            PathBuf::from(format!("/scene/{}", name)),
            ClipKind::Dialogue,
            duration,
        )
        .with_line_index(line_index)
    }

    fn ambience(duration: f64) -> AudioClip {
        AudioClip::new(
            PathBuf::from("/assets/ambience/bridge.mp3"),
            ClipKind::Ambience,
            duration,
        )
    }

    #[test]
    fn test_empty_scene_is_rejected() {
        let err = plan_scene_mix(Vec::new(), None).unwrap_err();
        assert!(matches!(err, PipelineError::NoClips));
    }

    #[test]
    fn test_padded_and_ambience_durations() {
        let clips = vec![
            clip("a.mp3", 3.0, 0),
            clip("b.mp3", 4.0, 1),
            clip("c.mp3", 2.0, 2),
            clip("d.mp3", 5.0, 3),
            clip("e.mp3", 3.0, 4),
        ];
        let plan = plan_scene_mix(clips, None).unwrap();

        assert_eq!(plan.padded_duration, 19.5);
        assert_eq!(plan.ambience_target_duration, 18.0);
        assert_eq!(plan.silence_gap, 0.5);
    }

    #[test]
    fn test_clips_sorted_by_line_index() {
        let clips = vec![
            clip("late.mp3", 2.0, 2),
            clip("first.mp3", 3.0, 0),
            clip("middle.mp3", 1.0, 1),
        ];
        let plan = plan_scene_mix(clips, None).unwrap();

        let order: Vec<Option<usize>> = plan.clips.iter().map(|c| c.line_index).collect();
        assert_eq!(order, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(plan.clips[0].start_time, 0.0);
        assert_eq!(plan.clips[1].start_time, 3.5);
        assert_eq!(plan.clips[2].start_time, 5.0);
    }

    #[test]
    fn test_plan_is_invariant_under_arrival_order() {
        let ordered = vec![
            clip("a.mp3", 3.0, 0),
            clip("b.mp3", 4.0, 1),
            clip("c.mp3", 2.0, 2),
        ];
        let shuffled = vec![
            clip("c.mp3", 2.0, 2),
            clip("a.mp3", 3.0, 0),
            clip("b.mp3", 4.0, 1),
        ];

        let plan_a = plan_scene_mix(ordered, None).unwrap();
        let plan_b = plan_scene_mix(shuffled, None).unwrap();

        assert_eq!(plan_a.padded_duration, plan_b.padded_duration);
        let paths_a: Vec<&PathBuf> = plan_a.clips.iter().map(|c| &c.path).collect();
        let paths_b: Vec<&PathBuf> = plan_b.clips.iter().map(|c| &c.path).collect();
        assert_eq!(paths_a, paths_b);
        for (a, b) in plan_a.clips.iter().zip(&plan_b.clips) {
            assert_eq!(a.start_time, b.start_time);
        }
    }

    #[test]
    fn test_unindexed_clips_go_last_in_arrival_order() {
        let clips = vec![
            AudioClip::new(PathBuf::from("/scene/fx_a.mp3"), ClipKind::SoundEffect, 1.0),
            clip("line.mp3", 2.0, 0),
            AudioClip::new(PathBuf::from("/scene/fx_b.mp3"), ClipKind::SoundEffect, 1.0),
        ];
        let plan = plan_scene_mix(clips, None).unwrap();

        assert_eq!(plan.clips[0].path, PathBuf::from("/scene/line.mp3"));
        assert_eq!(plan.clips[1].path, PathBuf::from("/scene/fx_a.mp3"));
        assert_eq!(plan.clips[2].path, PathBuf::from("/scene/fx_b.mp3"));
    }

    #[test]
    fn test_short_ambience_loops_past_target() {
        let clips = vec![
            clip("a.mp3", 3.0, 0),
            clip("b.mp3", 4.0, 1),
            clip("c.mp3", 2.0, 2),
            clip("d.mp3", 5.0, 3),
            clip("e.mp3", 3.0, 4),
        ];
        let plan = plan_scene_mix(clips, Some(ambience(5.0))).unwrap();

        let track = plan.ambience.unwrap();
        assert_eq!(track.loop_count, 4);
        assert!(track.loop_count as f64 * track.clip.duration_seconds >= 18.0);
    }

    #[test]
    fn test_long_ambience_plays_once() {
        let clips = vec![clip("a.mp3", 3.0, 0)];
        let plan = plan_scene_mix(clips, Some(ambience(30.0))).unwrap();
        assert_eq!(plan.ambience.unwrap().loop_count, 1);
    }

    #[test]
    fn test_exactly_divisible_ambience_still_adds_a_loop() {
        let clips = vec![
            clip("a.mp3", 3.0, 0),
            clip("b.mp3", 4.0, 1),
            clip("c.mp3", 2.0, 2),
            clip("d.mp3", 5.0, 3),
            clip("e.mp3", 3.0, 4),
        ];
        let plan = plan_scene_mix(clips, Some(ambience(9.0))).unwrap();
        assert_eq!(plan.ambience.unwrap().loop_count, 3);
    }

    #[test]
    fn test_unreadable_ambience_is_dropped() {
        let clips = vec![clip("a.mp3", 3.0, 0)];
        let plan = plan_scene_mix(clips, Some(ambience(0.0))).unwrap();
        assert!(plan.ambience.is_none());
    }
}
