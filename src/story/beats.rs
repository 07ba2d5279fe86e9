use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One entry in the narrative beat template.
///
/// `percentage` is the beat's center position in the story (0.0 to 1.0) and
/// `duration_factor` is the fraction of total runtime the beat occupies.
#[derive(Debug, Clone, Copy)]
pub struct BeatTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub percentage: f64,
    pub duration_factor: f64,
}

/// Save the Cat beat sheet with duration factors balanced to cover the full
/// episode runtime.
pub const BEAT_SHEET: &[BeatTemplate] = &[
    BeatTemplate {
        name: "Opening Image",
        description: "Sets the tone, mood, and style. Gives a snapshot of the starting world and its problems.",
        percentage: 0.01,
        duration_factor: 0.02,
    },
    BeatTemplate {
        name: "Theme Stated",
        description: "The message or thematic premise - what the story is really about.",
        percentage: 0.05,
        duration_factor: 0.02,
    },
    BeatTemplate {
        name: "Setup",
        description: "Introduces the main characters, their habits, and their world.",
        percentage: 0.10,
        duration_factor: 0.08,
    },
    BeatTemplate {
        name: "Catalyst",
        description: "The inciting incident or call to adventure that disrupts the status quo.",
        percentage: 0.15,
        duration_factor: 0.03,
    },
    BeatTemplate {
        name: "Debate",
        description: "The protagonist questions whether to pursue the journey or goal.",
        percentage: 0.20,
        duration_factor: 0.09,
    },
    BeatTemplate {
        name: "Break into Two",
        description: "The protagonist makes the decision to take on the journey.",
        percentage: 0.25,
        duration_factor: 0.03,
    },
    BeatTemplate {
        name: "B Story",
        description: "A secondary story or relationship that carries the theme of the story.",
        percentage: 0.30,
        duration_factor: 0.05,
    },
    BeatTemplate {
        name: "Fun and Games",
        description: "The promise of the premise is explored. The enjoyable part of the story.",
        percentage: 0.40,
        duration_factor: 0.18,
    },
    BeatTemplate {
        name: "Midpoint",
        description: "A false victory or false defeat. Stakes are raised, and the goal is less attainable.",
        percentage: 0.50,
        duration_factor: 0.04,
    },
    BeatTemplate {
        name: "Bad Guys Close In",
        description: "Antagonistic forces regroup and close in on the protagonist.",
        percentage: 0.60,
        duration_factor: 0.11,
    },
    BeatTemplate {
        name: "All Is Lost",
        description: "The lowest point where it seems the goal is impossible to achieve.",
        percentage: 0.70,
        duration_factor: 0.03,
    },
    BeatTemplate {
        name: "Dark Night of the Soul",
        description: "The protagonist must make a final decision based on what they've learned.",
        percentage: 0.75,
        duration_factor: 0.07,
    },
    BeatTemplate {
        name: "Break into Three",
        description: "The protagonist figures out the solution and commits to the final push.",
        percentage: 0.80,
        duration_factor: 0.03,
    },
    BeatTemplate {
        name: "Finale",
        description: "The protagonist proves they've changed and succeeds (or fails tragically).",
        percentage: 0.85,
        duration_factor: 0.18,
    },
    BeatTemplate {
        name: "Final Image",
        description: "Shows how the world has changed, often mirroring the opening image.",
        percentage: 0.98,
        duration_factor: 0.04,
    },
];

/// Minimum and maximum scene counts for an episode regardless of runtime.
const MIN_SCENES: u32 = 5;
const MAX_SCENES: u32 = 15;

/// Seconds of runtime that justify one scene.
const SECONDS_PER_SCENE: u32 = 150;

/// A beat with its timing resolved against a concrete episode runtime.
///
/// `start_time` and `end_time` are centered on the beat's percentage position
/// and may fall before zero or past the episode end for beats near the edges.
/// They are kept as written so downstream pacing checks see the true window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedBeat {
    pub name: String,
    pub description: String,
    pub duration_seconds: u32,
    pub start_time: i64,
    pub end_time: i64,
}

/// Check that a beat template's duration factors account for the whole
/// runtime, within one percent.
pub fn validate_template(template: &[BeatTemplate]) -> Result<(), PipelineError> {
    if template.is_empty() {
        return Err(PipelineError::Configuration(
            "beat template is empty".to_string(),
        ));
    }

    let factor_sum: f64 = template.iter().map(|b| b.duration_factor).sum();
    if (factor_sum - 1.0).abs() > 0.01 {
        return Err(PipelineError::Configuration(format!(
            "beat duration factors sum to {:.4}, expected 1.0",
            factor_sum
        )));
    }

    Ok(())
}

/// Resolve the beat sheet against a target episode length.
pub fn resolve_beats(target_minutes: u32) -> Result<Vec<ResolvedBeat>, PipelineError> {
    resolve_with_template(BEAT_SHEET, target_minutes * 60)
}

fn resolve_with_template(
    template: &[BeatTemplate],
    total_seconds: u32,
) -> Result<Vec<ResolvedBeat>, PipelineError> {
    validate_template(template)?;

    let total = total_seconds as f64;
    let beats = template
        .iter()
        .map(|beat| {
            let half = beat.duration_factor / 2.0;
            ResolvedBeat {
                name: beat.name.to_string(),
                description: beat.description.to_string(),
                duration_seconds: (total * beat.duration_factor).floor() as u32,
                start_time: (total * (beat.percentage - half)).floor() as i64,
                end_time: (total * (beat.percentage + half)).floor() as i64,
            }
        })
        .collect();

    Ok(beats)
}

/// How many scenes an episode of the given length should have.
pub fn target_scene_count(total_seconds: u32) -> u32 {
    (total_seconds / SECONDS_PER_SCENE).clamp(MIN_SCENES, MAX_SCENES)
}

/// Split a scene budget across resolved beats, proportional to beat duration.
///
/// Every beat gets at least one scene, so the allocated total can exceed the
/// target for short episodes. Returned in template order.
pub fn allocate_scene_counts(
    beats: &[ResolvedBeat],
    total_seconds: u32,
    target_scenes: u32,
) -> Vec<(String, u32)> {
    let total = total_seconds as f64;
    beats
        .iter()
        .map(|beat| {
            let share = beat.duration_seconds as f64 / total;
            let count = ((share * target_scenes as f64).floor() as u32).max(1);
            (beat.name.clone(), count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_sheet_is_valid() {
        validate_template(BEAT_SHEET).unwrap();
        assert_eq!(BEAT_SHEET.len(), 15);
        assert_eq!(BEAT_SHEET[0].name, "Opening Image");
        assert_eq!(BEAT_SHEET[14].name, "Final Image");
    }

    #[test]
    fn test_unbalanced_template_rejected() {
        let template = [
            BeatTemplate {
                name: "Opening Image",
                description: "d",
                percentage: 0.01,
                duration_factor: 0.30,
            },
            BeatTemplate {
                name: "Finale",
                description: "d",
                percentage: 0.85,
                duration_factor: 0.44,
            },
        ];
        let err = validate_template(&template).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("0.74"));
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(validate_template(&[]).is_err());
    }

    #[test]
    fn test_durations_cover_thirty_minute_episode() {
        let beats = resolve_beats(30).unwrap();
        assert_eq!(beats.len(), 15);

        let total: u32 = beats.iter().map(|b| b.duration_seconds).sum();
        assert_eq!(total, 1800);

        let expected = [36, 36, 144, 54, 162, 54, 90, 324, 72, 198, 54, 126, 54, 324, 72];
        for (beat, want) in beats.iter().zip(expected) {
            assert_eq!(beat.duration_seconds, want, "beat {}", beat.name);
        }
    }

    #[test]
    fn test_durations_cover_fifteen_minute_episode() {
        let beats = resolve_beats(15).unwrap();
        let total: u32 = beats.iter().map(|b| b.duration_seconds).sum();
        assert_eq!(total, 900);
    }

    #[test]
    fn test_setup_window_at_thirty_minutes() {
        let beats = resolve_beats(30).unwrap();
        let setup = beats.iter().find(|b| b.name == "Setup").unwrap();
        assert_eq!(setup.duration_seconds, 144);
        assert_eq!(setup.start_time, 108);
        assert_eq!(setup.end_time, 252);
    }

    #[test]
    fn test_edge_windows_are_not_clamped() {
        let template = [
            BeatTemplate {
                name: "Cold Open",
                description: "d",
                percentage: 0.0,
                duration_factor: 0.27,
            },
            BeatTemplate {
                name: "Middle",
                description: "d",
                percentage: 0.5,
                duration_factor: 0.43,
            },
            BeatTemplate {
                name: "Closer",
                description: "d",
                percentage: 0.9,
                duration_factor: 0.30,
            },
        ];
        let beats = resolve_with_template(&template, 100).unwrap();

        assert_eq!(beats[0].start_time, -14);
        assert_eq!(beats[2].end_time, 105);
    }

    #[test]
    fn test_scene_count_clamps() {
        assert_eq!(target_scene_count(600), 5);
        assert_eq!(target_scene_count(1800), 12);
        assert_eq!(target_scene_count(3000), 15);
    }

    #[test]
    fn test_scene_allocation_keeps_template_order() {
        let beats = resolve_beats(30).unwrap();
        let counts = allocate_scene_counts(&beats, 1800, target_scene_count(1800));

        assert_eq!(counts.len(), 15);
        for ((name, _), beat) in counts.iter().zip(&beats) {
            assert_eq!(name, &beat.name);
        }
    }

    #[test]
    fn test_scene_allocation_minimum_one_per_beat() {
        let beats = resolve_beats(30).unwrap();
        let counts = allocate_scene_counts(&beats, 1800, 12);

        assert!(counts.iter().all(|(_, n)| *n >= 1));
        let total: u32 = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 17);

        let fun_and_games = counts.iter().find(|(n, _)| n == "Fun and Games").unwrap();
        assert_eq!(fun_and_games.1, 2);
        let finale = counts.iter().find(|(n, _)| n == "Finale").unwrap();
        assert_eq!(finale.1, 2);
    }
}
