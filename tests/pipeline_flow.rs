//! Planning flow across the crate seams: a thirty minute episode goes from
//! beat timeline to allocated scenes, gets its script stored on disk, has
//! scene mixes and the final assembly planned, and passes a quality check.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use stardock_podium::audio::{
    plan_episode_assembly, plan_scene_mix, AudioClip, ClipKind, SceneAudioResult,
};
use stardock_podium::error::PipelineError;
use stardock_podium::quality::{CheckOptions, QualityChecker};
use stardock_podium::store::{
    Character, Episode, EpisodeStatus, EpisodeStore, Scene, Script, ScriptLine, ScriptScene,
};
use stardock_podium::story::beats::{allocate_scene_counts, resolve_beats, target_scene_count};
use stardock_podium::story::BEAT_SHEET;

const TARGET_MINUTES: u32 = 30;

fn crew() -> Vec<Character> {
    vec![
        Character {
            character_id: "char_0001".to_string(),
            name: "Sela Vash".to_string(),
            species: Some("Human".to_string()),
            role: Some("commander".to_string()),
            personality: None,
            backstory: None,
            voice_description: Some("calm measured alto".to_string()),
        },
        Character {
            character_id: "char_0002".to_string(),
            name: "Elan Ryn".to_string(),
            species: Some("Trill".to_string()),
            role: Some("science officer".to_string()),
            personality: None,
            backstory: None,
            voice_description: Some("bright curious tenor".to_string()),
        },
    ]
}

/// Episode with one planned scene per allocated slot, in beat order.
fn planned_episode() -> Episode {
    let beats = resolve_beats(TARGET_MINUTES).unwrap();
    let total_seconds = TARGET_MINUTES * 60;
    let allocation =
        allocate_scene_counts(&beats, total_seconds, target_scene_count(total_seconds));

    let mut scenes = Vec::new();
    let mut scene_number = 0;
    for (beat_name, count) in &allocation {
        for _ in 0..*count {
            scene_number += 1;
            scenes.push(Scene {
                scene_id: format!("scene_{:04}", scene_number),
                scene_number,
                beat: beat_name.clone(),
                duration_seconds: 60,
                setting: Some("USS Meridian - Main Bridge".to_string()),
                characters: vec!["Sela Vash".to_string(), "Elan Ryn".to_string()],
                plot: None,
                dialogue: None,
                atmosphere: Some("tense".to_string()),
                sound_effects: None,
                content: None,
            });
        }
    }

    Episode {
        episode_id: "ep_flow0001".to_string(),
        title: "Signals in the Dark".to_string(),
        series: "Frontier Tales".to_string(),
        episode_number: 1,
        theme: Some("first contact".to_string()),
        created_at: Utc::now(),
        target_duration_minutes: TARGET_MINUTES,
        status: EpisodeStatus::Draft,
        beats,
        characters: crew(),
        scenes,
        audio: None,
    }
}

/// Script matching the planned scenes, with balanced dialogue.
fn script_for(episode: &Episode) -> Script {
    let scenes = episode
        .scenes
        .iter()
        .enumerate()
        .map(|(i, scene)| ScriptScene {
            scene_number: scene.scene_number,
            beat: scene.beat.clone(),
            setting: scene.setting.clone(),
            lines: vec![
                ScriptLine::Narration {
                    content: format!("The bridge hums while the crew studies signal {}.", i + 1),
                },
                ScriptLine::Dialogue {
                    character: "Sela Vash".to_string(),
                    content: format!("Course {} laid in.", i + 1),
                },
                ScriptLine::Dialogue {
                    character: "Elan Ryn".to_string(),
                    content: format!("Reading band {} now.", i + 1),
                },
            ],
        })
        .collect();

    Script {
        title: episode.title.clone(),
        episode_id: episode.episode_id.clone(),
        generated_at: Utc::now(),
        scenes,
    }
}

#[tokio::test]
async fn test_planned_episode_survives_store_restart() {
    let temp_dir = TempDir::new().unwrap();
    let episodes_dir = temp_dir.path().join("episodes");
    let store = Arc::new(EpisodeStore::new(&episodes_dir).await.unwrap());

    let episode = planned_episode();

    assert_eq!(episode.beats.len(), BEAT_SHEET.len());
    let covered: HashSet<&str> = episode.scenes.iter().map(|s| s.beat.as_str()).collect();
    assert_eq!(covered.len(), BEAT_SHEET.len());

    // Floor rounding loses at most one second per beat
    let planned_seconds: u32 = episode.beats.iter().map(|b| b.duration_seconds).sum();
    let total_seconds = TARGET_MINUTES * 60;
    assert!(planned_seconds <= total_seconds);
    assert!(total_seconds - planned_seconds <= episode.beats.len() as u32);

    store.save(&episode).await.unwrap();
    store.save_script(&script_for(&episode)).await.unwrap();

    let reopened = EpisodeStore::new(&episodes_dir).await.unwrap();
    let loaded = reopened.get(&episode.episode_id).await.unwrap();
    assert_eq!(loaded.title, episode.title);
    assert_eq!(loaded.scenes.len(), episode.scenes.len());
    assert_eq!(loaded.beats.len(), episode.beats.len());

    let loaded_script = reopened
        .get_script(&episode.episode_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded_script.scenes.len(), episode.scenes.len());
}

#[test]
fn test_scene_mix_plan_ignores_clip_arrival_order() {
    let durations = [3.0, 4.0, 2.0, 5.0, 3.0];
    let clips = |order: &[usize]| -> Vec<AudioClip> {
        order
            .iter()
            .map(|&i| {
                AudioClip::new(
                    PathBuf::from(format!("line_{:03}.mp3", i)),
                    ClipKind::Dialogue,
                    durations[i],
                )
                .with_line_index(i)
            })
            .collect()
    };

    let forward = plan_scene_mix(clips(&[0, 1, 2, 3, 4]), None).unwrap();
    let shuffled = plan_scene_mix(clips(&[3, 0, 4, 1, 2]), None).unwrap();

    assert_eq!(forward.padded_duration, 19.5);
    assert_eq!(forward.ambience_target_duration, 18.0);
    assert_eq!(shuffled.padded_duration, forward.padded_duration);

    let forward_order: Vec<_> = forward.clips.iter().map(|c| c.line_index).collect();
    let shuffled_order: Vec<_> = shuffled.clips.iter().map(|c| c.line_index).collect();
    assert_eq!(forward_order, shuffled_order);

    let forward_starts: Vec<_> = forward.clips.iter().map(|c| c.start_time).collect();
    let shuffled_starts: Vec<_> = shuffled.clips.iter().map(|c| c.start_time).collect();
    assert_eq!(forward_starts, shuffled_starts);
}

#[test]
fn test_assembly_skips_failures_and_orders_segments() {
    let results = vec![
        SceneAudioResult::succeeded(2, 3, PathBuf::from("scene_02/scene_audio.mp3"), 40.0),
        SceneAudioResult::failed(1, 2, "scene has no audio clips to mix".to_string()),
        SceneAudioResult::succeeded(0, 1, PathBuf::from("scene_00/scene_audio.mp3"), 55.0),
    ];

    let plan = plan_episode_assembly(
        &results,
        Some(PathBuf::from("intro_final.mp3")),
        Some(PathBuf::from("outro_final.mp3")),
    )
    .unwrap();

    assert_eq!(plan.scene_count, 2);
    assert_eq!(
        plan.segments,
        vec![
            PathBuf::from("intro_final.mp3"),
            PathBuf::from("scene_00/scene_audio.mp3"),
            PathBuf::from("scene_02/scene_audio.mp3"),
            PathBuf::from("outro_final.mp3"),
        ]
    );

    let bare = plan_episode_assembly(&results, None, None).unwrap();
    assert_eq!(
        bare.segments,
        vec![
            PathBuf::from("scene_00/scene_audio.mp3"),
            PathBuf::from("scene_02/scene_audio.mp3"),
        ]
    );

    let all_failed = vec![SceneAudioResult::failed(0, 1, "offline".to_string())];
    assert!(matches!(
        plan_episode_assembly(&all_failed, None, None),
        Err(PipelineError::NoValidScenes)
    ));
}

#[tokio::test]
async fn test_stored_episode_passes_script_quality() {
    let temp_dir = TempDir::new().unwrap();
    let episodes_dir = temp_dir.path().join("episodes");
    let store = Arc::new(EpisodeStore::new(&episodes_dir).await.unwrap());

    let episode = planned_episode();
    store.save(&episode).await.unwrap();
    store.save_script(&script_for(&episode)).await.unwrap();

    let checker = QualityChecker::new(Arc::clone(&store));
    let options = CheckOptions {
        check_script: true,
        check_audio: false,
    };
    let report = checker
        .check_episode(&episode.episode_id, options)
        .await
        .unwrap();

    let script_quality = report.script_quality.unwrap();
    assert!(script_quality.issues.is_empty());
    assert_eq!(script_quality.score, 10.0);
    assert_eq!(script_quality.grade, "A+");
    assert!(report.audio_quality.is_none());
    assert_eq!(report.overall_quality.unwrap().grade, "A+");

    let report_file = episodes_dir
        .join(&episode.episode_id)
        .join("quality_check.json");
    assert!(report_file.exists());
}
