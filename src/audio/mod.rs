pub mod assembly;
pub mod clip;
pub mod ffmpeg;
pub mod mixer;
pub mod probe;

pub use assembly::{plan_episode_assembly, EpisodeAssembler, EpisodeAssemblyPlan, SceneAudioResult};
pub use clip::{AudioClip, ClipKind};
pub use ffmpeg::AudioRenderer;
pub use mixer::{plan_scene_mix, AmbienceTrack, SceneAudioPlan, SceneMixer};
pub use probe::{AudioInfo, AudioProber};
