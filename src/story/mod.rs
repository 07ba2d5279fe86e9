//! Story generation: beat timelines, outline and script parsing, and the
//! LLM-driven structure builder.

pub mod beats;
pub mod parser;
pub mod structure;

pub use beats::{resolve_beats, ResolvedBeat, BEAT_SHEET};
pub use parser::SceneOutline;
pub use structure::{EpisodeRequest, StoryBuilder};
