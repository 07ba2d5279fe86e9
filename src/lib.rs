/// Stardock Podium - AI Podcast Generator
///
/// Story-driven podcast episode generation: beat sheet planning, script
/// and character generation, voice synthesis, and audio assembly.

pub mod audio;
pub mod config;
pub mod error;
pub mod ids;
pub mod library;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod quality;
pub mod store;
pub mod story;
pub mod tts;

// Re-export main types for easy access
pub use crate::audio::{AudioInfo, AudioProber, AudioRenderer};
pub use crate::config::Config;
pub use crate::error::PipelineError;
pub use crate::library::{BookInfo, BookLibrary};
pub use crate::llm::{create_llm, LLMConfig, LLMProvider};
pub use crate::memory::{MemoryClient, MemoryConfig, ReferenceSync};
pub use crate::pipeline::{AudioPipeline, GenerationReport};
pub use crate::quality::{CheckOptions, QualityChecker, QualityReport};
pub use crate::store::{Episode, EpisodeStore, Script};
pub use crate::story::{EpisodeRequest, StoryBuilder};
pub use crate::tts::{ElevenLabsSynthesizer, NewVoice, VoiceRegistry};
