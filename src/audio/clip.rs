use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a clip contributes to the scene mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Dialogue,
    Narration,
    SoundEffect,
    Ambience,
}

impl ClipKind {
    /// Relative mix level used when a clip carries no explicit volume.
    pub fn default_volume(&self) -> f32 {
        match self {
            ClipKind::Dialogue => 1.0,
            ClipKind::Narration => 1.0,
            ClipKind::SoundEffect => 1.2,
            ClipKind::Ambience => 0.3,
        }
    }
}

/// A rendered audio file waiting to be mixed into a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    pub path: PathBuf,
    pub kind: ClipKind,
    pub duration_seconds: f64,
    /// Offset within the scene timeline, assigned during mix planning.
    pub start_time: f64,
    pub character: Option<String>,
    /// Position of the originating script line. Clips without one sort last.
    pub line_index: Option<usize>,
    pub volume: f32,
}

impl AudioClip {
    pub fn new(path: PathBuf, kind: ClipKind, duration_seconds: f64) -> Self {
        Self {
            path,
            kind,
            duration_seconds,
            start_time: 0.0,
            character: None,
            line_index: None,
            volume: kind.default_volume(),
        }
    }

    pub fn with_line_index(mut self, index: usize) -> Self {
        self.line_index = Some(index);
        self
    }

    pub fn with_character(mut self, character: &str) -> Self {
        self.character = Some(character.to_string());
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }
}
