use thiserror::Error;

/// Failure taxonomy for episode production.
///
/// Per-scene failures are recoverable and become `success: false` results at
/// the worker boundary; episode-level failures propagate to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed beat template or configuration, detected at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A scene produced zero usable line clips.
    #[error("scene has no audio clips to mix")]
    NoClips,

    /// No scene produced valid audio, so the episode cannot be assembled.
    #[error("no valid scene audio files to assemble")]
    NoValidScenes,

    /// The media probe could not read a produced file.
    #[error("media probe failed: {0}")]
    Probe(String),
}

impl PipelineError {
    /// Whether the failure is scoped to a single scene rather than the episode.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::NoClips | PipelineError::Probe(_))
    }
}
