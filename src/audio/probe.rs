use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::PipelineError;

/// Technical details of an audio file as reported by ffprobe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    pub path: PathBuf,
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: String,
    pub bitrate: Option<u32>,
    pub file_size: u64,
}

/// Reads media properties of produced files via ffprobe.
///
/// Probed values are the source of truth for recorded durations; estimates
/// from mix planning are never written back into episode metadata.
#[derive(Debug, Clone, Default)]
pub struct AudioProber;

impl AudioProber {
    pub fn new() -> Self {
        Self
    }

    /// Probe a file's first audio stream.
    pub async fn probe(&self, path: &Path) -> Result<AudioInfo, PipelineError> {
        debug!("🔍 Probing audio file: {}", path.display());

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "a:0",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| PipelineError::Probe(format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(PipelineError::Probe(format!(
                "ffprobe exited with status {} for {}",
                output.status,
                path.display()
            )));
        }

        let probe: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| PipelineError::Probe(format!("invalid ffprobe output: {}", e)))?;

        let streams = probe
            .get("streams")
            .and_then(|s| s.as_array())
            .cloned()
            .unwrap_or_default();
        if streams.is_empty() {
            return Err(PipelineError::Probe(format!(
                "no audio stream in {}",
                path.display()
            )));
        }
        let stream = &streams[0];

        let format = probe
            .get("format")
            .ok_or_else(|| PipelineError::Probe("missing format section".to_string()))?;

        let duration_seconds = format
            .get("duration")
            .and_then(|d| d.as_str())
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let sample_rate = stream
            .get("sample_rate")
            .and_then(|v| v.as_str())
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        let channels = stream
            .get("channels")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u16;

        let codec = stream
            .get("codec_name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        let bitrate = format
            .get("bit_rate")
            .and_then(|v| v.as_str())
            .and_then(|v| v.parse::<u32>().ok());

        let file_size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);

        Ok(AudioInfo {
            path: path.to_path_buf(),
            duration: Duration::from_secs_f64(duration_seconds.max(0.0)),
            sample_rate,
            channels,
            format: codec,
            bitrate,
            file_size,
        })
    }

    /// Convenience wrapper that probes only the stream duration.
    pub async fn duration_seconds(&self, path: &Path) -> Result<f64, PipelineError> {
        let info = self.probe(path).await?;
        Ok(info.duration.as_secs_f64())
    }
}
