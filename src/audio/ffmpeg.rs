use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

/// Thin wrapper around ffmpeg for the handful of render operations the
/// pipeline needs.
#[derive(Debug, Clone)]
pub struct AudioRenderer {
    sample_rate: u32,
    channels: u16,
    bitrate: String,
}

impl Default for AudioRenderer {
    fn default() -> Self {
        Self::new(44100, 2, "128k")
    }
}

impl AudioRenderer {
    pub fn new(sample_rate: u32, channels: u16, bitrate: &str) -> Self {
        Self {
            sample_rate,
            channels,
            bitrate: bitrate.to_string(),
        }
    }

    /// Render a stereo silence clip of the given length.
    pub async fn write_silence(&self, output: &Path, seconds: f64) -> Result<()> {
        let source = format!("anullsrc=r={}:cl=stereo", self.sample_rate);
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-f", "lavfi", "-i", &source])
            .args(["-t", &seconds.to_string()])
            .args(["-ar", &self.sample_rate.to_string()])
            .args(["-ac", &self.channels.to_string()])
            .args(["-acodec", "libmp3lame", "-b:a", &self.bitrate, "-y"])
            .arg(output)
            .status()
            .await
            .context("Failed to execute ffmpeg for silence generation")?;

        if !status.success() {
            anyhow::bail!("ffmpeg silence generation exited with status: {}", status);
        }
        Ok(())
    }

    /// Write a concat demuxer manifest, one absolute path per line.
    pub async fn write_concat_manifest(&self, manifest: &Path, files: &[PathBuf]) -> Result<()> {
        let mut lines = String::new();
        for file in files {
            lines.push_str(&format!("file '{}'\n", file.display()));
        }
        tokio::fs::write(manifest, lines)
            .await
            .with_context(|| format!("Failed to write concat manifest: {}", manifest.display()))?;
        Ok(())
    }

    /// Join the files listed in a concat manifest without re-encoding.
    pub async fn concat_with_manifest(&self, manifest: &Path, output: &Path) -> Result<()> {
        debug!("🔧 Concatenating via manifest: {}", manifest.display());
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .args(["-c", "copy", "-y"])
            .arg(output)
            .status()
            .await
            .context("Failed to execute ffmpeg for concatenation")?;

        if !status.success() {
            anyhow::bail!("ffmpeg concatenation exited with status: {}", status);
        }
        Ok(())
    }

    /// Join manifest entries but stop the output at `limit_seconds`.
    pub async fn concat_truncated(
        &self,
        manifest: &Path,
        output: &Path,
        limit_seconds: f64,
    ) -> Result<()> {
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .args(["-t", &limit_seconds.to_string(), "-c", "copy", "-y"])
            .arg(output)
            .status()
            .await
            .context("Failed to execute ffmpeg for truncated concatenation")?;

        if !status.success() {
            anyhow::bail!("ffmpeg truncated concatenation exited with status: {}", status);
        }
        Ok(())
    }

    /// Mix an overlay bed under a primary track.
    ///
    /// Output length follows the primary track; the overlay is weighted by
    /// `overlay_volume`.
    pub async fn mix_tracks(
        &self,
        primary: &Path,
        overlay: &Path,
        output: &Path,
        overlay_volume: f32,
    ) -> Result<()> {
        let filter = format!(
            "amix=inputs=2:duration=first:weights=1 {}",
            overlay_volume
        );
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-i"])
            .arg(primary)
            .arg("-i")
            .arg(overlay)
            .args(["-filter_complex", &filter])
            .args(["-ar", &self.sample_rate.to_string(), "-y"])
            .arg(output)
            .status()
            .await
            .context("Failed to execute ffmpeg for track mixing")?;

        if !status.success() {
            anyhow::bail!("ffmpeg track mixing exited with status: {}", status);
        }
        Ok(())
    }

    /// Re-encode a file at the configured sample rate and channel count.
    pub async fn reencode(&self, input: &Path, output: &Path) -> Result<()> {
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-i"])
            .arg(input)
            .args(["-ar", &self.sample_rate.to_string()])
            .args(["-ac", &self.channels.to_string(), "-y"])
            .arg(output)
            .status()
            .await
            .context("Failed to execute ffmpeg for re-encoding")?;

        if !status.success() {
            anyhow::bail!("ffmpeg re-encoding exited with status: {}", status);
        }
        Ok(())
    }

    /// Cut a track to length and fade it out over its final seconds.
    pub async fn trim_with_fade_out(
        &self,
        input: &Path,
        output: &Path,
        limit_seconds: f64,
        fade_start: f64,
        fade_seconds: f64,
    ) -> Result<()> {
        let fade = format!("afade=t=out:st={}:d={}", fade_start, fade_seconds);
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-i"])
            .arg(input)
            .args(["-t", &limit_seconds.to_string(), "-af", &fade, "-y"])
            .arg(output)
            .status()
            .await
            .context("Failed to execute ffmpeg for fade-out trim")?;

        if !status.success() {
            anyhow::bail!("ffmpeg fade-out trim exited with status: {}", status);
        }
        Ok(())
    }

    /// Cut a track to length and fade it in from silence.
    pub async fn trim_with_fade_in(
        &self,
        input: &Path,
        output: &Path,
        limit_seconds: f64,
        fade_seconds: f64,
    ) -> Result<()> {
        let fade = format!("afade=t=in:st=0:d={}", fade_seconds);
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-i"])
            .arg(input)
            .args(["-t", &limit_seconds.to_string(), "-af", &fade, "-y"])
            .arg(output)
            .status()
            .await
            .context("Failed to execute ffmpeg for fade-in trim")?;

        if !status.success() {
            anyhow::bail!("ffmpeg fade-in trim exited with status: {}", status);
        }
        Ok(())
    }

    /// Rewrite a file in place with the given metadata tags.
    ///
    /// ffmpeg cannot edit in place, so the tagged copy lands next to the
    /// original and is renamed over it once the write succeeds.
    pub async fn tag_metadata(&self, file: &Path, tags: &[(&str, String)]) -> Result<()> {
        let temp = file.with_extension("temp.mp3");

        let mut command = Command::new("ffmpeg");
        command
            .args(["-loglevel", "error", "-i"])
            .arg(file)
            .args(["-c", "copy"]);
        for (key, value) in tags {
            command.arg("-metadata").arg(format!("{}={}", key, value));
        }
        command.arg("-y").arg(&temp);

        let status = command
            .status()
            .await
            .context("Failed to execute ffmpeg for metadata tagging")?;

        if !status.success() {
            anyhow::bail!("ffmpeg metadata tagging exited with status: {}", status);
        }

        tokio::fs::rename(&temp, file)
            .await
            .with_context(|| format!("Failed to replace {} with tagged copy", file.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_concat_manifest_format() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("concat.txt");
        let renderer = AudioRenderer::default();

        let files = vec![
            PathBuf::from("/audio/line_000_narrator.mp3"),
            PathBuf::from("/audio/silence.mp3"),
            PathBuf::from("/audio/line_001_kira.mp3"),
        ];
        renderer
            .write_concat_manifest(&manifest, &files)
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&manifest).await.unwrap();
        assert_eq!(
            contents,
            "file '/audio/line_000_narrator.mp3'\nfile '/audio/silence.mp3'\nfile '/audio/line_001_kira.mp3'\n"
        );
    }
}
