//! Media-extraction engine.
//!
//! The engine owns a private scratch directory. Callers address files in it
//! by bare name only: write an input, execute a trim, read the output,
//! delete both. Nothing outside the scratch directory is touched.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use cliprelay_common::config::ExtractionConfig;
use cliprelay_common::error::{RelayError, RelayResult};

use crate::keyframes::parse_keyframe_times;

/// Interface to a media-extraction backend.
#[async_trait::async_trait]
pub trait MediaEngine: Send {
    /// Bring the engine up. Idempotent.
    async fn start(&mut self) -> RelayResult<()>;

    fn is_running(&self) -> bool;

    /// Store `data` under `name` in the engine's file space.
    async fn write_input(&mut self, name: &str, data: &[u8]) -> RelayResult<()>;

    /// Run one ffmpeg-style command. Arguments reference engine files by name.
    async fn execute(&mut self, args: &[String]) -> RelayResult<()>;

    async fn read_output(&mut self, name: &str) -> RelayResult<Vec<u8>>;

    async fn delete_file(&mut self, name: &str) -> RelayResult<()>;

    /// Keyframe times (seconds) of the first video stream of `name`.
    async fn keyframes(&mut self, name: &str) -> RelayResult<Vec<f64>>;

    /// Release the engine and everything in its file space.
    async fn shutdown(&mut self) -> RelayResult<()>;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Engine backed by the `ffmpeg`/`ffprobe` binaries.
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    scratch: Option<tempfile::TempDir>,
}

impl FfmpegEngine {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            scratch: None,
        }
    }

    /// Scratch directory while running.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|dir| dir.path())
    }

    fn resolve(&self, name: &str) -> RelayResult<PathBuf> {
        let dir = self
            .scratch_dir()
            .ok_or_else(|| RelayError::engine("Engine not started"))?;
        validate_file_name(name)?;
        Ok(dir.join(name))
    }
}

#[async_trait::async_trait]
impl MediaEngine for FfmpegEngine {
    async fn start(&mut self) -> RelayResult<()> {
        if self.scratch.is_some() {
            return Ok(());
        }

        let version = binary_version(&self.ffmpeg_path).await.ok_or_else(|| {
            RelayError::engine(format!(
                "ffmpeg not available at {}",
                self.ffmpeg_path.display()
            ))
        })?;

        let scratch = tempfile::Builder::new()
            .prefix("cliprelay-engine-")
            .tempdir()
            .map_err(|e| RelayError::engine(format!("Failed to create scratch dir: {e}")))?;

        tracing::info!(
            version = %version,
            scratch = %scratch.path().display(),
            "Media engine started"
        );
        self.scratch = Some(scratch);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.scratch.is_some()
    }

    async fn write_input(&mut self, name: &str, data: &[u8]) -> RelayResult<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, data).await.map_err(|e| {
            RelayError::engine(format!("Failed to write {}: {e}", path.display()))
        })?;
        tracing::debug!(name, bytes = data.len(), "Engine input written");
        Ok(())
    }

    async fn execute(&mut self, args: &[String]) -> RelayResult<()> {
        let dir = self
            .scratch_dir()
            .ok_or_else(|| RelayError::engine("Engine not started"))?
            .to_path_buf();

        tracing::debug!(?args, "Running ffmpeg");
        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"])
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RelayError::engine(format!("Failed to start ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RelayError::engine(format!(
                "ffmpeg failed (status {}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn read_output(&mut self, name: &str) -> RelayResult<Vec<u8>> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| RelayError::engine(format!("Failed to read {}: {e}", path.display())))
    }

    async fn delete_file(&mut self, name: &str) -> RelayResult<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RelayError::engine(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn keyframes(&mut self, name: &str) -> RelayResult<Vec<f64>> {
        let path = self.resolve(name)?;
        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-skip_frame",
                "nokey",
                "-show_entries",
                "frame=pts_time",
                "-of",
                "csv=p=0",
            ])
            .arg(&path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RelayError::engine(format!("Failed to start ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(RelayError::engine(format!(
                "ffprobe failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let keyframes = parse_keyframe_times(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(name, count = keyframes.len(), "Keyframes probed");
        Ok(keyframes)
    }

    async fn shutdown(&mut self) -> RelayResult<()> {
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            scratch.close().map_err(|e| {
                RelayError::engine(format!("Failed to remove {}: {e}", path.display()))
            })?;
            tracing::info!("Media engine shut down");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Engine file names are single path components.
fn validate_file_name(name: &str) -> RelayResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(RelayError::engine(format!(
            "Invalid engine file name: {name:?}"
        ))),
    }
}

/// First line of `<binary> -version`, if the binary runs.
pub async fn binary_version(binary: &Path) -> Option<String> {
    let output = tokio::process::Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_must_be_single_component() {
        assert!(validate_file_name("input.mp4").is_ok());
        assert!(validate_file_name("usage_clip-1.webm").is_ok());
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("/tmp/x.mp4").is_err());
        assert!(validate_file_name("a/b.mp4").is_err());
        assert!(validate_file_name("").is_err());
    }

    #[tokio::test]
    async fn test_file_ops_require_start() {
        let mut engine = FfmpegEngine::new(&ExtractionConfig::default());
        assert!(!engine.is_running());
        let err = engine.write_input("input.mp4", b"x").await.unwrap_err();
        assert!(matches!(err, RelayError::Engine { .. }));
    }

    #[tokio::test]
    async fn test_start_fails_without_binary() {
        let config = ExtractionConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..ExtractionConfig::default()
        };
        let mut engine = FfmpegEngine::new(&config);
        assert!(engine.start().await.is_err());
        assert!(!engine.is_running());
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_binary_version_missing() {
        assert!(binary_version(Path::new("/nonexistent/ffprobe-binary"))
            .await
            .is_none());
    }
}
