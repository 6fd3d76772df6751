//! Still camera. Photos land in `camera.photos_dir` as `<name>.png`, which
//! is where the communicator picks them up for upload.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use super::Camera;
use crate::config::CameraConfig;

/// Shells out to a capture tool (e.g. `libcamera-still`, `raspistill`).
pub struct CommandCamera {
    command: String,
    photos_dir: PathBuf,
    warmup: Duration,
}

impl CommandCamera {
    pub fn new(command: impl Into<String>, photos_dir: impl Into<PathBuf>, warmup: Duration) -> Self {
        Self {
            command: command.into(),
            photos_dir: photos_dir.into(),
            warmup,
        }
    }

    pub fn photo_path(&self, name: &str) -> PathBuf {
        photo_path(&self.photos_dir, name)
    }
}

impl Camera for CommandCamera {
    fn take_photo(&self, name: &str) -> Result<()> {
        std::fs::create_dir_all(&self.photos_dir)
            .with_context(|| format!("creating {}", self.photos_dir.display()))?;
        let path = self.photo_path(name);

        let status = Command::new(&self.command)
            .arg("-n")
            .arg("-t")
            .arg(self.warmup.as_millis().to_string())
            .arg("-o")
            .arg(&path)
            .status()
            .with_context(|| format!("spawning {}", self.command))?;

        if !status.success() {
            bail!("{} exited with {status}", self.command);
        }

        tracing::info!(path = %path.display(), "photo captured");
        Ok(())
    }
}

/// Used when no capture command is configured: logs the request only.
pub struct LogCamera;

impl Camera for LogCamera {
    fn take_photo(&self, name: &str) -> Result<()> {
        tracing::info!(name, "[mock-camera] photo requested (no capture command)");
        Ok(())
    }
}

pub fn photo_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.png"))
}

pub fn build(cfg: &CameraConfig) -> Arc<dyn Camera> {
    match &cfg.command {
        Some(command) => Arc::new(CommandCamera::new(
            command.clone(),
            cfg.photos_dir.clone(),
            Duration::from_secs(cfg.warmup_secs),
        )),
        None => Arc::new(LogCamera),
    }
}
