use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AppError, Result};

#[async_trait]
pub trait Player: Send + Sync {
    /// Plays `url` and returns whether the player exited successfully.
    async fn play(&self, url: &str) -> Result<bool>;
}

pub struct MpvPlayer {
    binary: String,
    flags: Vec<String>,
}

impl MpvPlayer {
    pub fn new(binary: impl Into<String>, flags: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            flags,
        }
    }
}

#[async_trait]
impl Player for MpvPlayer {
    async fn play(&self, url: &str) -> Result<bool> {
        tracing::debug!("Playing {} with {}", url, self.binary);

        let status = Command::new(&self.binary)
            .args(&self.flags)
            .arg("--")
            .arg(url)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    AppError::Player(format!("Could not locate the video player '{}'", self.binary))
                }
                _ => AppError::Player(e.to_string()),
            })?;

        if !status.success() {
            tracing::warn!("{} exited with {}", self.binary, status);
        }
        Ok(status.success())
    }
}
