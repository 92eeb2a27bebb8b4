//! External audio download step.

use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

const STDERR_TAIL_LINES: usize = 20;

/// Populates a directory with the audio files of a release.
#[async_trait]
pub trait AudioDownloader: Send + Sync {
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<()>;
}

/// Runs a command line downloader (yt-dlp by default) inside the destination.
#[derive(Clone, Debug)]
pub struct CommandDownloader {
    program: String,
    args: Vec<String>,
}

impl CommandDownloader {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

#[async_trait]
impl AudioDownloader for CommandDownloader {
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<()> {
        tracing::debug!(program = %self.program, args = ?self.args, dir = ?dest_dir, "spawning downloader");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .current_dir(dest_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("spawn {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}:\n{}",
                self.program,
                output.status,
                stderr_tail(&stderr)
            );
        }
        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
